//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use clinrag_core::JobStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clinrag")]
#[command(
    author,
    version,
    about = "Differential diagnosis suggestions grounded in similar historical cases"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML)
    #[arg(long, global = true, env = "CLINRAG_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the knowledge base
    Kb(KbArgs),

    /// Retrieve the most similar knowledge cases for a text
    Retrieve(RetrieveArgs),

    /// Suggest a differential diagnosis for a patient
    Diagnose(DiagnoseArgs),

    /// Queue diagnoses and track their progress
    Jobs(JobsArgs),

    /// Show the clinical summary and fingerprint for a patient
    Summary(SummaryArgs),

    /// Show today's generation quota usage
    Quota,
}

#[derive(Args)]
pub struct KbArgs {
    #[command(subcommand)]
    pub action: KbAction,
}

#[derive(Subcommand)]
pub enum KbAction {
    /// Encode and store cases, replacing the current knowledge base
    Load {
        /// Case file (.yaml, .yml, .json or .csv)
        #[arg(required_unless_present = "sample", conflicts_with = "sample")]
        file: Option<PathBuf>,

        /// Load the bundled sample cases
        #[arg(long)]
        sample: bool,
    },
    /// Encode one case and append it to the knowledge base
    Add {
        /// Case identifier
        #[arg(long)]
        id: String,

        /// Confirmed diagnosis
        #[arg(long)]
        diagnosis: String,

        /// Clinical outcome
        #[arg(long)]
        outcome: Option<String>,

        /// Case narrative
        #[arg(required = true)]
        narrative: Vec<String>,
    },
    /// List stored cases
    #[command(alias = "ls")]
    List,
    /// Show one stored case
    Show {
        /// Case identifier
        id: String,
    },
}

#[derive(Args)]
pub struct RetrieveArgs {
    /// Clinical text to match
    #[arg(required = true)]
    pub text: Vec<String>,

    /// Number of cases (defaults to the configured k)
    #[arg(short)]
    pub k: Option<usize>,

    /// Minimum similarity (defaults to the configured threshold)
    #[arg(long)]
    pub min_similarity: Option<f32>,
}

#[derive(Args)]
pub struct DiagnoseArgs {
    /// Patient snapshot file (YAML or JSON)
    #[arg(long)]
    pub patient: PathBuf,

    /// Ignore stored results for the same presentation
    #[arg(long)]
    pub fresh: bool,

    /// Overall deadline in seconds
    #[arg(long)]
    pub deadline: Option<u64>,
}

#[derive(Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub action: JobsAction,
}

#[derive(Subcommand)]
pub enum JobsAction {
    /// Queue a diagnosis for a patient
    Submit {
        /// Patient snapshot file (YAML or JSON)
        #[arg(long)]
        patient: PathBuf,

        /// Ignore stored results for the same presentation
        #[arg(long)]
        fresh: bool,

        /// Process the job now and wait for it to finish
        #[arg(long)]
        wait: bool,
    },
    /// Process every pending job
    Run,
    /// Show one job
    Status {
        /// Job identifier
        id: String,
    },
    /// List jobs
    #[command(alias = "ls")]
    List {
        /// Only jobs in this state
        #[arg(long, value_enum)]
        status: Option<JobStatusArg>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobStatusArg {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<JobStatusArg> for JobStatus {
    fn from(arg: JobStatusArg) -> Self {
        match arg {
            JobStatusArg::Pending => JobStatus::Pending,
            JobStatusArg::Processing => JobStatus::Processing,
            JobStatusArg::Completed => JobStatus::Completed,
            JobStatusArg::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Args)]
pub struct SummaryArgs {
    /// Patient snapshot file (YAML or JSON)
    #[arg(long)]
    pub patient: PathBuf,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
