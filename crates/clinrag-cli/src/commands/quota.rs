//! Quota command

use crate::app::OutputFormat;
use crate::context::AppContext;
use crate::output::{json, terminal};
use anyhow::Result;
use clinrag_core::{QuotaTracker, SqliteQuotaStore, SystemClock};
use std::sync::Arc;

pub fn run(ctx: &AppContext) -> Result<()> {
    let plan = ctx.config.cascade_plan()?;
    let store = SqliteQuotaStore::open(&ctx.db_path)?;
    let tracker = QuotaTracker::new(&plan, Arc::new(store), Arc::new(SystemClock));
    let usage = tracker.usage()?;

    match ctx.format {
        OutputFormat::Json => json::print(&usage)?,
        OutputFormat::Cli => print!("{}", terminal::format_quota(&usage)),
    }
    Ok(())
}
