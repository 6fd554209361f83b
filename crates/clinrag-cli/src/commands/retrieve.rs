//! Retrieve command

use crate::app::{OutputFormat, RetrieveArgs};
use crate::context::AppContext;
use crate::output::{json, terminal};
use anyhow::Result;
use clinrag_core::CaseRetriever;

pub async fn run(args: RetrieveArgs, ctx: &AppContext) -> Result<()> {
    let text = args.text.join(" ");
    let k = args.k.unwrap_or(ctx.config.retrieval.k);
    let min_similarity = args
        .min_similarity
        .unwrap_or(ctx.config.retrieval.min_similarity);

    let db = ctx.open_db()?;
    let embedder = ctx.embedder()?;
    let index = ctx.restore_index(&db, embedder.as_ref()).await?;

    let retriever = CaseRetriever::new(embedder, index);
    let result = retriever.retrieve_text(&text, k, min_similarity).await?;

    match ctx.format {
        OutputFormat::Json => json::print(&result)?,
        OutputFormat::Cli => print!("{}", terminal::format_retrieval(&result)),
    }
    Ok(())
}
