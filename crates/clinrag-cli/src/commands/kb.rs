//! Knowledge base commands

use crate::app::OutputFormat;
use crate::context::AppContext;
use crate::output::{json, terminal};
use anyhow::Result;
use clinrag_core::knowledge::{add_case, load_knowledge_base, read_case_file, sample_cases};
use clinrag_core::{CaseRecord, VectorIndex};
use std::path::PathBuf;

pub async fn load(ctx: &AppContext, file: Option<PathBuf>, sample: bool) -> Result<()> {
    let records = match file {
        Some(path) if !sample => read_case_file(&path)?,
        _ => sample_cases()?,
    };

    let db = ctx.open_db()?;
    let embedder = ctx.embedder()?;
    let index = VectorIndex::new();
    let stats = load_knowledge_base(&db, embedder.as_ref(), &index, records).await?;

    match ctx.format {
        OutputFormat::Json => json::print(&stats)?,
        OutputFormat::Cli => println!(
            "Loaded {} cases ({}, {} dimensions)",
            stats.cases, stats.model, stats.dimensions
        ),
    }
    Ok(())
}

pub async fn add(ctx: &AppContext, record: CaseRecord) -> Result<()> {
    let db = ctx.open_db()?;
    let embedder = ctx.embedder()?;
    let index = ctx.restore_index(&db, embedder.as_ref()).await?;
    let case = add_case(&db, embedder.as_ref(), &index, record).await?;

    match ctx.format {
        OutputFormat::Json => json::print(&json::format_case(&case))?,
        OutputFormat::Cli => println!("Added {} ({} cases)", case.id, index.len()),
    }
    Ok(())
}

pub fn list(ctx: &AppContext) -> Result<()> {
    let db = ctx.open_db()?;
    let info = db.case_store_info()?;
    let cases = db.list_cases()?;

    match ctx.format {
        OutputFormat::Json => json::print(&json::format_cases(&cases, &info))?,
        OutputFormat::Cli => print!("{}", terminal::format_cases(&cases, &info)),
    }
    Ok(())
}

pub fn show(ctx: &AppContext, id: &str) -> Result<()> {
    let db = ctx.open_db()?;
    let case = db.get_case(id)?;

    match ctx.format {
        OutputFormat::Json => json::print(&json::format_case(&case))?,
        OutputFormat::Cli => print!("{}", terminal::format_case(&case)),
    }
    Ok(())
}
