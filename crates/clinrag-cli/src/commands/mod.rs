//! CLI command handlers

pub mod diagnose;
pub mod jobs;
pub mod kb;
pub mod quota;
pub mod retrieve;
pub mod summary;
