//! Export and import the cached workspace.

use crate::context::Context;
use anyhow::{Context as _, Result};
use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Write the workspace as pretty JSON to `output` or stdout.
pub fn export_workspace(ctx: &Context, output: Option<&Path>) -> Result<()> {
    let workspace = ctx.workspace();
    let data = workspace
        .export_json()
        .context("Failed to serialize workspace")?;

    let mut writer: Box<dyn Write> = if let Some(path) = output {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {:?}", path))?;
        Box::new(BufWriter::new(file))
    } else {
        Box::new(stdout())
    };
    writeln!(writer, "{data}")?;
    writer.flush()?;
    Ok(())
}

/// Validate `file` and replace the cached workspace with it. The cache is
/// left untouched when validation fails.
pub fn import_workspace(ctx: &Context, file: &Path) -> Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {:?}", file))?;
    let mut workspace = ctx.workspace();
    workspace
        .import_json(&data)
        .with_context(|| format!("Invalid workspace export {:?}", file))?;
    ctx.save_workspace(&workspace)?;

    let notes: usize = workspace.collections.values().map(|c| c.notes.len()).sum();
    info!(collections = workspace.collections.len(), notes, "Imported workspace");
    println!(
        "Imported {} collection(s), {} note(s)",
        workspace.collections.len(),
        notes
    );
    Ok(())
}
