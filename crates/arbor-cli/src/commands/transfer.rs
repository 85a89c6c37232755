//! Export and import of every saved workspace.

use crate::context::AppContext;
use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::Path;

pub async fn export(ctx: &AppContext, output: Option<&Path>) -> Result<()> {
    let blob = ctx.manager.export_all().await?;
    match output {
        Some(path) => {
            std::fs::write(path, &blob)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("exported to {}", path.display());
        }
        None => println!("{}", blob),
    }
    Ok(())
}

/// Imports a bundle from `input`, where `-` reads standard input.
pub async fn import(ctx: &AppContext, input: &Path) -> Result<()> {
    let blob = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read standard input")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };

    if !ctx.manager.import_all(&blob).await? {
        bail!("import rejected: not a valid export bundle or storage is not allowed");
    }
    let workspaces = ctx.manager.directory().list().await;
    eprintln!("imported; {} workspace(s) known", workspaces.len());
    Ok(())
}
