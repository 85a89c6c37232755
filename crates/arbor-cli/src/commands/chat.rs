use super::graph::resolve_node;
use crate::context::AppContext;
use anyhow::{Context, Result};
use arbor_core::graph::Attachment;
use base64::Engine;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Reads a file into a base64 attachment, guessing its MIME type from the
/// extension.
pub fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read attachment {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Ok(Attachment::new(
        name,
        mime.essence_str(),
        base64::engine::general_purpose::STANDARD.encode(bytes),
    ))
}

pub async fn send(ctx: &AppContext, node: &str, text: &str, attach: &[PathBuf]) -> Result<()> {
    let state = ctx.manager.state().await;
    let id = resolve_node(&state, node)?;
    let attachments = attach
        .iter()
        .map(|p| read_attachment(p))
        .collect::<Result<Vec<_>>>()?;

    let reply = ctx.manager.send_message(&id, text, attachments).await?;
    if reply.is_error() {
        eprintln!("{}", reply.content.red());
    } else {
        println!("{}", reply.content);
    }

    // Titles arrive from a background task.
    ctx.manager.settle().await;
    if let Some(node) = ctx.manager.state().await.node(&id) {
        eprintln!("{} {}", "title".dimmed(), node.data.label);
    }
    Ok(())
}
