use crate::context::AppContext;
use anyhow::{Result, bail};
use arbor_core::workspace::WorkspaceMetadata;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;

/// Finds a workspace by exact id, then by unique name.
pub fn resolve_workspace(workspaces: &[WorkspaceMetadata], query: &str) -> Result<String> {
    if let Some(ws) = workspaces.iter().find(|w| w.id == query) {
        return Ok(ws.id.clone());
    }
    let named: Vec<&WorkspaceMetadata> = workspaces.iter().filter(|w| w.name == query).collect();
    match named.as_slice() {
        [ws] => Ok(ws.id.clone()),
        [] => bail!("no workspace named '{}'", query),
        _ => bail!("several workspaces are named '{}'; use the id", query),
    }
}

fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn list(ctx: &AppContext) -> Result<()> {
    let current = ctx.manager.workspace_id().await;
    for ws in ctx.manager.directory().list().await {
        let marker = if ws.id == current { "*" } else { " " };
        let line = format!(
            "{} {:<24} {}  {}",
            marker,
            ws.name,
            ws.id.dimmed(),
            format_time(ws.last_accessed)
        );
        if ws.id == current {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    Ok(())
}

pub async fn create(ctx: &AppContext, name: &str, switch: bool) -> Result<()> {
    let id = ctx.manager.directory().create(name).await?;
    if switch {
        ctx.manager.switch_workspace(&id).await?;
    }
    println!("{}", id);
    Ok(())
}

pub async fn rename(ctx: &AppContext, workspace: &str, name: &str) -> Result<()> {
    let id = resolve_workspace(&ctx.manager.directory().list().await, workspace)?;
    ctx.manager.directory().rename(&id, name).await?;
    Ok(())
}

pub async fn delete(ctx: &AppContext, workspace: &str) -> Result<()> {
    let id = resolve_workspace(&ctx.manager.directory().list().await, workspace)?;
    if !ctx.manager.delete_workspace(&id).await? {
        bail!("the last workspace cannot be deleted");
    }
    eprintln!("now on workspace {}", ctx.manager.workspace_id().await);
    Ok(())
}

pub async fn switch(ctx: &AppContext, workspace: &str) -> Result<()> {
    let id = resolve_workspace(&ctx.manager.directory().list().await, workspace)?;
    ctx.manager.switch_workspace(&id).await?;
    Ok(())
}
