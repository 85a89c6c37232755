//! Graph inspection and editing commands.

use crate::context::AppContext;
use anyhow::{Result, bail};
use arbor_core::graph::{GraphIndex, GraphState, MessageRole, NodeKind, ROOT_NODE_ID};
use colored::Colorize;
use std::collections::HashSet;

/// Resolves a user-supplied node reference: an exact id, `@` for the active
/// node, or a unique id prefix.
pub fn resolve_node(state: &GraphState, query: &str) -> Result<String> {
    if query == "@" {
        return match &state.active_node_id {
            Some(id) => Ok(id.clone()),
            None => bail!("no active node"),
        };
    }
    if state.contains(query) {
        return Ok(query.to_string());
    }

    let matches: Vec<&str> = state
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| id.starts_with(query) || id.trim_start_matches("node-").starts_with(query))
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.to_string()),
        [] => bail!("no node matches '{}'", query),
        _ => bail!("'{}' is ambiguous ({} nodes match)", query, matches.len()),
    }
}

fn short_id(id: &str) -> &str {
    let trimmed = id.trim_start_matches("node-");
    trimmed.get(..8).unwrap_or(trimmed)
}

fn node_line(state: &GraphState, id: &str) -> String {
    let Some(node) = state.node(id) else {
        return id.to_string();
    };
    let text = format!(
        "{} [{}] ({} msgs)",
        node.data.label,
        short_id(&node.id),
        node.data.chat_history.len()
    );

    if state.active_node_id.as_deref() == Some(id) {
        format!("{} {}", "*".green().bold(), text.green().bold())
    } else if state.active_path.contains_node(id) {
        text.green().to_string()
    } else {
        text
    }
}

/// Renders the graph as an indented tree rooted at `root`. Nodes that cannot
/// be reached from the root are listed afterwards.
pub fn render_tree(state: &GraphState) -> Vec<String> {
    let index = GraphIndex::build(&state.edges);
    let mut lines = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(&str, String, bool)> = vec![(ROOT_NODE_ID, String::new(), true)];

    while let Some((id, prefix, last)) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if id == ROOT_NODE_ID {
            lines.push(node_line(state, id));
        } else {
            let branch = if last { "└── " } else { "├── " };
            lines.push(format!("{}{}{}", prefix, branch, node_line(state, id)));
        }

        let child_prefix = if id == ROOT_NODE_ID {
            String::new()
        } else if last {
            format!("{}    ", prefix)
        } else {
            format!("{}│   ", prefix)
        };
        let children = index.children(id);
        for (i, child) in children.iter().enumerate().rev() {
            stack.push((*child, child_prefix.clone(), i + 1 == children.len()));
        }
    }

    let orphans: Vec<&str> = state
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| !seen.contains(id))
        .collect();
    if !orphans.is_empty() {
        lines.push("unreachable:".dimmed().to_string());
        for id in orphans {
            lines.push(format!("  {}", node_line(state, id)));
        }
    }
    lines
}

pub async fn tree(ctx: &AppContext) -> Result<()> {
    let state = ctx.manager.state().await;
    let workspace = ctx.manager.workspace_id().await;
    println!("{} {}", "workspace".dimmed(), workspace);
    for line in render_tree(&state) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn path(ctx: &AppContext, node: &str) -> Result<()> {
    let state = ctx.manager.state().await;
    let id = resolve_node(&state, node)?;

    let ids = ctx.manager.path_node_ids(&id).await;
    let labels: Vec<String> = ids
        .iter()
        .filter_map(|id| state.node(id).map(|n| n.data.label.clone()))
        .collect();
    println!("{}", labels.join(" → "));

    for message in ctx.manager.path_messages(&id).await {
        let speaker = match message.role {
            MessageRole::User => "user".cyan(),
            MessageRole::Model if message.is_error() => "error".red(),
            MessageRole::Model => "model".magenta(),
        };
        println!("{}: {}", speaker.bold(), message.content);
        for attachment in &message.attachments {
            println!("    📎 {} ({})", attachment.name, attachment.mime_type);
        }
    }
    Ok(())
}

pub async fn create(
    ctx: &AppContext,
    source: &str,
    label: Option<&str>,
    branch: bool,
    activate: bool,
) -> Result<()> {
    let state = ctx.manager.state().await;
    let source_id = resolve_node(&state, source)?;
    let kind = if branch {
        NodeKind::Branch
    } else {
        NodeKind::Response
    };
    let label = label.unwrap_or(arbor_core::graph::DEFAULT_NODE_LABEL);

    let Some(id) = ctx.manager.create_node(&source_id, label, kind).await else {
        bail!("source node '{}' disappeared", source_id);
    };
    if activate {
        ctx.manager.set_active(Some(&id)).await;
    }
    println!("{}", id);
    Ok(())
}

pub async fn activate(ctx: &AppContext, node: Option<&str>) -> Result<()> {
    match node {
        Some(node) => {
            let state = ctx.manager.state().await;
            let id = resolve_node(&state, node)?;
            ctx.manager.set_active(Some(&id)).await;
        }
        None => {
            ctx.manager.set_active(None).await;
        }
    }
    Ok(())
}

pub async fn rename(ctx: &AppContext, node: &str, label: &str) -> Result<()> {
    let state = ctx.manager.state().await;
    let id = resolve_node(&state, node)?;
    ctx.manager.set_label(&id, label).await;
    Ok(())
}

pub async fn reset(ctx: &AppContext, node: &str) -> Result<()> {
    let state = ctx.manager.state().await;
    let id = resolve_node(&state, node)?;
    let before = state.nodes.len();
    ctx.manager.reset_node(&id).await;
    let removed = before - ctx.manager.state().await.nodes.len();
    println!("reset {} ({} descendants removed)", short_id(&id), removed);
    Ok(())
}

pub async fn delete(ctx: &AppContext, node: &str) -> Result<()> {
    let state = ctx.manager.state().await;
    let id = resolve_node(&state, node)?;
    if id == ROOT_NODE_ID {
        bail!("the root node cannot be deleted");
    }
    let before = state.nodes.len();
    ctx.manager.delete_node(&id).await;
    let removed = before - ctx.manager.state().await.nodes.len();
    println!("deleted {} node(s)", removed);
    Ok(())
}
