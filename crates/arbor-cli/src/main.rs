use anyhow::Result;
use arbor_infrastructure::ArborPaths;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod context;
mod logging;

use context::AppContext;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Arbor - branching conversation graphs", long_about = None)]
struct Cli {
    /// Keep config and data under this directory instead of the user dirs
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Work on an in-memory store that is discarded on exit
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the conversation tree of the current workspace
    Tree,
    /// Print the messages along the path from the root to a node
    Path {
        /// Node id, id prefix, or `@` for the active node
        node: String,
    },
    /// Create a node under SOURCE
    New {
        source: String,
        #[arg(long)]
        label: Option<String>,
        /// Start a branch that inherits only shared documents
        #[arg(long)]
        branch: bool,
        /// Make the new node active
        #[arg(long)]
        activate: bool,
    },
    /// Focus a node, or clear focus when none is given
    Activate { node: Option<String> },
    /// Set a node's label
    Rename { node: String, label: String },
    /// Clear a node's history and remove its descendants
    Reset { node: String },
    /// Remove a node and all of its descendants
    Delete { node: String },
    /// Send a message on a node and print the reply
    Chat {
        node: String,
        text: String,
        /// Files to attach
        #[arg(long = "attach", short = 'a')]
        attach: Vec<PathBuf>,
    },
    /// Write every saved workspace to a bundle
    Export {
        /// Output file; standard output when omitted
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Replace every saved workspace with a bundle (`-` for stdin)
    Import { input: PathBuf },
    /// Manage workspaces
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
    /// Allow or deny durable storage
    Consent {
        #[command(subcommand)]
        action: ConsentAction,
    },
}

#[derive(Subcommand)]
enum WorkspaceAction {
    List,
    Create {
        name: String,
        #[arg(long)]
        switch: bool,
    },
    Rename { workspace: String, name: String },
    Delete { workspace: String },
    Switch { workspace: String },
}

#[derive(Subcommand)]
enum ConsentAction {
    Grant,
    Revoke,
    Status,
}

impl Commands {
    fn mutates(&self) -> bool {
        !matches!(
            self,
            Commands::Tree
                | Commands::Path { .. }
                | Commands::Export { .. }
                | Commands::Consent { .. }
                | Commands::Workspace {
                    action: WorkspaceAction::List
                }
        )
    }
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    use commands::{chat, consent, graph, transfer, workspace};

    match command {
        Commands::Tree => graph::tree(ctx).await,
        Commands::Path { node } => graph::path(ctx, &node).await,
        Commands::New {
            source,
            label,
            branch,
            activate,
        } => graph::create(ctx, &source, label.as_deref(), branch, activate).await,
        Commands::Activate { node } => graph::activate(ctx, node.as_deref()).await,
        Commands::Rename { node, label } => graph::rename(ctx, &node, &label).await,
        Commands::Reset { node } => graph::reset(ctx, &node).await,
        Commands::Delete { node } => graph::delete(ctx, &node).await,
        Commands::Chat { node, text, attach } => chat::send(ctx, &node, &text, &attach).await,
        Commands::Export { output } => transfer::export(ctx, output.as_deref()).await,
        Commands::Import { input } => transfer::import(ctx, &input).await,
        Commands::Workspace { action } => match action {
            WorkspaceAction::List => workspace::list(ctx).await,
            WorkspaceAction::Create { name, switch } => workspace::create(ctx, &name, switch).await,
            WorkspaceAction::Rename { workspace: ws, name } => {
                workspace::rename(ctx, &ws, &name).await
            }
            WorkspaceAction::Delete { workspace: ws } => workspace::delete(ctx, &ws).await,
            WorkspaceAction::Switch { workspace: ws } => workspace::switch(ctx, &ws).await,
        },
        Commands::Consent { action } => match action {
            ConsentAction::Grant => consent::grant(ctx).await,
            ConsentAction::Revoke => consent::revoke(ctx).await,
            ConsentAction::Status => consent::status(ctx).await,
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.home {
        Some(home) => ArborPaths::with_base(home),
        None => ArborPaths::resolve()?,
    };
    let _guard = logging::init(&paths.logs_dir(), &cli.log_level);

    let ctx = AppContext::open(paths, cli.ephemeral).await?;
    let mutates = cli.command.mutates();
    let result = run(&ctx, cli.command).await;

    // Pending saves are written even when the command failed.
    ctx.close().await;
    if result.is_ok() && mutates && !cli.ephemeral {
        ctx.warn_if_unsaved().await;
    }
    result
}
