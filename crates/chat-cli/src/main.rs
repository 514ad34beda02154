mod commands;
mod echo;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chat_session::{
    ConversationConfig, ConversationController, ConversationError, ConversationSnapshot, NodeId,
    Role, SelectionPolicy,
};
use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::commands::{Command, HELP};
use crate::echo::EchoGenerator;

#[derive(Parser)]
#[command(name = "chat-tree")]
#[command(about = "Interactive branching chat backed by an offline echo generator")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Model override handed to the generator
    #[arg(long)]
    model: Option<String>,

    /// System prompt placed at the root of new conversations
    #[arg(long)]
    system_prompt: Option<String>,

    /// last_write_wins or reject_stale
    #[arg(long)]
    selection_policy: Option<SelectionPolicy>,

    /// Reopen a conversation from a JSON snapshot written by /save
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, default_value = "false")]
    debug: bool,
}

/// Filter used when `RUST_LOG` is unset.
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn init_tracing(debug: bool) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(debug))),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = ConversationConfig::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(prompt) = cli.system_prompt {
        config.system_prompt = Some(prompt);
    }
    if let Some(policy) = cli.selection_policy {
        config.selection_policy = policy;
    }
    tracing::debug!(?config, "Loaded configuration");

    let generator = Arc::new(EchoGenerator::new("echo-1"));
    let controller = match cli.restore {
        Some(path) => {
            let json = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read snapshot {}", path.display()))?;
            let snapshot: ConversationSnapshot = serde_json::from_str(&json)
                .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
            ConversationController::restore(snapshot, generator, config)?
        }
        None => ConversationController::new(generator, config),
    };

    println!("{}", "Branching chat. Type /help for commands.".bold());
    render_thread(&controller).await?;
    run_repl(&controller).await
}

async fn run_repl(controller: &ConversationController) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("{}", error.to_string().red());
                continue;
            }
        };

        if command == Command::Quit {
            return Ok(());
        }

        match execute(controller, command).await {
            Ok(()) => {}
            Err(error) => report(&error),
        }
    }
}

async fn execute(controller: &ConversationController, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Send(text) => {
            let result = controller.add_message(text).await;
            render_thread(controller).await?;
            result?;
        }
        Command::Regenerate => {
            let user = last_user_node(controller).await?;
            let result = controller.regenerate_response(user).await;
            render_thread(controller).await?;
            result?;
        }
        Command::Edit(text) => {
            let user = last_user_node(controller).await?;
            let result = controller.edit_and_resend(user, text).await;
            render_thread(controller).await?;
            result?;
        }
        Command::Branches => render_thread(controller).await?,
        Command::Switch { position, index } => {
            let thread = controller.active_thread().await;
            let node = thread
                .get(position)
                .copied()
                .with_context(|| format!("thread has no entry {}", position + 1))?;
            controller.switch_to_sibling(node, index).await?;
            render_thread(controller).await?;
        }
        Command::Goto(id) => {
            let node: NodeId = id
                .parse()
                .with_context(|| format!("invalid node id {id:?}"))?;
            controller.switch_branch(node).await?;
            render_thread(controller).await?;
        }
        Command::New => {
            controller.start_new_conversation().await;
            println!("{}", "Started a new conversation.".dimmed());
        }
        Command::Save(path) => {
            let snapshot = controller.snapshot().await;
            let json = serde_json::to_string_pretty(&snapshot)?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{}",
                format!("Saved {} nodes to {}", snapshot.nodes.len(), path.display()).dimmed()
            );
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn last_user_node(controller: &ConversationController) -> anyhow::Result<NodeId> {
    controller
        .active_thread_nodes()
        .await?
        .iter()
        .rev()
        .find(|node| node.role() == Role::User)
        .map(|node| node.id())
        .context("no user message in the active thread")
}

async fn render_thread(controller: &ConversationController) -> anyhow::Result<()> {
    let nodes = controller.active_thread_nodes().await?;
    if nodes.is_empty() {
        println!("{}", "(empty conversation)".dimmed());
        return Ok(());
    }

    for (position, node) in nodes.iter().enumerate() {
        let info = controller.branch_info(node.id()).await?;
        let role = match node.role() {
            Role::System => "system".yellow(),
            Role::User => "user".green(),
            Role::Assistant => "assistant".cyan(),
        };
        let branch = if info.has_siblings {
            format!(" [{}/{}]", info.branch_index + 1, info.sibling_count)
        } else {
            String::new()
        };
        let short_id: String = node.id().to_string().chars().take(8).collect();
        println!(
            "{:>3}. {}{} {} {}",
            position + 1,
            role.bold(),
            branch.magenta(),
            short_id.dimmed(),
            node.text()
        );
    }
    Ok(())
}

fn report(error: &anyhow::Error) {
    let hint = error
        .downcast_ref::<ConversationError>()
        .and_then(ConversationError::prompt_node_id)
        .map(|_| " (your message was kept; /regen to retry)")
        .unwrap_or("");
    println!("{}{}", error.to_string().red(), hint.dimmed());
}
