//! LLLM CLI: the main entry point.
//!
//! Commands:
//! - `create`    : Scaffold a new project from a template
//! - `prompts`   : List the prompts a project defines
//! - `providers` : List the provider names that can be configured
//! - `ask`       : Run one agent call against a prompt
//! - `replay`    : Print everything a logged session recorded

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "lllm",
    about = "LLLM: prompt-driven LLM agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of discovering lllm.toml
    #[arg(short, long, global = true, env = "LLLM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project scaffold
    Create {
        /// Name of the project folder to create
        #[arg(long, default_value = "system")]
        name: String,

        /// Built-in template name or path to a template folder
        #[arg(long, default_value = commands::create::DEFAULT_TEMPLATE)]
        template: String,
    },

    /// List the prompts found in the configured prompt folders
    Prompts,

    /// List the provider names that can be configured
    Providers,

    /// Send one prompt to an agent and print the answer
    Ask {
        /// Agent name from the [agents.*] tables
        agent: String,

        /// Registry path of the prompt to send
        prompt: String,

        /// Prompt argument as key=value (JSON values are parsed, anything else is a string)
        #[arg(short, long = "arg", value_parser = commands::ask::parse_arg)]
        args: Vec<(String, serde_json::Value)>,

        /// Session name for the dialog log
        #[arg(long)]
        session: Option<String>,
    },

    /// Print every logged activity of a session, oldest first
    Replay {
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Create { name, template } => commands::create::run(&name, &template)?,
        Commands::Prompts => commands::prompts::run(config)?,
        Commands::Providers => commands::providers::run(),
        Commands::Ask {
            agent,
            prompt,
            args,
            session,
        } => commands::ask::run(config, &agent, &prompt, args, session.as_deref()).await?,
        Commands::Replay { session } => commands::replay::run(config, &session)?,
    }

    Ok(())
}
