mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "selectorfinder")]
#[command(about = "Find page elements from natural-language descriptions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.selectorfinder/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdin/stdout
    Serve {
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,

        /// Browser session name (selects the profile directory)
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Default matching strategy (first_match, token_overlap)
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Start a server, optionally open a URL, and print the selector for a prompt
    Find {
        /// Element description, e.g. "submit button"
        prompt: String,

        /// Page to open first
        #[arg(short, long)]
        url: Option<String>,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,

        /// Attempts after the first failure (overrides config)
        #[arg(long)]
        retries: Option<u32>,

        /// Per-request timeout in milliseconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Match a prompt against a saved accessibility snapshot, without a browser
    Match {
        /// Element description
        prompt: String,

        /// Snapshot JSON: an AXNode tree or a raw Accessibility.getFullAXTree result
        #[arg(short, long)]
        file: PathBuf,

        /// Matching strategy (first_match, token_overlap)
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Inspect the browser tools
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ToolsCommands {
    /// List all registered tools
    List,
    /// Show detailed info for a specific tool
    Info {
        /// Tool name
        tool_name: String,
    },
    /// Call a tool directly with JSON params
    Test {
        /// Tool name
        tool_name: String,
        /// JSON parameters (e.g. '{"url":"https://example.com"}')
        params: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config;

    match cli.command {
        Commands::Serve { headless, session, strategy } => {
            commands::serve::run(config_path, headless, &session, strategy).await?;
        }
        Commands::Find { prompt, url, headless, retries, timeout } => {
            commands::find::run(config_path, &prompt, url, headless, retries, timeout).await?;
        }
        Commands::Match { prompt, file, strategy } => {
            commands::match_cmd::run(config_path, &prompt, &file, strategy)?;
        }
        Commands::Tools { command } => match command {
            ToolsCommands::List => {
                commands::tools_cmd::list();
            }
            ToolsCommands::Info { tool_name } => {
                commands::tools_cmd::info(&tool_name)?;
            }
            ToolsCommands::Test { tool_name, params } => {
                commands::tools_cmd::test(config_path, &tool_name, &params).await?;
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::config_cmd::show(config_path)?;
            }
            ConfigCommands::Init { force } => {
                commands::config_cmd::init(config_path, force)?;
            }
        },
    }

    Ok(())
}
