//! Cellar CLI - run snippets against an isolated, lazily bootstrapped worker.

mod colors;
mod executor;
mod repl;
mod run;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cellar")]
#[command(about = "Run snippets against an isolated, order-preserving worker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a snippet file, splitting it at `# %%` markers
    Run {
        /// Path to the snippet file
        file: String,

        /// Extension package to load at bootstrap (repeatable)
        #[arg(short, long = "package")]
        packages: Vec<String>,

        /// Run the worker in a separate process
        #[arg(long)]
        isolated: bool,
    },

    /// Start an interactive session reading snippets from stdin
    Repl {
        /// Extension package to load at bootstrap (repeatable)
        #[arg(short, long = "package")]
        packages: Vec<String>,

        /// Run the worker in a separate process
        #[arg(long)]
        isolated: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format cellar-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(cellar_err) = err.downcast_ref::<cellar_core::Error>() {
            anyhow::anyhow!("{}", cellar_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Run {
            file,
            packages,
            isolated,
        } => run::execute(&file, packages, isolated).await.map_err(format_error)?,

        Commands::Repl { packages, isolated } => {
            repl::execute(packages, isolated).await.map_err(format_error)?;
        }
    }

    Ok(())
}
