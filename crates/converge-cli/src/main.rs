//! Converge CLI - reconcile declared resources against a control plane

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::Context;
use commands::apply::ApplyArgs;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Converge Contributors")]
#[command(version)]
#[command(about = "Plan, apply and inspect resources until they converge", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Engine configuration file
    #[arg(long, global = true, env = "CONVERGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the update between two documents
    Plan {
        /// Registered kind
        #[arg(short, long)]
        kind: String,

        /// Observed attributes (YAML or JSON)
        #[arg(long)]
        observed: PathBuf,

        /// Desired attributes (YAML or JSON)
        #[arg(long)]
        desired: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create or update a resource and wait for it to converge
    Apply {
        /// Manifest with a top-level `kind`
        #[arg(short = 'f', long = "filename")]
        file: PathBuf,

        /// Target namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Return once the provider accepted the request
        #[arg(long)]
        no_wait: bool,

        /// Convergence timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Run against an in-memory control plane
        #[arg(long)]
        simulate: bool,
    },

    /// Show whether a resource exists and its observed state
    Status {
        kind: String,
        name: String,

        #[arg(short, long)]
        namespace: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a resource
    Delete {
        kind: String,
        name: String,

        #[arg(short, long)]
        namespace: Option<String>,

        /// Fail when the resource does not exist
        #[arg(long)]
        strict: bool,
    },

    /// List registered kinds, or show the fields of one
    Kinds {
        kind: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> error::Result<()> {
    let ctx = Context::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan {
            kind,
            observed,
            desired,
            json,
        } => commands::plan::run(&ctx, &kind, &observed, &desired, json),

        Commands::Apply {
            file,
            namespace,
            set,
            no_wait,
            timeout,
            simulate,
        } => {
            commands::apply::run(
                &ctx,
                ApplyArgs {
                    file: &file,
                    namespace: namespace.as_deref(),
                    set: &set,
                    no_wait,
                    timeout,
                    simulate,
                },
            )
            .await
        }

        Commands::Status {
            kind,
            name,
            namespace,
            json,
        } => commands::status::run(&ctx, &kind, &name, namespace.as_deref(), json).await,

        Commands::Delete {
            kind,
            name,
            namespace,
            strict,
        } => commands::delete::run(&ctx, &kind, &name, namespace.as_deref(), strict).await,

        Commands::Kinds { kind, json } => commands::kinds::run(&ctx, kind.as_deref(), json),
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
