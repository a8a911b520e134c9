//! GitLab Operator CLI - render and reconcile GitLab resources

use clap::{Parser, Subcommand};
use gitlab_operator::OperatorSettings;
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gitlab-operator")]
#[command(version)]
#[command(about = "Deploys GitLab on Kubernetes from its Helm chart", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: OperatorSettings,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the bundled charts
    Charts,

    /// Render a GitLab resource locally
    Template {
        /// GitLab resource manifest
        resource: PathBuf,

        /// Show only objects of this component
        #[arg(short, long)]
        component: Option<String>,

        /// Show the computed values
        #[arg(long)]
        show_values: bool,

        /// Leave hook documents out
        #[arg(long)]
        no_hooks: bool,
    },

    /// Reconcile a GitLab resource against the current cluster
    Reconcile {
        /// GitLab resource manifest; the live object of the same name is used
        resource: PathBuf,

        /// Leave hook documents out
        #[arg(long)]
        no_hooks: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Charts => commands::charts::run(&cli.settings),

        Commands::Template {
            resource,
            component,
            show_values,
            no_hooks,
        } => commands::template::run(
            &resource,
            component.as_deref(),
            show_values,
            no_hooks,
            &cli.settings,
        ),

        Commands::Reconcile { resource, no_hooks } => {
            commands::reconcile::run(&resource, no_hooks, &cli.settings).await
        }
    }
}
