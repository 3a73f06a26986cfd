//! Plan Board - HTTP server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plan_board::Config;
use std::path::PathBuf;
use uuid::Uuid;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plan-board")]
#[command(about = "Kanban plan/tab/task backend")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true, env = "PLAN_BOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print a bearer token signed with the configured auth secret
    IssueToken {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Subject id (random when omitted)
        #[arg(long)]
        user_id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plan_board=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            plan_board::start_server(config).await
        }
        Commands::IssueToken {
            email,
            name,
            user_id,
        } => {
            let auth = config
                .auth_config
                .as_ref()
                .context("issue-token needs an `auth` section in the config")?;
            let user_id = user_id.unwrap_or_else(Uuid::new_v4);
            let token = plan_board::auth::jwt::issue_token(auth, user_id, &email, &name)?;
            tracing::info!(%user_id, %email, expiry_secs = auth.jwt_expiry_secs, "token issued");
            println!("{}", token);
            Ok(())
        }
    }
}
