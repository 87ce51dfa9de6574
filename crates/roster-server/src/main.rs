use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use roster_server::build_router;
use roster_server::state::{apply_overrides, create_default_config, load_config, AppState};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "roster.toml")]
    config: PathBuf,
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
    #[arg(long, env = "GITHUB_REPO")]
    github_repo: Option<String>,
    #[arg(long, env = "GITHUB_FILE_PATH")]
    github_file_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.config.exists() {
        warn!("config file missing, creating default config");
        if let Err(err) = create_default_config(&args.config) {
            warn!(error = %err, path = %args.config.display(), "could not write default config");
        }
    }

    let mut config = load_config(&args.config)?;
    apply_overrides(
        &mut config,
        &[
            ("github.token", args.github_token),
            ("github.repo", args.github_repo),
            ("github.path", args.github_file_path),
        ],
    )?;
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state);

    info!("roster-server listening on {}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
