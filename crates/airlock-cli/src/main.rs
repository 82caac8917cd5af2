//! The `airlock` binary: argument parsing, tracing bootstrap, and service
//! wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use airlock_core::{current_unix_timestamp_ms, write_text_atomic};
use airlock_credential::CredentialService;
use airlock_crypto::MasterKey;
use airlock_dispatch::{Dispatcher, DispatcherConfig};
use airlock_gateway::{run_server, AdminAuthMode, GatewayState};
use airlock_profile::ProfileService;
use airlock_sandbox::ScriptSandbox;
use airlock_store::Store;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const MASTER_KEY_FILE_NAME: &str = "master.key";
const STORE_FILE_NAME: &str = "airlock.db";
const SERVER_STATE_FILE_NAME: &str = "server.json";

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "airlock",
    about = "Credential-brokered script execution service for autonomous agents",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "DATA_DIR",
        default_value = ".airlock",
        help = "Directory holding the master key file and the relational store"
    )]
    data_dir: PathBuf,

    #[arg(
        long,
        env = "AIRLOCK_BIND",
        default_value = "127.0.0.1:9090",
        help = "Socket address the gateway listens on"
    )]
    bind: String,

    #[arg(
        long,
        env = "AIRLOCK_WORKERS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Number of sandbox worker slots"
    )]
    workers: usize,

    #[arg(
        long,
        env = "AIRLOCK_QUEUE_DEPTH",
        default_value_t = 64,
        value_parser = parse_positive_usize,
        help = "Pending executions accepted before submits are rejected with 503"
    )]
    queue_depth: usize,

    #[arg(
        long = "default-timeout-seconds",
        env = "AIRLOCK_DEFAULT_TIMEOUT_SECONDS",
        default_value_t = 30,
        value_parser = parse_positive_u64,
        help = "Script wall-clock budget when the execute body omits one"
    )]
    default_timeout_seconds: u64,

    #[arg(
        long = "llm-wait-timeout-seconds",
        env = "AIRLOCK_LLM_WAIT_TIMEOUT_SECONDS",
        default_value_t = 300,
        value_parser = parse_positive_u64,
        help = "How long a suspended execution waits for an llm response before failing"
    )]
    llm_wait_timeout_seconds: u64,

    #[arg(
        long = "admin-token",
        env = "AIRLOCK_ADMIN_TOKEN",
        help = "Bearer token required on /api/admin endpoints; omit for local development"
    )]
    admin_token: Option<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create data dir {}", cli.data_dir.display()))?;

    let master_key = MasterKey::load_or_create(&cli.data_dir.join(MASTER_KEY_FILE_NAME))
        .context("failed to load or create the master key")?;
    let store = Arc::new(
        Store::open(&cli.data_dir.join(STORE_FILE_NAME)).context("failed to open the store")?,
    );

    let credentials = CredentialService::new(store.clone(), master_key.clone());
    let profiles = ProfileService::new(store.clone(), master_key);
    let dispatcher = Dispatcher::start(
        store,
        Arc::new(ScriptSandbox::new()),
        DispatcherConfig {
            worker_count: cli.workers,
            queue_depth: cli.queue_depth,
            default_timeout: Duration::from_secs(cli.default_timeout_seconds),
            llm_wait_timeout: Duration::from_secs(cli.llm_wait_timeout_seconds),
        },
    )
    .context("failed to start the dispatcher")?;

    let admin_auth = match cli.admin_token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => AdminAuthMode::Token(token.to_string()),
        _ => {
            tracing::warn!("no admin token configured; operator endpoints are open");
            AdminAuthMode::LocalhostDev
        }
    };

    write_server_state_file(&cli.data_dir, &cli.bind)?;

    let state = Arc::new(GatewayState {
        credentials,
        profiles,
        dispatcher,
        admin_auth,
    });
    run_server(state, &cli.bind).await
}

/// Records where this instance is serving from so operator tooling can find
/// a running server without guessing.
fn write_server_state_file(data_dir: &std::path::Path, bind: &str) -> Result<()> {
    let payload = serde_json::json!({
        "bind": bind,
        "pid": std::process::id(),
        "started_at_unix_ms": current_unix_timestamp_ms(),
    });
    let mut encoded =
        serde_json::to_string_pretty(&payload).context("failed to encode server state")?;
    encoded.push('\n');
    write_text_atomic(&data_dir.join(SERVER_STATE_FILE_NAME), &encoded)
}
