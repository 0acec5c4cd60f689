use anyhow::Context;
use clap::Parser;
use ledger_core::{Ledger, LedgerConfig, MiningMode, SharedLedger};
use ledger_node::{router, AppState};
use std::net::SocketAddr;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
#[command(about = "HTTP node serving a single in-memory proof-of-work ledger")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Leading zero hex characters required in a mined block hash
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = ledger_core::constants::DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Search nonces on all cores instead of the request's blocking thread
    #[arg(long, env = "LEDGER_PARALLEL")]
    parallel: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = LedgerConfig {
        difficulty: args.difficulty,
        mining: if args.parallel {
            MiningMode::Parallel
        } else {
            MiningMode::Sequential
        },
    };
    info!(difficulty = config.difficulty, mining = ?config.mining, "starting ledger");

    let state = AppState {
        ledger: SharedLedger::new(Ledger::with_config(config)),
    };
    let app = router(state);

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", args.listen))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("ledger-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
