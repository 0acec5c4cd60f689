use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the pending pool
    Submit {
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        recipient: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Mine the pending pool into a new block
    Mine,
    /// Print the full chain
    Chain,
    /// Print the tip height and hash
    Head,
    /// Ask the node to re-check every block
    Validate,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let node = cli.node.trim_end_matches('/');
    let req = match cli.cmd {
        Command::Submit {
            sender,
            recipient,
            amount,
        } => client.post(format!("{node}/tx")).json(&Tx {
            sender,
            recipient,
            amount,
        }),
        Command::Mine => client.post(format!("{node}/mine")),
        Command::Chain => client.get(format!("{node}/chain")),
        Command::Head => client.get(format!("{node}/chain/head")),
        Command::Validate => client.get(format!("{node}/validate")),
    };

    debug!(?req, "sending request");
    let res = req.send().await?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {status}");
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
