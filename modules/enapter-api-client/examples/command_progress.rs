//! Run a command on a device and print its progress as it arrives.
//!
//! To run this example:
//! ```bash
//! export ENAPTER_API_TOKEN="your-token-here"
//! export ENAPTER_API_URL="http://localhost:8080"  # Optional, defaults to https://api.enapter.com
//! cargo run --example command_progress -- <device-id> <command-name>
//! ```
//!
//! Press Ctrl-C to stop following the command.

use anyhow::{Context, bail};
use enapter_api_client::{CancellationToken, Client, CommandRequest};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(device_id), Some(command_name)) = (args.next(), args.next()) else {
        bail!("usage: command_progress <device-id> <command-name>");
    };

    let client = Client::from_env().context("create client")?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let request = CommandRequest::for_device(device_id, command_name);
    let mut progress = match client
        .commands()
        .execute_with_progress(&request, cancel)
        .await
    {
        Ok(progress) => progress,
        Err(err) => {
            if let Some(wait) = err.retry_after() {
                eprintln!(
                    "server is busy, retry in {}",
                    humantime::format_duration(wait)
                );
            }
            return Err(err).context("start command");
        }
    };

    println!("=== Progress ===\n");
    while let Some(event) = progress.recv().await {
        match event {
            Ok(result) => {
                let payload = result
                    .payload
                    .map_or_else(String::new, |p| serde_json::Value::Object(p).to_string());
                println!("{:?} {payload}", result.state);
                if result.state.is_terminal() {
                    break;
                }
            }
            Err(err) => eprintln!("skipping event: {err}"),
        }
    }

    Ok(())
}
