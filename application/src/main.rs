//! Application workflow service.
//!
//! Reads one JSON request per line on stdin and writes one JSON outcome per
//! line on stdout. Logs go to stderr.

use filplus_application::api::{Outcome, Request};
use filplus_application::{AppConfig, ApplicationService, Collaborators, Infrastructure};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("filplus_application={0},filplus_runtime={0}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        topic = %config.events_topic,
        governance_reviewers = config.roles.governance_review_addresses.len(),
        root_key_holders = config.roles.rkh_addresses.len(),
        meta_allocators = config.roles.ma_addresses.len(),
        "Configuration loaded"
    );

    let service = ApplicationService::start(&config, Infrastructure::in_memory(), Collaborators::disabled()).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let outcome = match Request::parse(&line) {
            Ok(request) => service.handle_request(request).await,
            Err(error) => Outcome::<Value>::failed(&error),
        };
        let mut encoded = serde_json::to_vec(&outcome)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    service.shutdown().await;
    Ok(())
}
