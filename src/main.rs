//! Interactive demo binary.
//!
//! Reads messages from stdin, runs them through the processor, and prints
//! the composed reply plus the persisted record as JSON. Configuration
//! comes from `DISCOUNT_AGENT_CAMPAIGN` / `DISCOUNT_AGENT_TEMPLATES`
//! (TOML paths) or falls back to the built-in demo campaign.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use discount_agent::config::{ConfigProvider, Snapshot};
use discount_agent::fallback::{DisabledClassifier, FallbackConfig};
use discount_agent::pipeline::types::{IncomingMessage, Platform};
use discount_agent::pipeline::MessageProcessor;
use discount_agent::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let provider = Arc::new(build_provider()?);
    let store = Arc::new(MemoryStore::new());
    let processor = MessageProcessor::new(
        provider.clone(),
        store.clone(),
        Some(Arc::new(DisabledClassifier)),
        FallbackConfig::default(),
    );

    let snapshot = provider.snapshot();
    info!(
        campaign = %snapshot.campaign,
        creators = snapshot.index.len(),
        "Discount agent ready"
    );
    println!("campaign '{}' loaded with {} creators", snapshot.campaign, snapshot.index.len());
    println!("type a message as: <platform> <user_id> <text>   (/reload, /records, /quit)");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" => break,
            "/reload" => {
                match provider.reload() {
                    Ok(()) => println!("configuration reloaded"),
                    Err(e) => println!("reload failed: {e}"),
                }
                continue;
            }
            "/records" => {
                for record in store.all().await {
                    println!("{}", serde_json::to_string(&record)?);
                }
                continue;
            }
            _ => {}
        }

        let mut parts = line.splitn(3, char::is_whitespace);
        let (platform, user_id, text) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(u), Some(t)) => (p, u, t),
            _ => {
                println!("expected: <platform> <user_id> <text>");
                continue;
            }
        };
        let platform: Platform = match platform.parse() {
            Ok(p) => p,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match processor
            .process(IncomingMessage::new(platform, user_id, text))
            .await
        {
            Ok(out) => {
                println!("reply: {}", out.reply_text);
                println!("record: {}", serde_json::to_string(&out.record)?);
            }
            Err(e) => println!("rejected: {e}"),
        }
    }

    Ok(())
}

fn build_provider() -> anyhow::Result<ConfigProvider> {
    let campaign = std::env::var_os("DISCOUNT_AGENT_CAMPAIGN").map(PathBuf::from);
    let templates = std::env::var_os("DISCOUNT_AGENT_TEMPLATES").map(PathBuf::from);
    match (campaign, templates) {
        (Some(campaign), Some(templates)) => {
            ConfigProvider::from_files(&campaign, &templates).with_context(|| {
                format!(
                    "loading configuration from {} and {}",
                    campaign.display(),
                    templates.display()
                )
            })
        }
        (None, None) => {
            info!("No config paths set, using built-in demo campaign");
            Ok(ConfigProvider::from_snapshot(Snapshot::demo()))
        }
        _ => anyhow::bail!(
            "set both DISCOUNT_AGENT_CAMPAIGN and DISCOUNT_AGENT_TEMPLATES, or neither"
        ),
    }
}
