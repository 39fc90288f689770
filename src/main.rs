//! Demo of the embeddable log broker against a Fjall store

use proven_broker::{
    Broker, BrokerConfig, BrokerService, NewEntry, ProcOptions, RangeQuery, Result,
    SystemClock,
};
use proven_kvstore::{FjallStore, StoreConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dir = tempfile::tempdir().map_err(proven_kvstore::StoreError::from)?;
    tracing::info!("Data directory {:?}", dir.path());
    println!("=== Proven Log: embedded broker demo ===\n");

    // Demo 1: commit, claim, ack through the service
    {
        let store = FjallStore::open(StoreConfig::new(dir.path()))?;
        let broker = Broker::open(
            Arc::new(store),
            Arc::new(SystemClock::new()),
            BrokerConfig::default(),
        )?;
        let handle = BrokerService::spawn(broker);

        let committed = handle
            .commit(vec![
                NewEntry::new("orders", r#"{"item":"book"}"#),
                NewEntry::new("orders", r#"{"item":"lamp"}"#),
            ])
            .await?;
        for id in committed.ids() {
            println!("  committed {id}");
        }

        let options = ProcOptions::new("billing", "orders");
        while let Some(claimed) = handle.claim(options.clone()).await? {
            for entry in &claimed.entries {
                println!("  billing got {} {}", entry.id, entry.body);
            }
            let acked = handle.ack("billing").await?;
            println!(
                "  billing acked {}",
                acked.map(|r| r.to_string()).unwrap_or_default()
            );
        }

        handle.wait_for_procs(&["billing".to_string()]).await;
        handle.shutdown().await;
    }

    // Demo 2: reopen and read back
    {
        let store = FjallStore::open(StoreConfig::new(dir.path()))?;
        let broker = Broker::open(
            Arc::new(store),
            Arc::new(SystemClock::new()),
            BrokerConfig::default(),
        )?;
        println!("\n--- After restart ---");
        for entry in broker.range(&RangeQuery::new("orders").reverse(true))? {
            println!("  {} {}", entry.id, entry.body);
        }
        for proc in broker.procs() {
            println!(
                "  proc {} acked through {}",
                proc.name,
                proc.last_acked_range
                    .map(|r| r.end.to_string())
                    .unwrap_or_default()
            );
        }
    }

    println!("\n=== Demo completed ===");
    Ok(())
}
