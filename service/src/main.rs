//! Outbox demo - queues mutations while offline and replays them on reconnect.
//!
//! Uses a file-backed store under `OUTBOX_STORAGE_DIR` and a simulated
//! backend that rejects the first attempt for every participant.

use outbox_service::{
    EntityType, ExecuteError, FileStore, FnExecutor, Language, NetworkMonitor, OfflineDataUpdate,
    OperationKind, SyncConfig, SyncEngine,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outbox_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env()?;

    tracing::info!(
        dir = %config.storage_dir.display(),
        max_attempts = config.max_attempts,
        "Starting Outbox demo"
    );

    let store = Arc::new(FileStore::new(config.storage_dir.clone()));
    let network = NetworkMonitor::new_shared(false);

    // Simulated backend
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let executor = FnExecutor::new(move |op| {
        let first_attempt = seen
            .lock()
            .map(|mut seen| seen.insert(op.id.clone()))
            .unwrap_or(false);
        let flaky = op.entity_type == EntityType::Participant && first_attempt;
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if flaky {
                Err(ExecuteError::new("503 Service Unavailable"))
            } else {
                Ok(())
            }
        })
    });

    let engine = SyncEngine::new(config, store, network, Arc::new(executor));

    // Platform connectivity feed
    let (feed, feed_rx) = watch::channel(false);
    engine.bind_network(feed_rx);
    engine.initialize().await;

    engine.subscribe(|status| {
        println!(
            "status: online={} syncing={} pending={} failed={}",
            status.is_online, status.is_syncing, status.pending_count, status.failed_count
        );
    });

    engine
        .enqueue(
            OperationKind::Create,
            EntityType::Event,
            "ev-1",
            json!({"name": "Team dinner"}),
        )
        .await;
    engine
        .enqueue(
            OperationKind::Create,
            EntityType::Participant,
            "p-1",
            json!({"eventId": "ev-1", "name": "Ana"}),
        )
        .await;
    engine
        .enqueue(
            OperationKind::Create,
            EntityType::Expense,
            "x-1",
            json!({"eventId": "ev-1", "amount": 8450}),
        )
        .await;
    engine
        .enqueue(
            OperationKind::Update,
            EntityType::Expense,
            "x-1",
            json!({"amount": 8900}),
        )
        .await;

    engine
        .offline_cache()
        .cache(OfflineDataUpdate {
            events: Some(vec![json!({"id": "ev-1", "name": "Team dinner"})]),
            ..Default::default()
        })
        .await?;

    if let Err(e) = engine.force_sync().await {
        println!("manual sync refused: {e}");
    }

    // Connectivity returns
    feed.send(true)?;
    let mut status = engine.watch_status();
    status.wait_for(|s| s.is_online).await?;
    engine.wait_idle().await;

    // Retry whatever the backend rejected
    let report = engine.force_sync().await?;
    println!("retry drain: {}", serde_json::to_string_pretty(&report)?);

    println!("last sync: {}", engine.describe_last_sync(Language::En));
    println!("última sincronización: {}", engine.describe_last_sync(Language::Es));

    engine.stop();
    Ok(())
}
