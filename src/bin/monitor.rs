//! casefile-monitor: follow a case's discovery pipeline from the terminal.
//!
//! Connects to the event channel, subscribes to one case, and logs
//! progress until interrupted. On exit it prints a summary of the
//! projected state.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use casefile_sync::{
    MemoryStore, StateStore, SyncClient, SyncOptions, WsTransport, WsTransportConfig,
};

#[derive(Parser, Debug)]
#[command(name = "casefile-monitor", about = "Follow a case's discovery pipeline")]
struct Args {
    /// Event channel URL
    #[arg(long, env = "CASEFILE_SYNC_URL", default_value = "ws://localhost:4500/events")]
    url: String,

    /// Case to subscribe to
    #[arg(long)]
    case_id: String,

    /// Processing run of interest, if already known
    #[arg(long)]
    processing_id: Option<String>,

    /// Delay between reconnect attempts, in seconds
    #[arg(long, env = "CASEFILE_SYNC_RECONNECT_DELAY", default_value_t = 5)]
    reconnect_delay: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let transport = WsTransport::spawn(WsTransportConfig {
        url: args.url.clone(),
        reconnect_delay: Duration::from_secs(args.reconnect_delay),
        ..WsTransportConfig::default()
    });
    let store = Arc::new(MemoryStore::new());

    info!(url = %args.url, case_id = %args.case_id, "Monitoring case");

    let mut options = SyncOptions::new().with_case(args.case_id.clone());
    if let Some(processing_id) = &args.processing_id {
        options = options.with_processing(processing_id.clone());
    }

    let client = SyncClient::mount(
        Arc::clone(&transport) as Arc<dyn casefile_sync::EventTransport>,
        Arc::clone(&store) as Arc<dyn StateStore>,
        options
            .on_fact_extracted(|fact| {
                info!(
                    fact_id = %fact.id,
                    category = %fact.category,
                    confidence = fact.confidence,
                    "Fact extracted"
                );
            })
            .on_processing_complete(|summary| {
                info!(
                    documents = summary.total_documents,
                    facts = summary.facts_extracted,
                    elapsed_ms = summary.elapsed_ms,
                    "Processing complete"
                );
            })
            .on_error(|message| {
                warn!(error = %message, "Pipeline error");
            }),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    client.unmount();
    transport.close();

    let state = store.snapshot();
    match &state.run {
        Some(run) => info!(
            processing_id = %run.id,
            status = ?run.status,
            documents = state.documents.len(),
            facts = state.facts.len(),
            processed = run.processed_count,
            total = run.total_files,
            "Final state"
        ),
        None => info!("No processing run observed"),
    }
}
