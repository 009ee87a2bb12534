use aistrack_core::{MemoryStore, VesselStore};
use aistrack_server::decoder::NmeaParserDecoder;
use aistrack_server::ingest::{self, IngestError, IngestionLoop};
use aistrack_server::storage::JsonFileStore;
use aistrack_server::{Cli, IngestSettings, Tracker, VERSION};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .parse_default_env()
        .init();

    log::info!("aistrack-server {} starting", VERSION);

    let settings = IngestSettings::from(&args);
    log::debug!("Settings: {:?}", settings);

    let store: Arc<dyn VesselStore> = if args.memory_store {
        log::info!("Using in-memory vessel store, nothing is persisted");
        Arc::new(MemoryStore::new())
    } else {
        let store = JsonFileStore::open(args.data_dir())
            .map_err(IngestError::from)
            .into_diagnostic()?;
        log::info!("Vessel store in {}", store.base_dir().display());
        Arc::new(store)
    };

    // Failing to bind is the one fatal condition
    let socket = ingest::bind(settings.port).into_diagnostic()?;

    let tracker = Tracker::new(store);
    let ingestion = IngestionLoop::new(settings, tracker, NmeaParserDecoder::new());

    Toplevel::new(|s| async move {
        s.start(SubsystemBuilder::new("Ingestion", |subsys| {
            ingestion.run(subsys, socket)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(15))
    .await
    .map_err(Into::into)
}
