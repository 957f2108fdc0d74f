//! `adsync run` - execute one poll cycle.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use adsync_connector_ldap::LdapDirectory;
use adsync_events::MemoryEventChannel;
use adsync_poller::{
    make_synchronizer, InMemoryStateStore, PgSyncStateStore, PollOutcome, Poller, PollerRegistry,
    SyncStateStore,
};

use crate::config::{AppConfig, StateBackend};
use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct RunArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Run only the named poller instead of all of them
    #[arg(short, long, value_name = "NAME")]
    pub poller: Option<String>,
}

pub async fn execute(args: RunArgs) -> CliResult<()> {
    let config = AppConfig::load(&args.config)?;
    config.validate()?;

    let store = build_store(&config.state).await?;

    // Events go through an in-process channel and out as JSON lines;
    // piping stdout into a broker-side forwarder is the operator's
    // composition point.
    let (channel, mut events) = MemoryEventChannel::new();
    let channel = Arc::new(channel);
    let drain = tokio::spawn(async move {
        while let Some(record) = events.recv().await {
            if let Ok(line) = String::from_utf8(record.payload) {
                println!("{line}");
            }
        }
    });

    let mut registry = PollerRegistry::new();
    for entry in &config.pollers {
        let directory = Arc::new(LdapDirectory::new(entry.ldap.clone())?);
        let synchronizer = make_synchronizer(entry.poller.sync.kind, channel.clone());
        let poller = Poller::new(entry.poller.clone(), directory, synchronizer, store.clone())?;
        registry.register(poller)?;
    }

    info!(poller_count = registry.len(), "registry built");

    let outcomes = match &args.poller {
        Some(name) => vec![registry.run_one(name).await],
        None => registry.run_all().await,
    };

    // Let the drain task flush everything the pollers published. The
    // registry's synchronizers hold the remaining channel handles.
    drop(registry);
    drop(channel);
    let _ = drain.await;

    report_outcomes(&outcomes)
}

async fn build_store(backend: &StateBackend) -> CliResult<Arc<dyn SyncStateStore>> {
    match backend {
        StateBackend::Memory => Ok(Arc::new(InMemoryStateStore::new())),
        StateBackend::Postgres { url } => {
            let pool = PgPoolOptions::new()
                .max_connections(4)
                .connect(url)
                .await
                .map_err(|e| CliError::State(e.to_string()))?;
            let store = PgSyncStateStore::new(pool);
            store
                .ensure_schema()
                .await
                .map_err(|e| CliError::State(e.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

fn report_outcomes(outcomes: &[PollOutcome]) -> CliResult<()> {
    let mut failed = 0;

    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                eprintln!(
                    "{}: {} sync ok - fetched {} (added {}, updated {}, deleted {}), watermark {}",
                    outcome.poller_name,
                    report.phase,
                    report.fetched,
                    report.added,
                    report.updated,
                    report.deleted,
                    report
                        .watermark
                        .map(|w| w.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: failed - {e}", outcome.poller_name);
            }
        }
    }

    if failed > 0 {
        return Err(CliError::RunFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}
