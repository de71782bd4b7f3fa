use anyhow::{bail, Result};
use energy_client::domain::OwnerId;
use energy_service::{
    config::AppConfig,
    observability,
    pipeline::IngestPipeline,
    store,
};
use std::{env, path::Path};
use tokio_util::sync::CancellationToken;

/// Import a CSV (or pipe-delimited `.dat`) file for one owner through the same
/// pipeline the HTTP upload uses.
///
/// Usage:
///   import_energy_csv <owner_id> <file_path>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: import_energy_csv <owner_id> <file_path>");
    }
    let owner = OwnerId::new(args[1].as_str());
    let path = Path::new(&args[2]);

    // Load configuration (ENERGY_CONFIG can point to an import-specific file).
    let cfg = AppConfig::load()?;
    let store = store::from_config(&cfg.store).await?;

    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("import.csv")
        .to_string();

    // Ctrl-C stops the parse between rows; nothing is written in that case.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let pipeline = IngestPipeline::new(store);
    let outcome = pipeline.ingest_upload(&owner, &file_name, bytes, &cancel).await?;

    tracing::info!(
        %owner,
        batch_id = outcome.batch_id,
        records = outcome.records,
        "import finished"
    );

    Ok(())
}
