//! SCIAMACHY level-0 to calibrated cluster records.
//!
//! Decodes each product, calibrates its states and writes one JSON-lines
//! file per product into the output directory.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use calibration::{
    process_products_parallel, InMemorySolarStore, JsonLinesSink, ProcessorConfig, RecordSink,
    SolarSpectrumStore,
};
use cluster_config::ConfigStore;
use scia_common::CalibrationFlags;

#[derive(Parser, Debug)]
#[command(name = "l1c-processor")]
#[command(about = "Decode and calibrate SCIAMACHY level-0 products")]
struct Args {
    /// Level-0 product files
    #[arg(required = true)]
    products: Vec<PathBuf>,

    /// Processor configuration file (YAML); environment variables otherwise
    #[arg(short, long, env = "SCIA_CONFIG")]
    config: Option<PathBuf>,

    /// Cluster configuration store (YAML or JSON)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Calibration options, e.g. "ao,dark,vdark,refl,doppler"
    #[arg(long)]
    calibration: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<ProcessorConfig> {
    let mut config = match &args.config {
        Some(path) => ProcessorConfig::from_yaml(path)?,
        None => ProcessorConfig::from_env(),
    };

    if let Some(store) = &args.store {
        config.resolver.store_path = Some(store.clone());
    }
    if let Some(list) = &args.calibration {
        config.calibration.flags = CalibrationFlags::parse_list(list)
            .map_err(|name| anyhow!("unknown calibration option '{}'", name))?;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }

    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}

fn output_path(output: &Path, product: &Path) -> PathBuf {
    let stem = product
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("product");
    output.join(format!("{}.jsonl", stem))
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let config = load_config(&args)?;
    info!(
        flags = ?config.calibration.flags,
        products = args.products.len(),
        "Starting level-0 processing"
    );

    let store_path = config
        .resolver
        .store_path
        .as_ref()
        .context("no cluster store configured")?;
    let store = Arc::new(ConfigStore::load(store_path)?);

    let solar_store = match &config.calibration.solar_store_path {
        Some(path) => {
            let store = InMemorySolarStore::load(path)?;
            info!(path = %path.display(), spectra = store.len(), "Loaded solar spectra");
            Some(Arc::new(store) as Arc<dyn SolarSpectrumStore>)
        }
        None => None,
    };

    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()?;
    let cancel = AtomicBool::new(false);
    let output = args.output.clone();

    let results = pool.install(|| {
        process_products_parallel(
            &args.products,
            store,
            &config,
            solar_store,
            |product| {
                let file = File::create(output_path(&output, product))?;
                Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))) as Box<dyn RecordSink + Send>)
            },
            &cancel,
        )
    });

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(report) => info!(
                path = %path.display(),
                orbit = report.orbit,
                states_processed = report.states_processed,
                states_skipped = report.states_skipped,
                records = report.records_written,
                warnings = report.warnings.len(),
                "Product done"
            ),
            Err(e) => {
                failed += 1;
                error!(path = %path.display(), error = %e, "Product failed");
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} products failed", failed, results.len());
    }
    info!(products = results.len(), "Processing complete");
    Ok(())
}
