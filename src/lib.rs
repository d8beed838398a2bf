mod cache;
mod config;
mod errors;
mod export;
mod extract;
mod geocode;
mod ingestion;
mod pipeline;

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cache::AddressCache;
pub use config::{AppConfig, DEFAULT_CACHE_FILE, DEFAULT_GEOCODE_ENDPOINT};
pub use errors::{AppError, AppResult};
pub use export::{
    default_output_path, partial_output_path, write_errors, write_locations, ERRORS_HEADER,
    LOCATIONS_HEADER,
};
pub use extract::{parse_files, PdfTableExtractor, Table, TableExtractor};
pub use geocode::{
    format_coordinate, Coordinates, GeocodeLookup, GeocodeResolver, GeocodeResponse,
    HttpGeocodeClient, RateLimiter,
};
pub use ingestion::{
    is_duplicated, FinalizedRow, GttAbbNormalizer, NormalizedRow, PassThroughNormalizer, RawRow,
    RowNormalizer, TableSchema,
};
pub use pipeline::{BatchHalt, BatchPipeline, BatchResult, BatchStats};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub errors_output: Option<PathBuf>,
    pub schema: TableSchema,
}

impl RunOptions {
    pub fn output_path(&self) -> AppResult<PathBuf> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        self.inputs
            .first()
            .map(|first| default_output_path(first))
            .ok_or_else(|| AppError::Config("no input files given".into()))
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        output: PathBuf,
        result: BatchResult,
    },
    /// The provider refused further lookups. Rows located before that point
    /// were saved to `partial_output` when there were any.
    QuotaExceeded {
        partial_output: Option<PathBuf>,
        result: BatchResult,
    },
}

/// Parse the input files, geocode every row and write the CSV output.
pub async fn run(
    config: &AppConfig,
    options: &RunOptions,
    extractor: &dyn TableExtractor,
) -> AppResult<RunOutcome> {
    let output = options.output_path()?;
    let normalizer = options.schema.normalizer();
    let rows = parse_files(extractor, normalizer.as_ref(), &options.inputs)?;
    info!(
        rows = rows.len(),
        files = options.inputs.len(),
        schema = options.schema.as_tag(),
        "parsed input tables"
    );

    let resolver = GeocodeResolver::new(config)?;
    let cache = AddressCache::load(&config.cache_file);
    let mut pipeline = BatchPipeline::new(cache, resolver);

    match pipeline.run(&rows).await {
        Ok(result) => {
            write_locations(&output, &LOCATIONS_HEADER, &result.locations)?;
            write_error_rows(options, &result)?;
            Ok(RunOutcome::Completed { output, result })
        }
        Err(halt) if halt.is_quota_exceeded() => {
            let BatchHalt { partial, .. } = halt;
            let partial_output = if partial.locations.is_empty() {
                None
            } else {
                let path = partial_output_path(&output);
                write_locations(&path, &LOCATIONS_HEADER, &partial.locations)?;
                Some(path)
            };
            write_error_rows(options, &partial)?;
            Ok(RunOutcome::QuotaExceeded {
                partial_output,
                result: partial,
            })
        }
        Err(halt) => Err(halt.cause),
    }
}

fn write_error_rows(options: &RunOptions, result: &BatchResult) -> AppResult<()> {
    match &options.errors_output {
        Some(path) => write_errors(path, &result.errors),
        None => {
            for row in &result.errors {
                warn!(address = %row.address, "address could not be geocoded");
            }
            Ok(())
        }
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,pos_geocoder=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
