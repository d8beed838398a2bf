//! Command line entry point: `pos-geocoder <API_KEY> <FILE.pdf>...`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pos_geocoder::{
    init_tracing, run, AppConfig, PdfTableExtractor, RunOptions, RunOutcome, TableSchema,
};
use secrecy::SecretString;

#[derive(Debug, Parser)]
#[command(
    name = "pos-geocoder",
    version,
    about = "Geocode point-of-sale tables from PDF listings into a CSV file"
)]
struct Cli {
    /// Google Geocoding API key.
    api_key: String,

    /// PDF files to read, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// CSV output path. Defaults to the first input's name with a `.csv` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Address cache file.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Table layout of the input files.
    #[arg(long, value_enum, default_value_t = TableSchema::GttAbb)]
    schema: TableSchema,

    /// Also write the rows that could not be geocoded to this CSV file.
    #[arg(long)]
    errors_output: Option<PathBuf>,

    /// Minimum delay between geocoding calls, in milliseconds.
    #[arg(long)]
    min_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::from_env();
    config.geocode_api_key = Some(SecretString::new(cli.api_key.into()));
    if let Some(cache) = cli.cache {
        config.cache_file = cache;
    }
    if let Some(min_interval_ms) = cli.min_interval_ms {
        config.min_interval_ms = min_interval_ms;
    }

    let options = RunOptions {
        inputs: cli.files,
        output: cli.output,
        errors_output: cli.errors_output,
        schema: cli.schema,
    };

    let outcome = run(&config, &options, &PdfTableExtractor::default())
        .await
        .context("geocoding run failed")?;

    match outcome {
        RunOutcome::Completed { output, result } => {
            println!(
                "Wrote {} locations to {} ({} addresses not geocoded)",
                result.locations.len(),
                output.display(),
                result.errors.len()
            );
        }
        RunOutcome::QuotaExceeded {
            partial_output,
            result,
        } => {
            println!("Google query limit reached: bye!");
            if let Some(path) = partial_output {
                println!(
                    "{} locations resolved before the limit saved to {}",
                    result.locations.len(),
                    path.display()
                );
            }
        }
    }
    Ok(())
}
