use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::cache::AddressCache;
use crate::errors::{AppError, AppResult};
use crate::geocode::{Coordinates, GeocodeResolver};
use crate::ingestion::{FinalizedRow, NormalizedRow};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total_rows: usize,
    pub cache_hits: usize,
    pub lookups: usize,
    pub located: usize,
    pub errored: usize,
}

/// Rows located so far, in input order, plus the rows that could not be geocoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub locations: Vec<FinalizedRow>,
    pub errors: Vec<NormalizedRow>,
    pub stats: BatchStats,
}

/// A run that stopped early. `partial` holds everything resolved before the stop.
#[derive(Debug, Error)]
#[error("batch halted: {cause}")]
pub struct BatchHalt {
    pub partial: BatchResult,
    #[source]
    pub cause: AppError,
}

impl BatchHalt {
    pub fn is_quota_exceeded(&self) -> bool {
        self.cause.is_quota_exceeded()
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Cache,
    Lookup,
}

pub struct BatchPipeline {
    cache: AddressCache,
    resolver: GeocodeResolver,
}

impl BatchPipeline {
    pub fn new(cache: AddressCache, resolver: GeocodeResolver) -> Self {
        Self { cache, resolver }
    }

    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// Geocode `rows` in order.
    ///
    /// Quota exhaustion flushes the cache and stops the run; the rows resolved
    /// up to that point come back inside the [`BatchHalt`]. Any other lookup
    /// failure only moves its row to `errors`.
    pub async fn run(&mut self, rows: &[NormalizedRow]) -> Result<BatchResult, BatchHalt> {
        let mut result = BatchResult {
            stats: BatchStats {
                total_rows: rows.len(),
                ..BatchStats::default()
            },
            ..BatchResult::default()
        };

        for row in rows {
            match self.coordinates_for(&row.address).await {
                Ok((coords, source)) => {
                    match source {
                        Source::Cache => result.stats.cache_hits += 1,
                        Source::Lookup => result.stats.lookups += 1,
                    }
                    trace!(address = %row.address, ?source, "row emitted");
                    result.locations.push(row.finalize(coords));
                    result.stats.located += 1;
                }
                Err(err) if err.is_quota_exceeded() => {
                    warn!(
                        address = %row.address,
                        remaining = rows.len() - result.stats.located - result.stats.errored,
                        "geocoding quota exceeded; halting batch"
                    );
                    if let Err(flush_err) = self.cache.flush() {
                        warn!(?flush_err, "failed to flush geocode cache before halting");
                    }
                    return Err(BatchHalt {
                        partial: result,
                        cause: err,
                    });
                }
                Err(err) => {
                    warn!(?err, address = %row.address, "failed to geocode row");
                    result.stats.lookups += 1;
                    result.stats.errored += 1;
                    result.errors.push(row.clone());
                }
            }
        }

        if let Err(cause) = self.cache.flush() {
            return Err(BatchHalt {
                partial: result,
                cause,
            });
        }

        info!(
            total = result.stats.total_rows,
            located = result.stats.located,
            errored = result.stats.errored,
            cache_hits = result.stats.cache_hits,
            lookups = result.stats.lookups,
            "geocoding batch finished"
        );
        Ok(result)
    }

    async fn coordinates_for(&mut self, address: &str) -> AppResult<(Coordinates, Source)> {
        if self.cache.contains(address) {
            debug!(address, "geocode cache hit");
            return Ok((self.cache.get(address)?, Source::Cache));
        }
        let coords = self.resolver.resolve(address).await?;
        self.cache.set(address, coords);
        Ok((coords, Source::Lookup))
    }
}
