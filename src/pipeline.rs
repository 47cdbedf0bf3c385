//! Per-tile processing chain and the continental fork-join run

use crate::config::CoastlinesConfig;
use crate::core::{
    BaselineBuilder, ContinentalDataset, HotspotAggregator, RateOfChangeEstimator,
    ShorelineCleaner, ShorelineExtractor, SkippedTile, TileMerger, TileOutput, TransectSampler,
};
use crate::io::RasterEpochStack;
use crate::types::{CoastError, CoastResult, Shoreline};
use geo::LineString;
use std::collections::HashSet;

/// Runs extraction through hotspot aggregation for one tile at a time
pub struct TilePipeline {
    extractor: ShorelineExtractor,
    cleaner: ShorelineCleaner,
    baseline: BaselineBuilder,
    sampler: TransectSampler,
    estimator: RateOfChangeEstimator,
    aggregator: HotspotAggregator,
}

impl TilePipeline {
    pub fn new(config: &CoastlinesConfig) -> Self {
        Self {
            extractor: ShorelineExtractor::new(config.extraction.clone()),
            cleaner: ShorelineCleaner::new(config.cleaning.clone()),
            baseline: BaselineBuilder::new(config.baseline.clone(), config.extraction.threshold),
            sampler: TransectSampler::new(config.transects.clone()),
            estimator: RateOfChangeEstimator::new(config.rates.clone()),
            aggregator: HotspotAggregator::new(config.hotspots.clone()),
        }
    }

    /// Process one tile's epoch stack.
    ///
    /// Tile-level failures come back as errors for which
    /// [`CoastError::is_tile_level`] holds.
    pub fn run(&self, stack: &RasterEpochStack) -> CoastResult<TileOutput> {
        let tile = stack.tile();
        let transform = stack.transform();
        log::info!("{}: processing {} epochs", tile, stack.len());

        let raw = stack
            .epochs()
            .iter()
            .map(|epoch| self.extractor.extract(epoch, transform))
            .collect::<CoastResult<Vec<_>>>()?;

        // First pass has no reference yet; it only feeds baseline selection
        let provisional: Vec<Vec<LineString<f64>>> =
            raw.iter().map(|lines| self.cleaner.clean(lines, None)).collect();
        let baseline = self
            .baseline
            .build(tile, stack.epochs(), &provisional, transform)?;

        let shorelines: Vec<Shoreline> = stack
            .epochs()
            .iter()
            .zip(&raw)
            .map(|(epoch, lines)| Shoreline {
                tile,
                date: epoch.date,
                parts: self.cleaner.clean(lines, Some(baseline.parts.as_slice())),
            })
            .collect();
        let gaps = shorelines.iter().filter(|s| s.is_empty()).count();
        if gaps > 0 {
            log::debug!("{}: {} of {} epochs without a shoreline", tile, gaps, shorelines.len());
        }

        let transects = self.sampler.generate(&baseline);
        if transects.is_empty() {
            return Err(CoastError::DegenerateGeometry(format!(
                "{}: baseline of {:.0} m is too short for a single transect",
                tile,
                baseline.length()
            )));
        }

        let series = self.sampler.sample(&transects, &shorelines);
        let rates = self.estimator.estimate_all(&series)?;
        let hotspots = self.aggregator.aggregate(&transects, &rates);

        log::info!(
            "{}: {} transects, {} fitted rates, {} hotspots",
            tile,
            series.len(),
            rates.iter().filter(|r| r.rate().is_some()).count(),
            hotspots.len()
        );

        Ok(TileOutput {
            tile,
            bounds: stack.bounds(),
            baseline,
            shorelines,
            transects: series,
            rates,
            hotspots,
        })
    }

    /// Run every tile independently, setting aside tiles that fail on
    /// their own data. Any other error aborts the run.
    pub fn process_tiles(
        &self,
        stacks: &[RasterEpochStack],
    ) -> CoastResult<(Vec<TileOutput>, Vec<SkippedTile>)> {
        #[cfg(feature = "parallel")]
        let outcomes: Vec<CoastResult<TileOutput>> = {
            use rayon::prelude::*;
            stacks.par_iter().map(|stack| self.run(stack)).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<CoastResult<TileOutput>> =
            stacks.iter().map(|stack| self.run(stack)).collect();

        let mut outputs = Vec::with_capacity(stacks.len());
        let mut skipped = Vec::new();
        for (stack, outcome) in stacks.iter().zip(outcomes) {
            match outcome {
                Ok(output) => outputs.push(output),
                Err(e) if e.is_tile_level() => {
                    log::warn!("Skipping {}: {}", stack.tile(), e);
                    skipped.push(SkippedTile {
                        tile: stack.tile(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok((outputs, skipped))
    }
}

/// Validate the configuration, process all tiles, then merge them.
///
/// The merge starts only once every tile has finished.
pub fn run_continental(
    stacks: &[RasterEpochStack],
    config: &CoastlinesConfig,
) -> CoastResult<ContinentalDataset> {
    config.validate()?;

    let mut seen = HashSet::new();
    if let Some(duplicate) = stacks.iter().map(|s| s.tile()).find(|t| !seen.insert(*t)) {
        return Err(CoastError::InvalidInput(format!(
            "{} appears more than once in the input",
            duplicate
        )));
    }

    log::info!("Processing {} tiles", stacks.len());
    let (outputs, skipped) = TilePipeline::new(config).process_tiles(stacks)?;
    TileMerger::new(config.merge.clone(), config.hotspots.clone()).merge(&outputs, skipped)
}
