//! Core shoreline extraction and change analysis modules

pub mod contour;
pub mod geometry;
pub mod stats;
pub mod extract;
pub mod clean;
pub mod baseline;
pub mod transects;
pub mod rates;
pub mod hotspots;
pub mod merge;

// Re-export main types
pub use contour::marching_squares;
pub use extract::{ShorelineExtractor, ExtractionParams};
pub use clean::{ShorelineCleaner, CleaningParams};
pub use baseline::{Baseline, BaselineBuilder, BaselineParams, BaselineFallback, select_baseline_epoch};
pub use transects::{
    TransectSampler, TransectParams, Transect, TransectId, TransectSeries, DistanceObservation,
    EpochObservation, AbsenceReason,
};
pub use rates::{RateOfChangeEstimator, RateParams, RateOfChangeResult, RateEstimate, TrendFit, Certainty};
pub use hotspots::{HotspotAggregator, HotspotParams, Hotspot, HotspotId, HotspotSummary};
pub use merge::{
    TileMerger, MergeParams, TileOutput, SkippedTile, ShorelineSegment, ContinentalDataset,
    DatasetSummary,
};
