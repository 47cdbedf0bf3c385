//! coastlines: Shoreline Extraction and Coastal Change Analysis
//!
//! This library turns per-epoch water-index composites into sub-pixel
//! shorelines, measures them along cross-shore transects, fits
//! rate-of-change trends, summarises them into coastal hotspots and merges
//! the per-tile results into one continental dataset.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    CoastError, CoastResult, GeoTransform, IndexRaster, QualityMask, Shoreline, TileId,
};

pub use config::CoastlinesConfig;
pub use io::{Epoch, RasterEpochStack};
pub use pipeline::{run_continental, TilePipeline};
