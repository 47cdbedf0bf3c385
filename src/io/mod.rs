//! Input contracts supplied by the raster-generation stage

pub mod raster_stack;

pub use raster_stack::{Epoch, RasterEpochStack};
