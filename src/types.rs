use chrono::NaiveDate;
use geo::{Coord, LineString, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Continuous water-index composite (e.g. MNDWI), water above the threshold
pub type IndexRaster = Array2<f32>;

/// Per-pixel quality mask, `true` where the composite is usable
pub type QualityMask = Array2<bool>;

/// Study tile identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileId(pub u32);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile{:04}", self.0)
    }
}

/// Affine pixel-to-world transformation (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up grid with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// World coordinate of a fractional grid position, where integer
    /// `(row, col)` addresses the pixel centre.
    pub fn pixel_to_world(&self, row: f64, col: f64) -> Coord<f64> {
        let c = col + 0.5;
        let r = row + 0.5;
        Coord {
            x: self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            y: self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        }
    }

    /// Inverse of [`GeoTransform::pixel_to_world`]; `None` for a singular transform
    pub fn world_to_pixel(&self, point: Coord<f64>) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let dx = point.x - self.top_left_x;
        let dy = point.y - self.top_left_y;
        let col = (dx * self.pixel_height - dy * self.rotation_x) / det;
        let row = (dy * self.pixel_width - dx * self.rotation_y) / det;
        Some((row - 0.5, col - 0.5))
    }

    /// Mean ground size of one pixel
    pub fn pixel_size(&self) -> f64 {
        let along_x = self.pixel_width.hypot(self.rotation_y);
        let along_y = self.rotation_x.hypot(self.pixel_height);
        (along_x + along_y) / 2.0
    }

    /// Bounding rectangle of a `rows` x `cols` grid
    pub fn extent(&self, rows: usize, cols: usize) -> Rect<f64> {
        let corners = [
            self.pixel_to_world(-0.5, -0.5),
            self.pixel_to_world(-0.5, cols as f64 - 0.5),
            self.pixel_to_world(rows as f64 - 0.5, -0.5),
            self.pixel_to_world(rows as f64 - 0.5, cols as f64 - 0.5),
        ];
        let min_x = corners.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
    }
}

/// Cleaned shoreline for one (tile, epoch). Empty `parts` marks a data gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shoreline {
    pub tile: TileId,
    pub date: NaiveDate,
    pub parts: Vec<LineString<f64>>,
}

impl Shoreline {
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Error types for coastline processing
#[derive(Debug, thiserror::Error)]
pub enum CoastError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate epoch timestamp: {0}")]
    DuplicateTimestamp(NaiveDate),

    #[error("No usable baseline epoch: {0}")]
    NoUsableBaseline(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),
}

impl CoastError {
    /// Errors that abort only the tile that raised them
    pub fn is_tile_level(&self) -> bool {
        matches!(
            self,
            CoastError::NoUsableBaseline(_) | CoastError::DegenerateGeometry(_)
        )
    }
}

/// Result type for coastline operations
pub type CoastResult<T> = Result<T, CoastError>;
