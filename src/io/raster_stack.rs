use crate::types::{CoastError, CoastResult, GeoTransform, IndexRaster, QualityMask, TileId};
use chrono::{Datelike, NaiveDate};
use geo::{Coord, Rect};

/// One reporting period's water-index composite and quality mask
#[derive(Debug, Clone)]
pub struct Epoch {
    pub date: NaiveDate,
    pub index: IndexRaster,
    pub valid: QualityMask,
}

impl Epoch {
    /// Create an epoch, checking that composite and mask share a shape
    pub fn new(date: NaiveDate, index: IndexRaster, valid: QualityMask) -> CoastResult<Self> {
        if index.dim() != valid.dim() {
            return Err(CoastError::InvalidInput(format!(
                "Epoch {}: composite shape {:?} does not match mask shape {:?}",
                date,
                index.dim(),
                valid.dim()
            )));
        }
        Ok(Self { date, index, valid })
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Fraction of pixels that are both unmasked and finite
    pub fn valid_fraction(&self) -> f64 {
        let total = self.index.len();
        if total == 0 {
            return 0.0;
        }
        let usable = self
            .index
            .iter()
            .zip(self.valid.iter())
            .filter(|(v, ok)| **ok && v.is_finite())
            .count();
        usable as f64 / total as f64
    }

    /// Nearest-pixel composite value at a world coordinate, if usable
    pub fn sample(&self, transform: &GeoTransform, point: Coord<f64>) -> Option<f32> {
        let (row, col) = transform.world_to_pixel(point)?;
        let (row, col) = (row.round(), col.round());
        let (rows, cols) = self.index.dim();
        if row < 0.0 || col < 0.0 || row >= rows as f64 || col >= cols as f64 {
            return None;
        }
        let (r, c) = (row as usize, col as usize);
        let value = self.index[[r, c]];
        (self.valid[[r, c]] && value.is_finite()).then_some(value)
    }
}

/// Convert a calendar date to a decimal year
pub fn decimal_year(date: NaiveDate) -> f64 {
    let days_in_year = if NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some() {
        366.0
    } else {
        365.0
    };
    date.year() as f64 + date.ordinal0() as f64 / days_in_year
}

/// Time-ordered per-epoch composites for one study tile
#[derive(Debug, Clone)]
pub struct RasterEpochStack {
    tile: TileId,
    transform: GeoTransform,
    bounds: Rect<f64>,
    epochs: Vec<Epoch>,
}

impl RasterEpochStack {
    /// Build a stack, ordering epochs by date.
    ///
    /// Fails when the stack is empty, when epochs disagree on raster shape or
    /// when two epochs share a timestamp.
    pub fn new(
        tile: TileId,
        transform: GeoTransform,
        bounds: Rect<f64>,
        mut epochs: Vec<Epoch>,
    ) -> CoastResult<Self> {
        let first = epochs.first().ok_or_else(|| {
            CoastError::InvalidInput(format!("{} has no epochs", tile))
        })?;
        let shape = first.index.dim();

        if let Some(bad) = epochs.iter().find(|e| e.index.dim() != shape) {
            return Err(CoastError::InvalidInput(format!(
                "{}: epoch {} has shape {:?}, expected {:?}",
                tile,
                bad.date,
                bad.index.dim(),
                shape
            )));
        }

        epochs.sort_by_key(|e| e.date);
        if let Some(pair) = epochs.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(CoastError::DuplicateTimestamp(pair[0].date));
        }

        log::debug!(
            "{}: stack of {} epochs ({} .. {}), grid {}x{}",
            tile,
            epochs.len(),
            epochs[0].date,
            epochs[epochs.len() - 1].date,
            shape.0,
            shape.1
        );

        Ok(Self {
            tile,
            transform,
            bounds,
            epochs,
        })
    }

    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Tile boundary used by the continental merge
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Epochs in ascending date order
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn epoch(year: i32, rows: usize, cols: usize) -> Epoch {
        Epoch::new(
            NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
            Array2::zeros((rows, cols)),
            Array2::from_elem((rows, cols), true),
        )
        .unwrap()
    }

    fn bounds() -> Rect<f64> {
        Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 90.0, y: 90.0 })
    }

    #[test]
    fn test_stack_sorts_epochs() {
        let gt = GeoTransform::north_up(0.0, 90.0, 30.0);
        let stack = RasterEpochStack::new(
            TileId(1),
            gt,
            bounds(),
            vec![epoch(2003, 3, 3), epoch(2001, 3, 3), epoch(2002, 3, 3)],
        )
        .unwrap();
        let years: Vec<i32> = stack.epochs().iter().map(|e| e.year()).collect();
        assert_eq!(years, vec![2001, 2002, 2003]);
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let gt = GeoTransform::north_up(0.0, 90.0, 30.0);
        let result = RasterEpochStack::new(
            TileId(1),
            gt,
            bounds(),
            vec![epoch(2001, 3, 3), epoch(2001, 3, 3)],
        );
        assert!(matches!(result, Err(CoastError::DuplicateTimestamp(_))));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let gt = GeoTransform::north_up(0.0, 90.0, 30.0);
        let result = RasterEpochStack::new(
            TileId(1),
            gt,
            bounds(),
            vec![epoch(2001, 3, 3), epoch(2002, 4, 3)],
        );
        assert!(matches!(result, Err(CoastError::InvalidInput(_))));

        let bad = Epoch::new(
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            Array2::zeros((3, 3)),
            Array2::from_elem((2, 3), true),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_valid_fraction_and_sample() {
        let mut e = epoch(2001, 2, 2);
        e.index[[0, 1]] = 0.4;
        e.index[[1, 1]] = f32::NAN;
        e.valid[[0, 0]] = false;
        assert!((e.valid_fraction() - 0.5).abs() < 1e-12);

        let gt = GeoTransform::north_up(0.0, 60.0, 30.0);
        assert_eq!(e.sample(&gt, Coord { x: 40.0, y: 50.0 }), Some(0.4));
        assert_eq!(e.sample(&gt, Coord { x: 10.0, y: 50.0 }), None);
        assert_eq!(e.sample(&gt, Coord { x: 200.0, y: 50.0 }), None);
    }

    #[test]
    fn test_decimal_year() {
        let d = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(decimal_year(d), 2020.0);
        let mid = NaiveDate::from_ymd_opt(2021, 7, 2).unwrap();
        assert!((decimal_year(mid) - (2021.0 + 182.0 / 365.0)).abs() < 1e-12);
    }
}
