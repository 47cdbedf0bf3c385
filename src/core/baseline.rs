use crate::core::geometry::{is_closed, normalize, polyline_length, resample};
use crate::io::Epoch;
use crate::types::{CoastError, CoastResult, GeoTransform, TileId};
use chrono::NaiveDate;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// What to do when the configured baseline epoch has no usable shoreline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineFallback {
    /// Fail the tile
    Strict,
    /// Closest usable epoch in time, preferring the later one on ties
    NearestEpoch,
    /// Latest usable epoch
    MostRecent,
}

/// Baseline construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    /// Reporting year whose shoreline becomes the baseline
    pub baseline_year: i32,
    pub fallback: BaselineFallback,
    /// Vertex spacing of the resampled baseline (map units)
    pub vertex_spacing: f64,
    /// Moving-average window in vertices (odd)
    pub smoothing_window: usize,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            baseline_year: 2021,
            fallback: BaselineFallback::NearestEpoch,
            vertex_spacing: 15.0,
            smoothing_window: 5,
        }
    }
}

/// Reference line from which every transect distance is measured.
///
/// Each part is oriented with water on its left-hand side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub tile: TileId,
    pub year: i32,
    pub date: NaiveDate,
    pub parts: Vec<LineString<f64>>,
}

impl Baseline {
    pub fn length(&self) -> f64 {
        self.parts.iter().map(polyline_length).sum()
    }
}

/// Choose the epoch that supplies the baseline.
///
/// `candidates` holds `(year, usable)` per epoch in time order. Returns the
/// index of the chosen epoch, or `None` when the policy finds nothing usable.
pub fn select_baseline_epoch(
    candidates: &[(i32, bool)],
    baseline_year: i32,
    fallback: BaselineFallback,
) -> Option<usize> {
    let configured = candidates
        .iter()
        .position(|&(year, usable)| year == baseline_year && usable);
    if configured.is_some() {
        return configured;
    }

    match fallback {
        BaselineFallback::Strict => None,
        BaselineFallback::MostRecent => candidates.iter().rposition(|&(_, usable)| usable),
        BaselineFallback::NearestEpoch => candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.1)
            .min_by_key(|(_, c)| ((c.0 - baseline_year).abs(), -c.0))
            .map(|(i, _)| i),
    }
}

/// Derives the smoothed, resampled tile baseline
pub struct BaselineBuilder {
    params: BaselineParams,
    water_threshold: f32,
}

impl BaselineBuilder {
    pub fn new(params: BaselineParams, water_threshold: f32) -> Self {
        Self {
            params,
            water_threshold,
        }
    }

    pub fn params(&self) -> &BaselineParams {
        &self.params
    }

    /// Build the baseline from cleaned per-epoch shorelines.
    ///
    /// `cleaned[i]` belongs to `epochs[i]`. Fails with
    /// [`CoastError::NoUsableBaseline`] when the fallback policy finds no
    /// epoch with a shoreline, and [`CoastError::DegenerateGeometry`] when
    /// smoothing leaves nothing usable.
    pub fn build(
        &self,
        tile: TileId,
        epochs: &[Epoch],
        cleaned: &[Vec<LineString<f64>>],
        transform: &GeoTransform,
    ) -> CoastResult<Baseline> {
        if epochs.len() != cleaned.len() {
            return Err(CoastError::InvalidInput(format!(
                "{} epochs but {} cleaned shoreline sets",
                epochs.len(),
                cleaned.len()
            )));
        }

        let candidates: Vec<(i32, bool)> = epochs
            .iter()
            .zip(cleaned)
            .map(|(epoch, lines)| (epoch.year(), !lines.is_empty()))
            .collect();

        let chosen = select_baseline_epoch(
            &candidates,
            self.params.baseline_year,
            self.params.fallback,
        )
        .ok_or_else(|| {
            CoastError::NoUsableBaseline(format!(
                "{}: no shoreline for baseline year {} under {:?} policy",
                tile, self.params.baseline_year, self.params.fallback
            ))
        })?;

        let epoch = &epochs[chosen];
        if epoch.year() != self.params.baseline_year {
            log::warn!(
                "{}: baseline year {} unusable, falling back to {}",
                tile,
                self.params.baseline_year,
                epoch.year()
            );
        }

        let parts: Vec<LineString<f64>> = cleaned[chosen]
            .iter()
            .map(|line| self.smooth(line))
            .filter(|line| line.0.len() >= 2 && polyline_length(line) > 0.0)
            .map(|line| self.orient(line, epoch, transform))
            .collect();

        if parts.is_empty() {
            return Err(CoastError::DegenerateGeometry(format!(
                "{}: baseline from {} collapsed during smoothing",
                tile, epoch.date
            )));
        }

        let baseline = Baseline {
            tile,
            year: epoch.year(),
            date: epoch.date,
            parts,
        };
        log::info!(
            "{}: baseline from {} with {} part(s), {:.0} m",
            tile,
            baseline.date,
            baseline.parts.len(),
            baseline.length()
        );
        Ok(baseline)
    }

    /// Resample to the vertex spacing, then apply a moving average
    fn smooth(&self, line: &LineString<f64>) -> LineString<f64> {
        let resampled = resample(line, self.params.vertex_spacing);
        let window = self.params.smoothing_window.max(1) | 1;
        if window == 1 || resampled.0.len() < 3 {
            return resampled;
        }
        let half = window / 2;

        if is_closed(&resampled.0) {
            let ring = &resampled.0[..resampled.0.len() - 1];
            let n = ring.len();
            let mut smoothed: Vec<Coord<f64>> = (0..n)
                .map(|i| {
                    let (mut x, mut y) = (0.0, 0.0);
                    for k in 0..window {
                        let c = ring[(i + k + n * window - half) % n];
                        x += c.x;
                        y += c.y;
                    }
                    Coord {
                        x: x / window as f64,
                        y: y / window as f64,
                    }
                })
                .collect();
            smoothed.push(smoothed[0]);
            return LineString::new(smoothed);
        }

        let coords = &resampled.0;
        let n = coords.len();
        let smoothed = (0..n)
            .map(|i| {
                let h = half.min(i).min(n - 1 - i);
                let span = &coords[i - h..=i + h];
                let count = span.len() as f64;
                Coord {
                    x: span.iter().map(|c| c.x).sum::<f64>() / count,
                    y: span.iter().map(|c| c.y).sum::<f64>() / count,
                }
            })
            .collect();
        LineString::new(smoothed)
    }

    /// Reverse a part if the baseline epoch shows water on its right
    fn orient(
        &self,
        mut line: LineString<f64>,
        epoch: &Epoch,
        transform: &GeoTransform,
    ) -> LineString<f64> {
        let reach = transform.pixel_size();
        let is_water = |c: Coord<f64>| {
            epoch
                .sample(transform, c)
                .map(|v| v > self.water_threshold)
        };

        let coords = &line.0;
        let mut votes: i64 = 0;
        for i in 0..coords.len() {
            let prev = coords[i.saturating_sub(1)];
            let next = coords[(i + 1).min(coords.len() - 1)];
            let Some(tangent) = normalize(Coord {
                x: next.x - prev.x,
                y: next.y - prev.y,
            }) else {
                continue;
            };
            let left = Coord {
                x: coords[i].x - tangent.y * reach,
                y: coords[i].y + tangent.x * reach,
            };
            let right = Coord {
                x: coords[i].x + tangent.y * reach,
                y: coords[i].y - tangent.x * reach,
            };
            match (is_water(left), is_water(right)) {
                (Some(true), Some(false)) => votes += 1,
                (Some(false), Some(true)) => votes -= 1,
                _ => {}
            }
        }

        if votes < 0 {
            line.0.reverse();
        } else if votes == 0 {
            log::debug!("Baseline part orientation undetermined, keeping contour order");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_select_configured_year() {
        let candidates = [(2019, true), (2020, true), (2021, true)];
        assert_eq!(
            select_baseline_epoch(&candidates, 2020, BaselineFallback::Strict),
            Some(1)
        );
    }

    #[test]
    fn test_select_fallback_policies() {
        let candidates = [(2018, true), (2019, true), (2020, false), (2021, true), (2022, false)];
        assert_eq!(
            select_baseline_epoch(&candidates, 2020, BaselineFallback::Strict),
            None
        );
        // 2019 and 2021 are equally close; the later one wins
        assert_eq!(
            select_baseline_epoch(&candidates, 2020, BaselineFallback::NearestEpoch),
            Some(3)
        );
        assert_eq!(
            select_baseline_epoch(&candidates, 2022, BaselineFallback::NearestEpoch),
            Some(3)
        );
        assert_eq!(
            select_baseline_epoch(&candidates, 2020, BaselineFallback::MostRecent),
            Some(3)
        );
        assert_eq!(
            select_baseline_epoch(&[(2020, false)], 2020, BaselineFallback::NearestEpoch),
            None
        );
    }

    /// Water east of x = 172, 30 m pixels
    fn epoch(year: i32) -> (Epoch, GeoTransform) {
        let gt = GeoTransform::north_up(0.0, 600.0, 30.0);
        let index = Array2::from_shape_fn((20, 12), |(_, c)| {
            ((15.0 + 30.0 * c as f64 - 172.0) / 300.0) as f32
        });
        let valid = Array2::from_elem((20, 12), true);
        let date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
        (Epoch::new(date, index, valid).unwrap(), gt)
    }

    #[test]
    fn test_baseline_oriented_with_water_on_left() {
        let (e, gt) = epoch(2021);
        // Drawn northwards: water (east) is on the right, so it must flip
        let northwards = LineString::from(vec![(172.0, 15.0), (172.0, 585.0)]);
        let builder = BaselineBuilder::new(BaselineParams::default(), 0.0);
        let baseline = builder
            .build(TileId(3), &[e], &[vec![northwards]], &gt)
            .unwrap();

        assert_eq!(baseline.year, 2021);
        let part = &baseline.parts[0];
        assert!(part.0[0].y > part.0[part.0.len() - 1].y);
        assert!((baseline.length() - 570.0).abs() < 1e-6);
        assert!(part.0.iter().all(|c| (c.x - 172.0).abs() < 1e-9));
    }

    #[test]
    fn test_no_usable_epoch_is_tile_error() {
        let (e, gt) = epoch(2021);
        let builder = BaselineBuilder::new(BaselineParams::default(), 0.0);
        let err = builder.build(TileId(3), &[e], &[vec![]], &gt).unwrap_err();
        assert!(matches!(err, CoastError::NoUsableBaseline(_)));
        assert!(err.is_tile_level());
    }

    #[test]
    fn test_smoothing_flattens_zigzag() {
        let builder = BaselineBuilder::new(
            BaselineParams {
                vertex_spacing: 10.0,
                smoothing_window: 3,
                ..BaselineParams::default()
            },
            0.0,
        );
        // 10 m segments alternating between y = 0 and y = 6
        let zigzag = LineString::from(
            (0..=20)
                .map(|i| (i as f64 * 8.0, if i % 2 == 0 { 0.0 } else { 6.0 }))
                .collect::<Vec<_>>(),
        );
        let smoothed = builder.smooth(&zigzag);
        assert_eq!(smoothed.0.len(), 21);
        let interior_spread = smoothed.0[1..smoothed.0.len() - 1]
            .iter()
            .map(|c| c.y)
            .fold(0.0f64, |acc, y| acc.max((y - 3.0).abs()));
        assert!(interior_spread < 1.5);
    }

    #[test]
    fn test_closed_ring_stays_closed() {
        let builder = BaselineBuilder::new(BaselineParams::default(), 0.0);
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (300.0, 0.0),
            (300.0, 300.0),
            (0.0, 300.0),
            (0.0, 0.0),
        ]);
        let smoothed = builder.smooth(&ring);
        assert_eq!(smoothed.0.first(), smoothed.0.last());
    }
}
