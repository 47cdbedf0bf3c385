use crate::core::contour::marching_squares;
use crate::core::geometry::is_closed;
use crate::io::Epoch;
use crate::types::{CoastResult, GeoTransform};
use geo::{Coord, LineString, Simplify};
use serde::{Deserialize, Serialize};

/// Shoreline extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    /// Water index value separating land (below) from water (above)
    pub threshold: f32,
    /// Minimum fraction of usable pixels for an epoch to be contoured
    pub min_valid_fraction: f64,
    /// Fragments whose end points lie within this distance (map units) are
    /// joined across masked gaps; 0 keeps every gap as a break
    pub gap_tolerance: f64,
    /// Fragments with fewer vertices are discarded
    pub min_vertices: usize,
    /// Douglas-Peucker tolerance (map units); 0 disables thinning
    pub simplify_tolerance: f64,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,          // MNDWI water/land boundary
            min_valid_fraction: 0.5,
            gap_tolerance: 60.0,     // two Landsat pixels
            min_vertices: 2,
            simplify_tolerance: 0.0,
        }
    }
}

/// Converts one epoch's composite into candidate shoreline polylines
pub struct ShorelineExtractor {
    params: ExtractionParams,
}

impl ShorelineExtractor {
    pub fn new(params: ExtractionParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(ExtractionParams::default())
    }

    pub fn params(&self) -> &ExtractionParams {
        &self.params
    }

    /// Extract threshold contours in world coordinates.
    ///
    /// An epoch whose usable-pixel fraction falls below
    /// `min_valid_fraction` yields an empty set rather than an error.
    pub fn extract(
        &self,
        epoch: &Epoch,
        transform: &GeoTransform,
    ) -> CoastResult<Vec<LineString<f64>>> {
        let coverage = epoch.valid_fraction();
        if coverage < self.params.min_valid_fraction {
            log::warn!(
                "Epoch {}: valid coverage {:.1}% below minimum {:.1}%, no shoreline extracted",
                epoch.date,
                coverage * 100.0,
                self.params.min_valid_fraction * 100.0
            );
            return Ok(Vec::new());
        }

        let grid_lines = marching_squares(&epoch.index, &epoch.valid, self.params.threshold)?;
        log::debug!(
            "Epoch {}: {} raw contour fragments at threshold {}",
            epoch.date,
            grid_lines.len(),
            self.params.threshold
        );

        let world_lines: Vec<Vec<Coord<f64>>> = grid_lines
            .into_iter()
            .map(|line| {
                line.into_iter()
                    .map(|(row, col)| transform.pixel_to_world(row, col))
                    .collect()
            })
            .collect();

        let joined = bridge_gaps(world_lines, self.params.gap_tolerance, epoch, transform);

        let shorelines: Vec<LineString<f64>> = joined
            .into_iter()
            .filter(|coords| coords.len() >= self.params.min_vertices.max(2))
            .map(LineString::new)
            .map(|line| {
                if self.params.simplify_tolerance > 0.0 {
                    line.simplify(&self.params.simplify_tolerance)
                } else {
                    line
                }
            })
            .collect();

        log::debug!("Epoch {}: {} shoreline candidates", epoch.date, shorelines.len());
        Ok(shorelines)
    }
}

/// How two open fragments are joined
#[derive(Debug, Clone, Copy)]
enum Join {
    EndToStart,
    EndToEnd,
    StartToEnd,
    StartToStart,
}

impl Join {
    const ALL: [Join; 4] = [Join::EndToStart, Join::EndToEnd, Join::StartToEnd, Join::StartToStart];

    fn ends(self, a: &[Coord<f64>], b: &[Coord<f64>]) -> (Coord<f64>, Coord<f64>) {
        match self {
            Join::EndToStart => (a[a.len() - 1], b[0]),
            Join::EndToEnd => (a[a.len() - 1], b[b.len() - 1]),
            Join::StartToEnd => (a[0], b[b.len() - 1]),
            Join::StartToStart => (a[0], b[0]),
        }
    }

    fn apply(self, a: Vec<Coord<f64>>, mut b: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
        match self {
            Join::EndToStart => [a, b].concat(),
            Join::EndToEnd => {
                b.reverse();
                [a, b].concat()
            }
            Join::StartToEnd => [b, a].concat(),
            Join::StartToStart => {
                b.reverse();
                [b, a].concat()
            }
        }
    }
}

/// Repeatedly join the closest pair of open fragment ends within `tolerance`
/// whose straight join passes over unusable pixels
fn bridge_gaps(
    mut lines: Vec<Vec<Coord<f64>>>,
    tolerance: f64,
    epoch: &Epoch,
    transform: &GeoTransform,
) -> Vec<Vec<Coord<f64>>> {
    if tolerance <= 0.0 {
        return lines;
    }

    loop {
        let mut best: Option<(f64, usize, usize, Join)> = None;
        for i in 0..lines.len() {
            if lines[i].is_empty() || is_closed(&lines[i]) {
                continue;
            }
            for j in (i + 1)..lines.len() {
                if lines[j].is_empty() || is_closed(&lines[j]) {
                    continue;
                }
                for join in Join::ALL {
                    let (p, q) = join.ends(&lines[i], &lines[j]);
                    let gap = (p.x - q.x).hypot(p.y - q.y);
                    if gap <= tolerance
                        && best.map_or(true, |(d, ..)| gap < d)
                        && crosses_unusable(epoch, transform, p, q)
                    {
                        best = Some((gap, i, j, join));
                    }
                }
            }
        }

        match best {
            Some((gap, i, j, join)) => {
                log::debug!("Bridging {:.1} m gap between fragments {} and {}", gap, i, j);
                let b = lines.remove(j);
                let a = std::mem::take(&mut lines[i]);
                lines[i] = join.apply(a, b);
            }
            None => break,
        }
    }

    lines
}

/// True when a pixel sampled along the straight line from `p` to `q` is
/// masked or non-finite
fn crosses_unusable(
    epoch: &Epoch,
    transform: &GeoTransform,
    p: Coord<f64>,
    q: Coord<f64>,
) -> bool {
    let step = transform.pixel_size() / 2.0;
    let length = (q.x - p.x).hypot(q.y - p.y);
    let steps = if step > 0.0 {
        ((length / step).ceil() as usize).clamp(1, 1024)
    } else {
        1
    };
    (0..=steps).any(|k| {
        let t = k as f64 / steps as f64;
        let point = Coord {
            x: p.x + t * (q.x - p.x),
            y: p.y + t * (q.y - p.y),
        };
        epoch.sample(transform, point).is_none()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;

    /// Water east of `shore_x`, 30 m pixels, 20 x 12 grid
    fn coast_epoch(shore_x: f64) -> (Epoch, GeoTransform) {
        let gt = GeoTransform::north_up(0.0, 600.0, 30.0);
        let index = Array2::from_shape_fn((20, 12), |(_, c)| {
            let x = 15.0 + 30.0 * c as f64;
            ((x - shore_x) / 300.0) as f32
        });
        let valid = Array2::from_elem((20, 12), true);
        let epoch = Epoch::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), index, valid).unwrap();
        (epoch, gt)
    }

    #[test]
    fn test_straight_coast_extracted_at_subpixel_position() {
        let (epoch, gt) = coast_epoch(172.0);
        let lines = ShorelineExtractor::standard().extract(&epoch, &gt).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0.len(), 20);
        for c in &lines[0].0 {
            assert!((c.x - 172.0).abs() < 1e-4, "x = {}", c.x);
        }
    }

    #[test]
    fn test_low_coverage_returns_empty() {
        let (mut epoch, gt) = coast_epoch(172.0);
        for r in 0..15 {
            for c in 0..12 {
                epoch.valid[[r, c]] = false;
            }
        }
        let lines = ShorelineExtractor::standard().extract(&epoch, &gt).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_gap_tolerance_controls_bridging() {
        let (mut epoch, gt) = coast_epoch(172.0);
        for c in 0..12 {
            epoch.valid[[10, c]] = false;
        }

        let broken = ShorelineExtractor::new(ExtractionParams {
            gap_tolerance: 0.0,
            ..ExtractionParams::default()
        })
        .extract(&epoch, &gt)
        .unwrap();
        assert_eq!(broken.len(), 2);

        let bridged = ShorelineExtractor::new(ExtractionParams {
            gap_tolerance: 90.0,
            ..ExtractionParams::default()
        })
        .extract(&epoch, &gt)
        .unwrap();
        assert_eq!(bridged.len(), 1);
        assert_eq!(bridged[0].0.len(), 19);
    }

    #[test]
    fn test_fragments_meeting_at_raster_edge_not_bridged() {
        // Two bays open to the northern edge, one land column apart
        let gt = GeoTransform::north_up(0.0, 360.0, 30.0);
        let index = Array2::from_shape_fn((12, 12), |(r, c)| {
            let bay = (2..=4).contains(&c) || (6..=8).contains(&c);
            if r <= 3 && bay {
                1.0
            } else {
                -1.0
            }
        });
        let valid = Array2::from_elem((12, 12), true);
        let epoch = Epoch::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), index, valid).unwrap();

        let lines = ShorelineExtractor::new(ExtractionParams {
            gap_tolerance: 60.0,
            ..ExtractionParams::default()
        })
        .extract(&epoch, &gt)
        .unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_simplify_thins_straight_line() {
        let (epoch, gt) = coast_epoch(172.0);
        let lines = ShorelineExtractor::new(ExtractionParams {
            simplify_tolerance: 1.0,
            ..ExtractionParams::default()
        })
        .extract(&epoch, &gt)
        .unwrap();
        assert_eq!(lines[0].0.len(), 2);
    }
}
