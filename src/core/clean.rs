use crate::core::geometry::{
    count_self_intersections, distance_to_lines, distance_to_polyline, polyline_length,
};
use crate::core::stats::median;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Shoreline cleaning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningParams {
    /// Parts shorter than this (map units) are treated as noise
    pub min_length: f64,
    /// Parts with more self-crossings than this are topologically invalid
    pub max_self_intersections: usize,
    /// Parts whose median vertex distance to the reference exceeds this are
    /// implausible (tidal or cloud artefacts, inland water)
    pub max_reference_distance: f64,
    /// Stretches of a part lying within this distance of a longer part are
    /// duplicates and are trimmed away
    pub duplicate_tolerance: f64,
}

impl Default for CleaningParams {
    fn default() -> Self {
        Self {
            min_length: 200.0,
            max_self_intersections: 0,
            max_reference_distance: 1000.0,
            duplicate_tolerance: 15.0, // half a Landsat pixel
        }
    }
}

/// Filters and validates extracted shoreline candidates for one epoch
pub struct ShorelineCleaner {
    params: CleaningParams,
}

impl ShorelineCleaner {
    pub fn new(params: CleaningParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(CleaningParams::default())
    }

    /// Clean a set of candidate shorelines.
    ///
    /// `reference` is the expected coastline (normally the tile baseline);
    /// when absent or empty, the plausibility check is skipped. Output is
    /// ordered by descending length and is a fixed point: cleaning it again
    /// with the same reference returns it unchanged.
    pub fn clean(
        &self,
        lines: &[LineString<f64>],
        reference: Option<&[LineString<f64>]>,
    ) -> Vec<LineString<f64>> {
        let reference = reference.filter(|r| !r.is_empty());

        let mut candidates: Vec<(f64, LineString<f64>)> = lines
            .iter()
            .filter_map(|line| self.normalise(line))
            .map(|line| (polyline_length(&line), line))
            .filter(|(length, _)| *length >= self.params.min_length)
            .filter(|(_, line)| {
                count_self_intersections(line) <= self.params.max_self_intersections
            })
            .filter(|(_, line)| match reference {
                Some(reference) => self.is_plausible(line, reference),
                None => true,
            })
            .collect();

        candidates.sort_by(compare_candidates);

        let mut kept: Vec<LineString<f64>> = Vec::with_capacity(candidates.len());
        for (_, line) in candidates {
            let runs = uncovered_runs(&line, &kept, self.params.duplicate_tolerance);
            kept.extend(
                runs.into_iter()
                    .filter(|run| polyline_length(run) >= self.params.min_length),
            );
        }

        // Trimmed remainders can be shorter than parts kept after them
        let mut kept: Vec<(f64, LineString<f64>)> = kept
            .into_iter()
            .map(|line| (polyline_length(&line), line))
            .collect();
        kept.sort_by(compare_candidates);

        log::debug!("Cleaning kept {} of {} shoreline parts", kept.len(), lines.len());
        kept.into_iter().map(|(_, line)| line).collect()
    }

    /// Drop non-finite input and collapse repeated vertices
    fn normalise(&self, line: &LineString<f64>) -> Option<LineString<f64>> {
        if line.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return None;
        }
        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(line.0.len());
        for &c in &line.0 {
            if coords.last() != Some(&c) {
                coords.push(c);
            }
        }
        (coords.len() >= 2).then(|| LineString::new(coords))
    }

    fn is_plausible(&self, line: &LineString<f64>, reference: &[LineString<f64>]) -> bool {
        let distances: Vec<f64> = line
            .0
            .iter()
            .map(|&c| distance_to_lines(c, reference))
            .collect();
        median(&distances).map_or(false, |d| d <= self.params.max_reference_distance)
    }
}

/// Longest first, then by first vertex, for a deterministic order
fn compare_candidates(a: &(f64, LineString<f64>), b: &(f64, LineString<f64>)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| a.1 .0[0].x.total_cmp(&b.1 .0[0].x))
        .then_with(|| a.1 .0[0].y.total_cmp(&b.1 .0[0].y))
        .then_with(|| a.1 .0.len().cmp(&b.1 .0.len()))
}

/// Maximal runs of `line` left after removing segments whose two ends both
/// lie within `tolerance` of a kept part
fn uncovered_runs(
    line: &LineString<f64>,
    kept: &[LineString<f64>],
    tolerance: f64,
) -> Vec<LineString<f64>> {
    let covered: Vec<bool> = line
        .0
        .iter()
        .map(|&c| kept.iter().any(|k| distance_to_polyline(c, k) <= tolerance))
        .collect();

    let mut runs = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();
    for i in 1..line.0.len() {
        if covered[i - 1] && covered[i] {
            if !current.is_empty() {
                runs.push(LineString::new(std::mem::take(&mut current)));
            }
        } else {
            if current.is_empty() {
                current.push(line.0[i - 1]);
            }
            current.push(line.0[i]);
        }
    }
    if !current.is_empty() {
        runs.push(LineString::new(current));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(points.to_vec())
    }

    fn horizontal(y: f64, x0: f64, x1: f64) -> LineString<f64> {
        let steps = ((x1 - x0) / 30.0).ceil() as usize;
        LineString::from(
            (0..=steps)
                .map(|i| (x0 + (x1 - x0) * i as f64 / steps as f64, y))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_short_and_invalid_parts_removed() {
        let cleaner = ShorelineCleaner::standard();
        let input = vec![
            horizontal(0.0, 0.0, 1000.0),
            horizontal(500.0, 0.0, 100.0),
            line(&[(0.0, 0.0), (f64::NAN, 1.0)]),
            line(&[(0.0, 900.0), (400.0, 1300.0), (400.0, 900.0), (0.0, 1300.0)]),
        ];
        let cleaned = cleaner.clean(&input, None);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0], input[0]);
    }

    #[test]
    fn test_near_duplicates_merged() {
        let cleaner = ShorelineCleaner::standard();
        let long = horizontal(0.0, 0.0, 1000.0);
        let overlap = horizontal(5.0, 300.0, 700.0);
        let cleaned = cleaner.clean(&[overlap, long.clone()], None);
        assert_eq!(cleaned, vec![long]);
    }

    #[test]
    fn test_partial_overlap_trimmed() {
        let cleaner = ShorelineCleaner::standard();
        let west = horizontal(0.0, 0.0, 600.0);
        let east = horizontal(3.0, 400.0, 1000.0);
        let cleaned = cleaner.clean(&[east, west.clone()], None);

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0], west);
        // 580 and 610 sit within tolerance of the western part
        let trimmed = &cleaned[1];
        assert_eq!(trimmed.0[0], Coord { x: 610.0, y: 3.0 });
        assert_eq!(trimmed.0[trimmed.0.len() - 1], Coord { x: 1000.0, y: 3.0 });
        assert!((polyline_length(trimmed) - 390.0).abs() < 1e-9);

        assert_eq!(cleaner.clean(&cleaned, None), cleaned);
    }

    #[test]
    fn test_implausible_parts_removed_with_reference() {
        let cleaner = ShorelineCleaner::standard();
        let baseline = vec![horizontal(0.0, 0.0, 3000.0)];
        let near = horizontal(120.0, 0.0, 2000.0);
        let far = horizontal(4000.0, 0.0, 2000.0);
        let cleaned = cleaner.clean(&[near.clone(), far], Some(baseline.as_slice()));
        assert_eq!(cleaned, vec![near]);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let cleaner = ShorelineCleaner::standard();
        let baseline = vec![horizontal(0.0, 0.0, 3000.0)];
        let input = vec![
            horizontal(10.0, 0.0, 400.0),
            horizontal(0.0, 0.0, 2500.0),
            horizontal(300.0, 100.0, 900.0),
            horizontal(50.0, 2000.0, 2700.0),
            line(&[(0.0, 0.0), (0.0, 0.0), (0.0, 250.0)]),
            horizontal(9000.0, 0.0, 1000.0),
        ];
        for reference in [None, Some(baseline.as_slice())] {
            let once = cleaner.clean(&input, reference);
            let twice = cleaner.clean(&once, reference);
            assert_eq!(once, twice);
            assert!(!once.is_empty());
        }
    }
}
