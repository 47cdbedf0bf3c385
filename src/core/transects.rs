use crate::core::baseline::Baseline;
use crate::core::geometry::{cumulative_lengths, interpolate_along, normalize, polyline_length};
use crate::types::{Shoreline, TileId};
use chrono::NaiveDate;
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line, LineString};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transect generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransectParams {
    /// Along-coast distance between transects (map units)
    pub spacing: f64,
    /// Full transect length, centred on the baseline
    pub length: f64,
    /// Baseline span used to estimate the local tangent
    pub tangent_window: f64,
}

impl Default for TransectParams {
    fn default() -> Self {
        Self {
            spacing: 30.0,
            length: 500.0,
            tangent_window: 60.0,
        }
    }
}

/// Stable transect identity: baseline part and position index along it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransectId {
    pub tile: TileId,
    pub part: usize,
    pub index: usize,
}

impl fmt::Display for TransectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_p{}_t{:05}", self.tile, self.part, self.index)
    }
}

/// Cross-shore sampling line perpendicular to the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transect {
    pub id: TransectId,
    /// Arc length along the baseline part
    pub position: f64,
    /// Intersection with the baseline
    pub origin: Coord<f64>,
    /// Unit vector pointing seaward
    pub direction: Coord<f64>,
    pub length: f64,
}

impl Transect {
    pub fn start(&self) -> Coord<f64> {
        self.point_at(-self.length / 2.0)
    }

    pub fn end(&self) -> Coord<f64> {
        self.point_at(self.length / 2.0)
    }

    /// Point at signed distance `d` from the origin
    pub fn point_at(&self, d: f64) -> Coord<f64> {
        Coord {
            x: self.origin.x + d * self.direction.x,
            y: self.origin.y + d * self.direction.y,
        }
    }

    pub fn line(&self) -> Line<f64> {
        Line::new(self.start(), self.end())
    }

    fn signed_distance(&self, p: Coord<f64>) -> f64 {
        (p.x - self.origin.x) * self.direction.x + (p.y - self.origin.y) * self.direction.y
    }
}

/// Why a (transect, epoch) pair has no distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsenceReason {
    /// The epoch produced no shoreline at all
    NoShoreline,
    /// The shoreline does not cross the transect within its length
    NoIntersection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceObservation {
    /// Signed distance from the baseline (positive seaward) and the
    /// shoreline orientation at the crossing in degrees, modulo 180
    Observed { distance: f64, angle: f64 },
    Absent(AbsenceReason),
}

impl DistanceObservation {
    pub fn distance(&self) -> Option<f64> {
        match self {
            DistanceObservation::Observed { distance, .. } => Some(*distance),
            DistanceObservation::Absent(_) => None,
        }
    }

    pub fn is_observed(&self) -> bool {
        matches!(self, DistanceObservation::Observed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochObservation {
    pub date: NaiveDate,
    pub observation: DistanceObservation,
}

/// A transect and its per-epoch observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransectSeries {
    pub transect: Transect,
    pub observations: Vec<EpochObservation>,
}

impl TransectSeries {
    pub fn valid_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|o| o.observation.is_observed())
            .count()
    }
}

/// Casts transects from a baseline and measures shorelines along them
pub struct TransectSampler {
    params: TransectParams,
}

impl TransectSampler {
    pub fn new(params: TransectParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(TransectParams::default())
    }

    /// Evenly spaced transects along every baseline part.
    ///
    /// A part of length `L` receives `floor(L / spacing)` transects centred
    /// in their spacing intervals, so identities depend only on the baseline.
    pub fn generate(&self, baseline: &Baseline) -> Vec<Transect> {
        let spacing = self.params.spacing;
        let mut transects = Vec::new();

        for (part, line) in baseline.parts.iter().enumerate() {
            let coords = &line.0;
            let cumulative = cumulative_lengths(coords);
            let total = polyline_length(line);
            let count = (total / spacing).floor() as usize;
            let half_window = self.params.tangent_window / 2.0;

            for index in 0..count {
                let position = (index as f64 + 0.5) * spacing;
                let behind = interpolate_along(coords, &cumulative, position - half_window);
                let ahead = interpolate_along(coords, &cumulative, position + half_window);
                let Some(tangent) = normalize(Coord {
                    x: ahead.x - behind.x,
                    y: ahead.y - behind.y,
                }) else {
                    log::debug!(
                        "{} part {}: no tangent at {:.1}, transect skipped",
                        baseline.tile,
                        part,
                        position
                    );
                    continue;
                };

                transects.push(Transect {
                    id: TransectId {
                        tile: baseline.tile,
                        part,
                        index,
                    },
                    position,
                    origin: interpolate_along(coords, &cumulative, position),
                    direction: Coord {
                        x: -tangent.y,
                        y: tangent.x,
                    },
                    length: self.params.length,
                });
            }
        }

        log::debug!(
            "{}: {} transects at {} m spacing",
            baseline.tile,
            transects.len(),
            spacing
        );
        transects
    }

    /// Distance to the crossing nearest the baseline, if any
    pub fn measure(&self, transect: &Transect, parts: &[LineString<f64>]) -> DistanceObservation {
        let search = transect.line();
        let mut best: Option<(f64, f64)> = None;

        for segment in parts.iter().flat_map(|p| p.lines()) {
            let crossing = match line_intersection(search, segment) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    transect.signed_distance(intersection)
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    let a = transect.signed_distance(intersection.start);
                    let b = transect.signed_distance(intersection.end);
                    if a.abs() <= b.abs() {
                        a
                    } else {
                        b
                    }
                }
                None => continue,
            };
            let angle = segment.dy().atan2(segment.dx()).to_degrees().rem_euclid(180.0);

            let closer = best.map_or(true, |(d, _)| {
                crossing.abs() < d.abs() || (crossing.abs() == d.abs() && crossing < d)
            });
            if closer {
                best = Some((crossing, angle));
            }
        }

        match best {
            Some((distance, angle)) => DistanceObservation::Observed { distance, angle },
            None => DistanceObservation::Absent(AbsenceReason::NoIntersection),
        }
    }

    /// Observe every transect against every epoch's shoreline.
    ///
    /// Observations follow the order of `shorelines`.
    pub fn sample(&self, transects: &[Transect], shorelines: &[Shoreline]) -> Vec<TransectSeries> {
        transects
            .iter()
            .map(|transect| TransectSeries {
                transect: transect.clone(),
                observations: shorelines
                    .iter()
                    .map(|shoreline| EpochObservation {
                        date: shoreline.date,
                        observation: if shoreline.is_empty() {
                            DistanceObservation::Absent(AbsenceReason::NoShoreline)
                        } else {
                            self.measure(transect, &shoreline.parts)
                        },
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn date(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    /// Baseline running south along x = 100, so the seaward normal is +x
    fn baseline(length: f64) -> Baseline {
        Baseline {
            tile: TileId(7),
            year: 2021,
            date: date(2021),
            parts: vec![LineString::from(vec![(100.0, length), (100.0, 0.0)])],
        }
    }

    #[test]
    fn test_transect_count_and_geometry() {
        let sampler = TransectSampler::standard();
        let transects = sampler.generate(&baseline(1000.0));
        assert_eq!(transects.len(), 33);

        let first = &transects[0];
        assert_eq!(first.id.index, 0);
        assert_abs_diff_eq!(first.position, 15.0);
        assert_abs_diff_eq!(first.origin.y, 985.0);
        assert_abs_diff_eq!(first.direction.x, 1.0);
        assert_abs_diff_eq!(first.start().x, -150.0);
        assert_abs_diff_eq!(first.end().x, 350.0);
    }

    #[test]
    fn test_identifiers_are_reproducible() {
        let sampler = TransectSampler::standard();
        let a = sampler.generate(&baseline(700.0));
        let b = sampler.generate(&baseline(700.0));
        assert_eq!(a, b);
        assert_eq!(a[3].id.to_string(), "tile0007_p0_t00003");
    }

    #[test]
    fn test_signed_distances() {
        let sampler = TransectSampler::standard();
        let transect = &sampler.generate(&baseline(300.0))[2];

        let seaward = vec![LineString::from(vec![(160.0, 0.0), (160.0, 300.0)])];
        match sampler.measure(transect, &seaward) {
            DistanceObservation::Observed { distance, angle } => {
                assert_abs_diff_eq!(distance, 60.0, epsilon = 1e-9);
                assert_abs_diff_eq!(angle, 90.0, epsilon = 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }

        let landward = vec![LineString::from(vec![(40.0, 0.0), (40.0, 300.0)])];
        assert_abs_diff_eq!(
            sampler.measure(transect, &landward).distance().unwrap(),
            -60.0,
            epsilon = 1e-9
        );

        let out_of_reach = vec![LineString::from(vec![(900.0, 0.0), (900.0, 300.0)])];
        assert_eq!(
            sampler.measure(transect, &out_of_reach),
            DistanceObservation::Absent(AbsenceReason::NoIntersection)
        );
    }

    #[test]
    fn test_nearest_crossing_wins() {
        let sampler = TransectSampler::standard();
        let transect = &sampler.generate(&baseline(300.0))[0];
        let parts = vec![
            LineString::from(vec![(200.0, 0.0), (200.0, 300.0)]),
            LineString::from(vec![(70.0, 0.0), (70.0, 300.0)]),
        ];
        assert_abs_diff_eq!(
            sampler.measure(transect, &parts).distance().unwrap(),
            -30.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_sample_marks_missing_shorelines_absent() {
        let sampler = TransectSampler::standard();
        let transects = sampler.generate(&baseline(90.0));
        let shorelines = vec![
            Shoreline {
                tile: TileId(7),
                date: date(2020),
                parts: vec![LineString::from(vec![(120.0, 0.0), (120.0, 90.0)])],
            },
            Shoreline {
                tile: TileId(7),
                date: date(2021),
                parts: vec![],
            },
        ];
        let series = sampler.sample(&transects, &shorelines);
        assert_eq!(series.len(), 3);
        for s in &series {
            assert_eq!(s.valid_count(), 1);
            assert_eq!(s.observations[0].date, date(2020));
            assert_eq!(
                s.observations[1].observation,
                DistanceObservation::Absent(AbsenceReason::NoShoreline)
            );
        }
    }
}
