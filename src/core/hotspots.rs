use crate::core::rates::RateOfChangeResult;
use crate::core::stats::{mean, median};
use crate::core::transects::{Transect, TransectId};
use crate::types::TileId;
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Hotspot aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotParams {
    /// Along-coast length of each aggregation segment (map units)
    pub segment_length: f64,
    /// Fewer fitted transects than this leaves a segment unsummarised
    pub min_transects: usize,
}

impl Default for HotspotParams {
    fn default() -> Self {
        Self {
            segment_length: 1000.0,
            min_transects: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HotspotId {
    pub tile: TileId,
    pub part: usize,
    pub segment: usize,
}

impl fmt::Display for HotspotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_p{}_h{:04}", self.tile, self.part, self.segment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HotspotSummary {
    Summarised {
        median_rate: f64,
        mean_rate: f64,
        /// Share of fitted transects with a significant trend
        significant_fraction: f64,
        median_significant_rate: Option<f64>,
        /// Most fitted transects in the segment are significant
        significant: bool,
    },
    InsufficientData { valid: usize, required: usize },
}

/// Rate-of-change summary over one along-coast segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: HotspotId,
    /// Along-coast extent of the segment on its baseline part
    pub start: f64,
    pub end: f64,
    /// Mean origin of the member transects
    pub centroid: Coord<f64>,
    pub transect_count: usize,
    pub valid_count: usize,
    pub summary: HotspotSummary,
}

impl Hotspot {
    pub fn median_rate(&self) -> Option<f64> {
        match self.summary {
            HotspotSummary::Summarised { median_rate, .. } => Some(median_rate),
            HotspotSummary::InsufficientData { .. } => None,
        }
    }
}

/// Groups transects into fixed along-coast segments
pub struct HotspotAggregator {
    params: HotspotParams,
}

impl HotspotAggregator {
    pub fn new(params: HotspotParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(HotspotParams::default())
    }

    /// Segment a transect belongs to; depends on position alone
    pub fn segment_of(&self, transect: &Transect) -> usize {
        (transect.position / self.params.segment_length).floor().max(0.0) as usize
    }

    /// Summarise rates per segment, ordered by part then segment.
    ///
    /// Transects without a matching rate count as members but not as
    /// fitted transects.
    pub fn aggregate(&self, transects: &[Transect], rates: &[RateOfChangeResult]) -> Vec<Hotspot> {
        let by_id: HashMap<TransectId, &RateOfChangeResult> =
            rates.iter().map(|r| (r.transect, r)).collect();

        let mut groups: BTreeMap<(TileId, usize, usize), Vec<&Transect>> = BTreeMap::new();
        for transect in transects {
            groups
                .entry((transect.id.tile, transect.id.part, self.segment_of(transect)))
                .or_default()
                .push(transect);
        }

        let hotspots: Vec<Hotspot> = groups
            .into_iter()
            .map(|((tile, part, segment), members)| {
                let n = members.len() as f64;
                let centroid = Coord {
                    x: members.iter().map(|t| t.origin.x).sum::<f64>() / n,
                    y: members.iter().map(|t| t.origin.y).sum::<f64>() / n,
                };
                let fitted: Vec<&RateOfChangeResult> = members
                    .iter()
                    .filter_map(|t| by_id.get(&t.id).copied())
                    .filter(|r| r.rate().is_some())
                    .collect();

                let start = segment as f64 * self.params.segment_length;
                Hotspot {
                    id: HotspotId {
                        tile,
                        part,
                        segment,
                    },
                    start,
                    end: start + self.params.segment_length,
                    centroid,
                    transect_count: members.len(),
                    valid_count: fitted.len(),
                    summary: self.summarise(&fitted),
                }
            })
            .collect();

        log::debug!(
            "Aggregated {} transects into {} hotspot segments",
            transects.len(),
            hotspots.len()
        );
        hotspots
    }

    fn summarise(&self, fitted: &[&RateOfChangeResult]) -> HotspotSummary {
        let required = self.params.min_transects;
        let rates: Vec<f64> = fitted.iter().filter_map(|r| r.rate()).collect();
        let (Some(median_rate), Some(mean_rate)) = (median(&rates), mean(&rates)) else {
            return HotspotSummary::InsufficientData { valid: 0, required };
        };
        if rates.len() < required {
            return HotspotSummary::InsufficientData {
                valid: rates.len(),
                required,
            };
        }

        let significant_rates: Vec<f64> = fitted
            .iter()
            .filter(|r| r.is_significant())
            .filter_map(|r| r.rate())
            .collect();
        let significant_fraction = significant_rates.len() as f64 / rates.len() as f64;

        HotspotSummary::Summarised {
            median_rate,
            mean_rate,
            significant_fraction,
            median_significant_rate: median(&significant_rates),
            significant: significant_fraction > 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rates::{Certainty, RateEstimate, TrendFit};
    use chrono::NaiveDate;

    fn transect(index: usize, position: f64) -> Transect {
        Transect {
            id: TransectId {
                tile: TileId(2),
                part: 0,
                index,
            },
            position,
            origin: Coord {
                x: position,
                y: 50.0,
            },
            direction: Coord { x: 0.0, y: 1.0 },
            length: 500.0,
        }
    }

    fn rate(t: &Transect, slope: Option<f64>, significant: bool) -> RateOfChangeResult {
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        RateOfChangeResult {
            transect: t.id,
            valid_observations: 10,
            total_epochs: 10,
            estimate: match slope {
                Some(slope) => RateEstimate::Fitted(TrendFit {
                    slope,
                    intercept: 0.0,
                    std_error: 0.1,
                    p_value: if significant { 0.001 } else { 0.5 },
                    significant,
                    observations_used: 10,
                    outliers: vec![],
                    envelope: 10.0,
                    net_movement: 5.0,
                    max_date: date,
                    min_date: date,
                    angle_mean: 0.0,
                    angle_std: 1.0,
                    certainty: Certainty::Good,
                }),
                None => RateEstimate::InsufficientData {
                    valid: 1,
                    required: 5,
                },
            },
        }
    }

    fn transects() -> Vec<Transect> {
        (0..50).map(|i| transect(i, 15.0 + 30.0 * i as f64)).collect()
    }

    #[test]
    fn test_grouping_by_position() {
        let ts = transects();
        let rates: Vec<_> = ts.iter().map(|t| rate(t, Some(1.0), true)).collect();
        let hotspots = HotspotAggregator::standard().aggregate(&ts, &rates);

        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].transect_count, 33);
        assert_eq!(hotspots[1].transect_count, 17);
        assert_eq!(hotspots[1].id.to_string(), "tile0002_p0_h0001");
        assert_eq!(hotspots[0].start, 0.0);
        assert_eq!(hotspots[0].end, 1000.0);
        assert!((hotspots[0].centroid.x - 495.0).abs() < 1e-9);
    }

    #[test]
    fn test_groups_independent_of_data_coverage() {
        let ts = transects();
        let full: Vec<_> = ts.iter().map(|t| rate(t, Some(2.0), false)).collect();
        let sparse: Vec<_> = ts
            .iter()
            .map(|t| rate(t, (t.id.index % 3 == 0).then_some(2.0), false))
            .collect();
        let aggregator = HotspotAggregator::standard();
        let layout = |rates: &[RateOfChangeResult]| -> Vec<(HotspotId, f64, f64, usize)> {
            aggregator
                .aggregate(&ts, rates)
                .into_iter()
                .map(|h| (h.id, h.start, h.end, h.transect_count))
                .collect()
        };
        assert_eq!(layout(&full), layout(&sparse));
    }

    #[test]
    fn test_summary_statistics() {
        let ts: Vec<Transect> = transects().into_iter().take(10).collect();
        let rates: Vec<_> = ts
            .iter()
            .enumerate()
            .map(|(i, t)| match i {
                0..=5 => rate(t, Some(i as f64), i % 2 == 0),
                _ => rate(t, None, false),
            })
            .collect();
        let hotspots = HotspotAggregator::standard().aggregate(&ts, &rates);
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].valid_count, 6);
        match &hotspots[0].summary {
            HotspotSummary::Summarised {
                median_rate,
                mean_rate,
                significant_fraction,
                median_significant_rate,
                significant,
            } => {
                assert_eq!(*median_rate, 2.5);
                assert_eq!(*mean_rate, 2.5);
                assert_eq!(*significant_fraction, 0.5);
                assert_eq!(*median_significant_rate, Some(2.0));
                assert!(!significant);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_too_few_fitted_transects() {
        let ts: Vec<Transect> = transects().into_iter().take(8).collect();
        let rates: Vec<_> = ts
            .iter()
            .map(|t| rate(t, (t.id.index < 4).then_some(1.0), true))
            .collect();
        let hotspots = HotspotAggregator::standard().aggregate(&ts, &rates);
        assert_eq!(
            hotspots[0].summary,
            HotspotSummary::InsufficientData {
                valid: 4,
                required: 5
            }
        );
        assert_eq!(hotspots[0].median_rate(), None);
    }
}
