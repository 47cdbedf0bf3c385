use crate::core::baseline::Baseline;
use crate::core::geometry::{distance_to_polyline, expand_rect, rect_contains};
use crate::core::hotspots::{Hotspot, HotspotAggregator, HotspotParams};
use crate::core::rates::RateOfChangeResult;
use crate::core::transects::{Transect, TransectId, TransectSeries};
use crate::types::{CoastError, CoastResult, Shoreline, TileId};
use chrono::NaiveDate;
use geo::{Coord, LineString, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Continental merge parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    /// Distance either side of a tile edge within which features are
    /// compared against the neighbouring tile
    pub boundary_buffer: f64,
    pub include_shorelines: bool,
    /// Transects travel with their rates
    pub include_rates: bool,
    pub include_hotspots: bool,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            boundary_buffer: 100.0,
            include_shorelines: true,
            include_rates: true,
            include_hotspots: true,
        }
    }
}

/// Everything one tile's pipeline produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileOutput {
    pub tile: TileId,
    /// Area the tile is authoritative for
    pub bounds: Rect<f64>,
    pub baseline: Baseline,
    /// One record per epoch, in date order
    pub shorelines: Vec<Shoreline>,
    pub transects: Vec<TransectSeries>,
    pub rates: Vec<RateOfChangeResult>,
    pub hotspots: Vec<Hotspot>,
}

/// A tile excluded from the merge and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTile {
    pub tile: TileId,
    pub reason: String,
}

/// A run of shoreline kept after boundary deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShorelineSegment {
    pub tile: TileId,
    pub date: NaiveDate,
    pub geometry: LineString<f64>,
}

/// Seamless union of all successful tiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinentalDataset {
    pub shorelines: Vec<ShorelineSegment>,
    pub transects: Vec<TransectSeries>,
    pub rates: Vec<RateOfChangeResult>,
    pub hotspots: Vec<Hotspot>,
    /// Tiles that contributed, ascending
    pub tiles: Vec<TileId>,
    pub skipped: Vec<SkippedTile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub tiles: usize,
    pub skipped_tiles: usize,
    pub shoreline_segments: usize,
    pub transects: usize,
    pub fitted_rates: usize,
    pub significant_rates: usize,
    pub hotspots: usize,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles ({} skipped): {} shoreline segments, {} transects, {} fitted rates ({} significant), {} hotspots",
            self.tiles,
            self.skipped_tiles,
            self.shoreline_segments,
            self.transects,
            self.fitted_rates,
            self.significant_rates,
            self.hotspots
        )
    }
}

impl ContinentalDataset {
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            tiles: self.tiles.len(),
            skipped_tiles: self.skipped.len(),
            shoreline_segments: self.shorelines.len(),
            transects: self.transects.len(),
            fitted_rates: self.rates.iter().filter(|r| r.rate().is_some()).count(),
            significant_rates: self.rates.iter().filter(|r| r.is_significant()).count(),
            hotspots: self.hotspots.len(),
        }
    }
}

/// Features already retained for one lower-numbered tile
struct Retained {
    area: Rect<f64>,
    shorelines: Vec<ShorelineSegment>,
    origins: Vec<Coord<f64>>,
}

/// Stitches tile outputs into the continental dataset
pub struct TileMerger {
    params: MergeParams,
    aggregator: HotspotAggregator,
}

impl TileMerger {
    /// `hotspots` regroups the transects each tile keeps after deduplication
    pub fn new(params: MergeParams, hotspots: HotspotParams) -> Self {
        Self {
            params,
            aggregator: HotspotAggregator::new(hotspots),
        }
    }

    pub fn standard() -> Self {
        Self::new(MergeParams::default(), HotspotParams::default())
    }

    /// Merge tile outputs, lowest tile id winning at shared boundaries.
    ///
    /// Tiles are visited in ascending id order, so the result does not
    /// depend on the order of `tiles` or `skipped`.
    pub fn merge(
        &self,
        tiles: &[TileOutput],
        mut skipped: Vec<SkippedTile>,
    ) -> CoastResult<ContinentalDataset> {
        let mut ordered: Vec<&TileOutput> = tiles.iter().collect();
        ordered.sort_by_key(|t| t.tile);
        if let Some(pair) = ordered.windows(2).find(|w| w[0].tile == w[1].tile) {
            return Err(CoastError::InvalidInput(format!(
                "{} supplied more than once to the merge",
                pair[0].tile
            )));
        }
        skipped.sort_by(|a, b| a.tile.cmp(&b.tile).then_with(|| a.reason.cmp(&b.reason)));

        let buffer = self.params.boundary_buffer;
        let mut dataset = ContinentalDataset {
            tiles: ordered.iter().map(|t| t.tile).collect(),
            skipped,
            ..ContinentalDataset::default()
        };
        let mut lower: Vec<Retained> = Vec::with_capacity(ordered.len());

        for tile in ordered {
            let area = expand_rect(&tile.bounds, buffer);
            let mut retained = Retained {
                area,
                shorelines: Vec::new(),
                origins: Vec::new(),
            };

            for shoreline in &tile.shorelines {
                for part in &shoreline.parts {
                    let runs = split_runs(part, |mid| {
                        rect_contains(&area, mid)
                            && !lower.iter().any(|u| {
                                rect_contains(&u.area, mid)
                                    && u.shorelines.iter().any(|s| {
                                        s.date == shoreline.date
                                            && distance_to_polyline(mid, &s.geometry) <= buffer
                                    })
                            })
                    });
                    retained
                        .shorelines
                        .extend(runs.into_iter().map(|geometry| ShorelineSegment {
                            tile: tile.tile,
                            date: shoreline.date,
                            geometry,
                        }));
                }
            }

            let kept_series: Vec<&TransectSeries> = tile
                .transects
                .iter()
                .filter(|s| is_owned(s.transect.origin, &area, &lower, buffer))
                .collect();
            let kept_ids: HashSet<TransectId> =
                kept_series.iter().map(|s| s.transect.id).collect();
            let kept_rates: Vec<RateOfChangeResult> = tile
                .rates
                .iter()
                .filter(|r| kept_ids.contains(&r.transect))
                .cloned()
                .collect();
            retained
                .origins
                .extend(kept_series.iter().map(|s| s.transect.origin));

            // Per-tile hotspots may summarise transects a lower tile owns,
            // so segments are rebuilt from the kept transects only
            let kept_transects: Vec<Transect> =
                kept_series.iter().map(|s| s.transect.clone()).collect();
            let hotspots = self.aggregator.aggregate(&kept_transects, &kept_rates);

            log::debug!(
                "{}: kept {} shoreline segments, {} of {} transects, {} hotspots",
                tile.tile,
                retained.shorelines.len(),
                kept_series.len(),
                tile.transects.len(),
                hotspots.len()
            );

            if self.params.include_rates {
                dataset
                    .transects
                    .extend(kept_series.into_iter().cloned());
                dataset.rates.extend(kept_rates);
            }
            if self.params.include_hotspots {
                dataset.hotspots.extend(hotspots);
            }
            if self.params.include_shorelines {
                dataset.shorelines.extend(retained.shorelines.iter().cloned());
            }
            lower.push(retained);
        }

        log::info!("Continental merge: {}", dataset.summary());
        Ok(dataset)
    }
}

/// A point belongs to a tile when it lies in the tile's buffered area and
/// no lower tile already holds a transect within `buffer` of it
fn is_owned(p: Coord<f64>, area: &Rect<f64>, lower: &[Retained], buffer: f64) -> bool {
    rect_contains(area, p)
        && !lower.iter().any(|u| {
            rect_contains(&u.area, p)
                && u.origins
                    .iter()
                    .any(|q| (p.x - q.x).hypot(p.y - q.y) <= buffer)
        })
}

/// Split a polyline into maximal runs of segments whose midpoint passes `keep`
fn split_runs<F>(line: &LineString<f64>, keep: F) -> Vec<LineString<f64>>
where
    F: Fn(Coord<f64>) -> bool,
{
    let mut runs = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    for segment in line.lines() {
        let mid = Coord {
            x: (segment.start.x + segment.end.x) / 2.0,
            y: (segment.start.y + segment.end.y) / 2.0,
        };
        if keep(mid) {
            if current.is_empty() {
                current.push(segment.start);
            }
            current.push(segment.end);
        } else if !current.is_empty() {
            runs.push(LineString::new(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        runs.push(LineString::new(current));
    }
    runs
}
