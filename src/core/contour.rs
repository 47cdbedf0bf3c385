//! Iso-contour extraction via marching squares
//!
//! Contours are traced through the lattice of pixel centres. Each crossing is
//! placed by linear interpolation along the edge joining two centres, so the
//! resulting polylines are sub-pixel accurate rather than following cell
//! boundaries. Squares touching a masked or non-finite pixel produce no
//! segments, which breaks contours across invalid regions.

use crate::types::{CoastError, CoastResult};
use ndarray::Array2;
use num_traits::Float;
use std::collections::HashMap;

/// Fractional `(row, col)` grid position; integers address pixel centres
pub type GridPoint = (f64, f64);

/// Lattice edge carrying a crossing.
///
/// `Horizontal(r, c)` joins centres `(r, c)` and `(r, c + 1)`,
/// `Vertical(r, c)` joins `(r, c)` and `(r + 1, c)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    Horizontal(usize, usize),
    Vertical(usize, usize),
}

/// Trace all `level` iso-contours of `values`, ignoring pixels where `valid`
/// is false.
///
/// Returns open polylines first (in raster scan order of their first
/// segment), then closed rings whose first and last vertices coincide.
pub fn marching_squares<T: Float>(
    values: &Array2<T>,
    valid: &Array2<bool>,
    level: T,
) -> CoastResult<Vec<Vec<GridPoint>>> {
    if values.dim() != valid.dim() {
        return Err(CoastError::InvalidInput(format!(
            "Raster shape {:?} does not match mask shape {:?}",
            values.dim(),
            valid.dim()
        )));
    }

    let (rows, cols) = values.dim();
    if rows < 2 || cols < 2 {
        return Ok(Vec::new());
    }

    let usable = |r: usize, c: usize| valid[[r, c]] && values[[r, c]].is_finite();

    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();
    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            if !(usable(r, c) && usable(r, c + 1) && usable(r + 1, c + 1) && usable(r + 1, c)) {
                continue;
            }

            let tl = values[[r, c]];
            let tr = values[[r, c + 1]];
            let br = values[[r + 1, c + 1]];
            let bl = values[[r + 1, c]];

            let case = (usize::from(tl > level) << 3)
                | (usize::from(tr > level) << 2)
                | (usize::from(br > level) << 1)
                | usize::from(bl > level);

            let top = EdgeKey::Horizontal(r, c);
            let bottom = EdgeKey::Horizontal(r + 1, c);
            let left = EdgeKey::Vertical(r, c);
            let right = EdgeKey::Vertical(r, c + 1);

            let centre_above = || {
                let four = T::one() + T::one() + T::one() + T::one();
                (tl + tr + br + bl) / four > level
            };

            match case {
                0 | 15 => {}
                1 | 14 => segments.push((left, bottom)),
                2 | 13 => segments.push((bottom, right)),
                3 | 12 => segments.push((left, right)),
                4 | 11 => segments.push((top, right)),
                6 | 9 => segments.push((top, bottom)),
                7 | 8 => segments.push((left, top)),
                // Saddles: the centre value decides which diagonal connects.
                5 => {
                    if centre_above() {
                        segments.push((left, top));
                        segments.push((bottom, right));
                    } else {
                        segments.push((top, right));
                        segments.push((left, bottom));
                    }
                }
                10 => {
                    if centre_above() {
                        segments.push((top, right));
                        segments.push((left, bottom));
                    } else {
                        segments.push((left, top));
                        segments.push((bottom, right));
                    }
                }
                _ => unreachable!("marching squares case index is four bits"),
            }
        }
    }

    let chains = stitch_segments(&segments);
    let lines = chains
        .into_iter()
        .map(|keys| {
            keys.into_iter()
                .map(|key| edge_point(values, level, key))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(lines)
}

/// Interpolated crossing position on a lattice edge
fn edge_point<T: Float>(values: &Array2<T>, level: T, key: EdgeKey) -> GridPoint {
    match key {
        EdgeKey::Horizontal(r, c) => {
            let t = crossing_fraction(values[[r, c]], values[[r, c + 1]], level);
            (r as f64, c as f64 + t)
        }
        EdgeKey::Vertical(r, c) => {
            let t = crossing_fraction(values[[r, c]], values[[r + 1, c]], level);
            (r as f64 + t, c as f64)
        }
    }
}

fn crossing_fraction<T: Float>(a: T, b: T, level: T) -> f64 {
    let span = b - a;
    if span == T::zero() {
        return 0.5;
    }
    ((level - a) / span)
        .to_f64()
        .map(|t| t.clamp(0.0, 1.0))
        .unwrap_or(0.5)
}

/// Join segments sharing an edge into chains of edge keys
fn stitch_segments(segments: &[(EdgeKey, EdgeKey)]) -> Vec<Vec<EdgeKey>> {
    let mut adjacency: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        adjacency.entry(a).or_default().push(i);
        adjacency.entry(b).or_default().push(i);
    }

    let degree = |key: &EdgeKey| adjacency.get(key).map_or(0, Vec::len);
    let mut visited = vec![false; segments.len()];
    let mut chains = Vec::new();

    // Open chains start at an edge used by a single segment.
    for i in 0..segments.len() {
        if visited[i] {
            continue;
        }
        let (a, b) = segments[i];
        let start = if degree(&a) == 1 {
            Some(a)
        } else if degree(&b) == 1 {
            Some(b)
        } else {
            None
        };
        if let Some(start) = start {
            chains.push(walk_chain(i, start, segments, &adjacency, &mut visited));
        }
    }

    // Everything left forms closed rings.
    for i in 0..segments.len() {
        if !visited[i] {
            chains.push(walk_chain(i, segments[i].0, segments, &adjacency, &mut visited));
        }
    }

    chains
}

fn walk_chain(
    first: usize,
    start: EdgeKey,
    segments: &[(EdgeKey, EdgeKey)],
    adjacency: &HashMap<EdgeKey, Vec<usize>>,
    visited: &mut [bool],
) -> Vec<EdgeKey> {
    let mut keys = vec![start];
    let mut current = start;
    let mut segment = first;

    loop {
        visited[segment] = true;
        let (a, b) = segments[segment];
        current = if a == current { b } else { a };
        keys.push(current);

        let next = adjacency
            .get(&current)
            .and_then(|ids| ids.iter().copied().find(|&s| !visited[s]));
        match next {
            Some(s) => segment = s,
            None => break,
        }
    }

    keys
}
