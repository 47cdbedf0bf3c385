//! Planar polyline helpers shared by the vector stages

use geo::algorithm::line_intersection::line_intersection;
use geo::{Coord, Line, LineString, Rect};

/// Euclidean length of a polyline
pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// Running arc length at each vertex, starting at zero
pub fn cumulative_lengths(coords: &[Coord<f64>]) -> Vec<f64> {
    let mut lengths = Vec::with_capacity(coords.len());
    let mut total = 0.0;
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            let prev = coords[i - 1];
            total += (c.x - prev.x).hypot(c.y - prev.y);
        }
        lengths.push(total);
    }
    lengths
}

/// Point at arc distance `s` along a polyline, clamped to its ends
pub fn interpolate_along(coords: &[Coord<f64>], cumulative: &[f64], s: f64) -> Coord<f64> {
    match coords.len() {
        0 => return Coord { x: f64::NAN, y: f64::NAN },
        1 => return coords[0],
        _ => {}
    }
    let total = cumulative[cumulative.len() - 1];
    let s = s.clamp(0.0, total);
    let upper = cumulative
        .partition_point(|&d| d < s)
        .clamp(1, coords.len() - 1);
    let (d0, d1) = (cumulative[upper - 1], cumulative[upper]);
    let (a, b) = (coords[upper - 1], coords[upper]);
    if d1 - d0 <= f64::EPSILON {
        return b;
    }
    let t = (s - d0) / (d1 - d0);
    Coord {
        x: a.x + t * (b.x - a.x),
        y: a.y + t * (b.y - a.y),
    }
}

/// Resample a polyline to evenly spaced vertices no further apart than
/// `spacing`, keeping both end points.
pub fn resample(line: &LineString<f64>, spacing: f64) -> LineString<f64> {
    let coords = &line.0;
    if coords.len() < 2 || spacing <= 0.0 {
        return line.clone();
    }
    let cumulative = cumulative_lengths(coords);
    let total = cumulative[cumulative.len() - 1];
    if total <= 0.0 {
        return LineString::new(vec![coords[0]]);
    }
    let steps = (total / spacing).ceil().max(1.0) as usize;
    let step = total / steps as f64;
    let resampled = (0..=steps)
        .map(|k| interpolate_along(coords, &cumulative, k as f64 * step))
        .collect();
    LineString::new(resampled)
}

pub fn is_closed(coords: &[Coord<f64>]) -> bool {
    coords.len() > 2 && coords.first() == coords.last()
}

/// Distance from a point to a segment
pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    (p.x - (a.x + t * dx)).hypot(p.y - (a.y + t * dy))
}

/// Distance from a point to the nearest part of a polyline
pub fn distance_to_polyline(p: Coord<f64>, line: &LineString<f64>) -> f64 {
    match line.0.len() {
        0 => f64::INFINITY,
        1 => (p.x - line.0[0].x).hypot(p.y - line.0[0].y),
        _ => line
            .lines()
            .map(|l| point_segment_distance(p, l.start, l.end))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Distance from a point to the nearest of several polylines
pub fn distance_to_lines(p: Coord<f64>, lines: &[LineString<f64>]) -> f64 {
    lines
        .iter()
        .map(|l| distance_to_polyline(p, l))
        .fold(f64::INFINITY, f64::min)
}

/// Number of crossings between non-adjacent segments of a polyline
pub fn count_self_intersections(line: &LineString<f64>) -> usize {
    let segments: Vec<Line<f64>> = line.lines().collect();
    let n = segments.len();
    let closed = is_closed(&line.0);
    let mut count = 0;
    for i in 0..n {
        for j in (i + 2)..n {
            if closed && i == 0 && j == n - 1 {
                continue;
            }
            if line_intersection(segments[i], segments[j]).is_some() {
                count += 1;
            }
        }
    }
    count
}

/// Rectangle grown by `distance` on every side
pub fn expand_rect(rect: &Rect<f64>, distance: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: rect.min().x - distance,
            y: rect.min().y - distance,
        },
        Coord {
            x: rect.max().x + distance,
            y: rect.max().y + distance,
        },
    )
}

/// Inclusive point-in-rectangle test
pub fn rect_contains(rect: &Rect<f64>, p: Coord<f64>) -> bool {
    p.x >= rect.min().x && p.x <= rect.max().x && p.y >= rect.min().y && p.y <= rect.max().y
}

/// Unit vector, or `None` for a zero-length input
pub fn normalize(v: Coord<f64>) -> Option<Coord<f64>> {
    let len = v.x.hypot(v.y);
    (len > f64::EPSILON).then(|| Coord {
        x: v.x / len,
        y: v.y / len,
    })
}
