//! Polyline stroking
//!
//! Converts a polyline with a width into triangles, with round joins and a
//! configurable cap. Input is expected in an isotropic plane (metres).

use super::polygon::orient_ccw;
use crate::geo::Point;
use std::f64::consts::PI;

/// Number of segments used for round caps
const ROUND_CAP_SEGMENTS: u32 = 16;

/// End style of an open stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    Round,
    Square,
    #[default]
    Butt,
}

impl LineCap {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "round" => Some(LineCap::Round),
            "square" => Some(LineCap::Square),
            "butt" | "none" => Some(LineCap::Butt),
            _ => None,
        }
    }
}

fn add_round_cap(
    verts: &mut Vec<Point>,
    indices: &mut Vec<u32>,
    center: Point,
    direction: (f64, f64),
    half_width: f64,
    is_start: bool,
) {
    let fan_base = verts.len() as u32;
    verts.push(center);

    let base_angle = direction.1.atan2(direction.0);
    let angle_offset = if is_start { PI / 2.0 } else { -PI / 2.0 };

    for i in 0..=ROUND_CAP_SEGMENTS {
        let t = i as f64 / ROUND_CAP_SEGMENTS as f64;
        let ang = base_angle + angle_offset + t * PI;
        verts.push(Point::new(center.x + ang.cos() * half_width, center.y + ang.sin() * half_width));
    }

    for i in 0..ROUND_CAP_SEGMENTS {
        indices.push(fan_base);
        indices.push(fan_base + 1 + i);
        indices.push(fan_base + 2 + i);
    }
}

/// Stroke a single polyline into vertices and counter-clockwise triangles
/// A polyline whose ends coincide is stroked as a closed loop without caps
pub fn tessellate_polyline(points: &[Point], width: f64, cap: LineCap) -> (Vec<Point>, Vec<u32>) {
    let mut verts: Vec<Point> = Vec::new();
    let mut indices = Vec::new();

    let mut work_points: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if work_points.last().map_or(true, |last: &Point| last != p) {
            work_points.push(*p);
        }
    }

    let mut is_closed = false;
    if work_points.len() >= 4 && work_points.first() == work_points.last() {
        is_closed = true;
        work_points.pop();
    }

    if work_points.len() < 2 || width <= 0.0 {
        return (verts, indices);
    }

    let n = work_points.len();
    let half_w = width * 0.5;
    let segment_count = if is_closed { n } else { n - 1 };

    let mut seg_dir = Vec::with_capacity(segment_count);
    let mut seg_norm = Vec::with_capacity(segment_count);

    for i in 0..segment_count {
        let p0 = work_points[i];
        let p1 = work_points[(i + 1) % n];
        let dx = p1.x - p0.x;
        let dy = p1.y - p0.y;
        let inv_len = 1.0 / (dx * dx + dy * dy).sqrt();
        seg_dir.push((dx * inv_len, dy * inv_len));
        seg_norm.push((-dy * inv_len, dx * inv_len));
    }

    let pair_from = |point: Point, normal: (f64, f64)| -> (Point, Point) {
        (
            Point::new(point.x + normal.0 * half_w, point.y + normal.1 * half_w),
            Point::new(point.x - normal.0 * half_w, point.y - normal.1 * half_w),
        )
    };

    let mut pairs: Vec<(Point, Point)> = vec![pair_from(work_points[0], seg_norm[0])];

    for i in 0..segment_count {
        let end_idx = (i + 1) % n;
        let end_pair = pair_from(work_points[end_idx], seg_norm[i]);
        pairs.push(end_pair);

        if !is_closed && i == segment_count - 1 {
            continue;
        }

        let next_norm = seg_norm[(i + 1) % segment_count];
        let curr_dir = seg_dir[i];
        let next_dir = seg_dir[(i + 1) % segment_count];
        let cross = curr_dir.0 * next_dir.1 - curr_dir.1 * next_dir.0;

        if cross.abs() < 1e-9 {
            continue;
        }

        let is_left_turn = cross > 0.0;
        let center = work_points[end_idx];
        let next_pair = pair_from(center, next_norm);

        let (outer_start, outer_end, inner_start, inner_end) = if is_left_turn {
            (end_pair.1, next_pair.1, end_pair.0, next_pair.0)
        } else {
            (end_pair.0, next_pair.0, end_pair.1, next_pair.1)
        };

        let start_angle = (outer_start.y - center.y).atan2(outer_start.x - center.x);
        let end_angle = (outer_end.y - center.y).atan2(outer_end.x - center.x);
        let mut sweep = end_angle - start_angle;

        // the outer side of a left turn is on the right and swings counter-clockwise
        if is_left_turn {
            while sweep <= 0.0 {
                sweep += PI * 2.0;
            }
        } else {
            while sweep >= 0.0 {
                sweep -= PI * 2.0;
            }
        }

        let num_segs = ((sweep.abs() / (PI / 18.0)).ceil() as u32).max(4);

        for s in 1..=num_segs {
            let t = s as f64 / num_segs as f64;
            let ang = start_angle + sweep * t;
            let outer_point = Point::new(center.x + ang.cos() * half_w, center.y + ang.sin() * half_w);
            let inner_point = Point::new(
                inner_start.x + (inner_end.x - inner_start.x) * t,
                inner_start.y + (inner_end.y - inner_start.y) * t,
            );

            if is_left_turn {
                pairs.push((inner_point, outer_point));
            } else {
                pairs.push((outer_point, inner_point));
            }
        }
    }

    for pair in &pairs {
        verts.push(pair.0);
        verts.push(pair.1);
    }

    let base_pairs = pairs.len();
    let segment_pairs = if is_closed { base_pairs } else { base_pairs - 1 };

    for i in 0..segment_pairs {
        let next = (i + 1) % base_pairs;
        let base = (i * 2) as u32;
        let next_base = (next * 2) as u32;
        indices.extend_from_slice(&[base, next_base, next_base + 1, base, next_base + 1, base + 1]);
    }

    if !is_closed {
        match cap {
            LineCap::Round => {
                add_round_cap(&mut verts, &mut indices, work_points[0], seg_dir[0], half_w, true);
                add_round_cap(
                    &mut verts,
                    &mut indices,
                    work_points[n - 1],
                    seg_dir[segment_count - 1],
                    half_w,
                    false,
                );
            }
            LineCap::Square => {
                let start_pair = pairs[0];
                let end_pair = pairs[base_pairs - 1];
                let start_dir = seg_dir[0];
                let end_dir = seg_dir[segment_count - 1];

                let shift = |p: Point, dir: (f64, f64), sign: f64| {
                    Point::new(p.x + sign * dir.0 * half_w, p.y + sign * dir.1 * half_w)
                };

                let v_start = verts.len() as u32;
                verts.push(shift(start_pair.0, start_dir, -1.0));
                verts.push(shift(start_pair.1, start_dir, -1.0));
                indices.extend_from_slice(&[v_start, 0, 1, v_start, 1, v_start + 1]);

                let v_end = verts.len() as u32;
                let last_base = ((base_pairs - 1) * 2) as u32;
                verts.push(shift(end_pair.0, end_dir, 1.0));
                verts.push(shift(end_pair.1, end_dir, 1.0));
                indices.extend_from_slice(&[last_base, v_end, v_end + 1, last_base, v_end + 1, last_base + 1]);
            }
            LineCap::Butt => {}
        }
    }

    orient_ccw(&verts, &mut indices);
    (verts, indices)
}
