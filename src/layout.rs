//! Pattern math for the orchestration layer.
//!
//! Everything here is pure: positions are computed from an entity's index
//! alone, so the same inputs always give the same layout.

use crate::error::ClientError;
use crate::types::Vec3;
use std::f64::consts::PI;
use std::str::FromStr;

/// Default resting height for arranged entities (half a unit cube).
pub const DEFAULT_HEIGHT: f64 = 0.5;

/// Ring radii tried by [`spiral_candidates`], innermost first.
pub const SPIRAL_RADII: [f64; 4] = [0.5, 1.0, 1.5, 2.0];
/// Angular step between spiral candidates on one ring.
pub const SPIRAL_STEP_DEGREES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineAxis {
    #[default]
    X,
    Z,
}

impl FromStr for LineAxis {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" | "X" => Ok(LineAxis::X),
            "z" | "Z" => Ok(LineAxis::Z),
            other => Err(ClientError::InvalidArgument(format!(
                "direction must be 'x' or 'z', got '{other}'"
            ))),
        }
    }
}

/// `count` positions `spacing` apart along `axis`.
///
/// Without a start the line begins at `(-count * spacing / 2, 0.5, 0)`.
pub fn line_positions(count: usize, spacing: f64, start: Option<Vec3>, axis: LineAxis) -> Vec<Vec3> {
    let start =
        start.unwrap_or_else(|| Vec3::new(-(count as f64) * spacing / 2.0, DEFAULT_HEIGHT, 0.0));

    (0..count)
        .map(|i| {
            let offset = i as f64 * spacing;
            match axis {
                LineAxis::X => Vec3::new(start.x + offset, start.y, start.z),
                LineAxis::Z => Vec3::new(start.x, start.y, start.z + offset),
            }
        })
        .collect()
}

/// Entity `i` of `count` sits at angle `2πi/count` on the ring.
pub fn circle_positions(count: usize, radius: f64, center: Option<Vec3>) -> Vec<Vec3> {
    let center = center.unwrap_or(Vec3::new(0.0, DEFAULT_HEIGHT, 0.0));

    (0..count)
        .map(|i| {
            let angle = (i as f64 / count as f64) * 2.0 * PI;
            Vec3::new(
                center.x + radius * angle.cos(),
                center.y,
                center.z + radius * angle.sin(),
            )
        })
        .collect()
}

/// Row-major grid centered on `start`.  `None` when `rows * cols` cannot
/// hold `count` entities.
pub fn grid_positions(
    count: usize,
    rows: usize,
    cols: usize,
    spacing: f64,
    start: Option<Vec3>,
) -> Option<Vec<Vec3>> {
    if cols == 0 || rows * cols < count {
        return None;
    }
    let start = start.unwrap_or(Vec3::new(0.0, DEFAULT_HEIGHT, 0.0));
    let half_w = (cols - 1) as f64 * spacing / 2.0;
    let half_h = (rows.max(1) - 1) as f64 * spacing / 2.0;

    Some(
        (0..count)
            .map(|i| {
                let row = i / cols;
                let col = i % cols;
                Vec3::new(
                    start.x + col as f64 * spacing - half_w,
                    start.y,
                    start.z + row as f64 * spacing - half_h,
                )
            })
            .collect(),
    )
}

/// Candidate positions for a safe-spot search, in the order they are tried:
/// `preferred` itself, then each ring of [`SPIRAL_RADII`] up to
/// `search_radius`, every [`SPIRAL_STEP_DEGREES`] degrees.
pub fn spiral_candidates(preferred: Vec3, search_radius: f64) -> Vec<Vec3> {
    let mut out = vec![preferred];
    for radius in SPIRAL_RADII {
        if radius > search_radius {
            break;
        }
        for degrees in (0..360).step_by(SPIRAL_STEP_DEGREES) {
            let rad = (degrees as f64).to_radians();
            out.push(Vec3::new(
                preferred.x + radius * rad.cos(),
                preferred.y,
                preferred.z + radius * rad.sin(),
            ));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// Saturation and value of generated palettes.
pub const PALETTE_SATURATION: f64 = 0.8;
pub const PALETTE_VALUE: f64 = 0.8;

/// HSV (all in `0..=1`) to RGB (all in `0..=1`).
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [f64; 3] {
    if s == 0.0 {
        return [v, v, v];
    }
    let h6 = (h.rem_euclid(1.0)) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u8 % 6 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// One evenly spaced hue per entity, fixed saturation and value.
pub fn rainbow_palette(count: usize) -> Vec<[f64; 3]> {
    (0..count)
        .map(|i| hsv_to_rgb(i as f64 / count as f64, PALETTE_SATURATION, PALETTE_VALUE))
        .collect()
}
