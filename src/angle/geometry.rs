use crate::landmark::Landmark;
use serde::{Deserialize, Serialize};

/// Segments shorter than this (in normalized units) are treated as zero-length
const MIN_SEGMENT_LENGTH: f64 = 1e-6;

/// Direction a joint bends, as seen on screen (image coordinates, y down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Clockwise,
    CounterClockwise,
}

/// Vectors vertex->proximal and vertex->distal, or `None` when either is degenerate
fn segments(proximal: &Landmark, vertex: &Landmark, distal: &Landmark) -> Option<((f64, f64), (f64, f64))> {
    let u = (
        proximal.x as f64 - vertex.x as f64,
        proximal.y as f64 - vertex.y as f64,
    );
    let w = (
        distal.x as f64 - vertex.x as f64,
        distal.y as f64 - vertex.y as f64,
    );

    if !(u.0.is_finite() && u.1.is_finite() && w.0.is_finite() && w.1.is_finite()) {
        return None;
    }

    let mag_u = u.0.hypot(u.1);
    let mag_w = w.0.hypot(w.1);
    if mag_u < MIN_SEGMENT_LENGTH || mag_w < MIN_SEGMENT_LENGTH {
        return None;
    }

    Some((u, w))
}

/// Interior angle at `vertex` in degrees [0, 180].
///
/// Uses cos(θ) = (u · w) / (|u| |w|) with the cosine clamped against
/// rounding. Returns `None` for zero-length segments or non-finite input.
pub fn interior_angle(proximal: &Landmark, vertex: &Landmark, distal: &Landmark) -> Option<f64> {
    let (u, w) = segments(proximal, vertex, distal)?;

    let dot = u.0 * w.0 + u.1 * w.1;
    let cos_angle = (dot / (u.0.hypot(u.1) * w.0.hypot(w.1))).clamp(-1.0, 1.0);

    Some(cos_angle.acos().to_degrees())
}

/// Side the distal segment lies on relative to the proximal one.
///
/// `None` when the three points are collinear.
pub fn bend_orientation(
    proximal: &Landmark,
    vertex: &Landmark,
    distal: &Landmark,
) -> Option<Orientation> {
    let (u, w) = segments(proximal, vertex, distal)?;
    let cross = u.0 * w.1 - u.1 * w.0;

    if cross > 0.0 {
        Some(Orientation::Clockwise)
    } else if cross < 0.0 {
        Some(Orientation::CounterClockwise)
    } else {
        None
    }
}

/// Oriented joint angle in degrees [0, 360).
///
/// Equal to the interior angle when the joint bends toward its natural
/// `flexion` side, `360 - interior` when it bends the other way. A joint
/// pushed past straight therefore reads above 180.
pub fn reflex_angle(
    proximal: &Landmark,
    vertex: &Landmark,
    distal: &Landmark,
    flexion: Orientation,
) -> Option<f64> {
    let interior = interior_angle(proximal, vertex, distal)?;

    match bend_orientation(proximal, vertex, distal) {
        Some(orientation) if orientation != flexion => Some(360.0 - interior),
        _ => Some(interior),
    }
}
