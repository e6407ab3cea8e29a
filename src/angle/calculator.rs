use super::filter::{AngleFilter, AngleSample, FilterSettings};
use super::geometry::{interior_angle, reflex_angle, Orientation};
use crate::landmark::{JointTriple, LandmarkFrame};
use std::collections::HashMap;
use tracing::trace;

/// Converts joint triples into filtered angle samples.
///
/// Each triple gets its own rolling history, created on first use. A frame in
/// which a triple is not confidently visible yields `None` and leaves that
/// history untouched, so single-frame occlusion flicker does not reset it.
#[derive(Debug, Clone)]
pub struct AngleCalculator {
    settings: FilterSettings,
    confidence_threshold: f32,
    filters: HashMap<JointTriple, AngleFilter>,
}

impl AngleCalculator {
    pub fn new(settings: FilterSettings, confidence_threshold: f32) -> Self {
        Self {
            settings,
            confidence_threshold,
            filters: HashMap::new(),
        }
    }

    /// Unfiltered interior angle, or `None` when any joint is at or below the
    /// confidence threshold or a segment is degenerate. Fully folded segments
    /// (0°) are treated as a tracking error.
    pub fn raw_angle(&self, frame: &LandmarkFrame, triple: &JointTriple) -> Option<f64> {
        if !self.triple_visible(frame, triple) {
            return None;
        }

        interior_angle(
            frame.landmark(triple.proximal),
            frame.landmark(triple.vertex),
            frame.landmark(triple.distal),
        )
        .filter(|angle| angle.is_finite() && *angle > 0.0)
    }

    /// Oriented angle in [0, 360) for safety checks
    pub fn reflex_angle(
        &self,
        frame: &LandmarkFrame,
        triple: &JointTriple,
        flexion: Orientation,
    ) -> Option<f64> {
        if !self.triple_visible(frame, triple) {
            return None;
        }

        reflex_angle(
            frame.landmark(triple.proximal),
            frame.landmark(triple.vertex),
            frame.landmark(triple.distal),
            flexion,
        )
    }

    /// Measure a triple and push it through its rolling filter
    pub fn measure(&mut self, frame: &LandmarkFrame, triple: &JointTriple) -> Option<AngleSample> {
        let Some(raw) = self.raw_angle(frame, triple) else {
            trace!("Angle for {} unavailable in frame {}", triple, frame.id);
            return None;
        };

        let settings = self.settings;
        let filter = self
            .filters
            .entry(*triple)
            .or_insert_with(|| AngleFilter::new(settings));

        Some(filter.update(raw, frame.timestamp))
    }

    /// Drop every triple's history
    pub fn reset(&mut self) {
        self.filters.clear();
    }

    /// Number of samples held for a triple
    pub fn history_len(&self, triple: &JointTriple) -> usize {
        self.filters.get(triple).map(AngleFilter::len).unwrap_or(0)
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    fn triple_visible(&self, frame: &LandmarkFrame, triple: &JointTriple) -> bool {
        triple
            .joints()
            .iter()
            .all(|joint| frame.is_visible(*joint, self.confidence_threshold))
    }
}
