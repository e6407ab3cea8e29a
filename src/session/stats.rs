use super::telemetry::FrameStatus;
use std::time::SystemTime;

/// Frame and rep counters for one controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_dropped_busy: u64,
    pub frames_gated: u64,
    pub reps_accepted: u64,
    pub reps_rejected: u64,
    pub tracking_lost: u64,
    pub last_frame_time: Option<SystemTime>,
}

impl SessionStats {
    pub fn record_received(&mut self) {
        self.frames_received += 1;
        self.last_frame_time = Some(SystemTime::now());
    }

    pub fn record_status(&mut self, status: FrameStatus) {
        match status {
            FrameStatus::Processed => self.frames_processed += 1,
            FrameStatus::Gated | FrameStatus::NoAngle => self.frames_gated += 1,
        }
    }

    pub fn record_dropped_busy(&mut self) {
        self.frames_dropped_busy += 1;
    }

    pub fn record_rep_accepted(&mut self) {
        self.reps_accepted += 1;
    }

    pub fn record_rep_rejected(&mut self) {
        self.reps_rejected += 1;
    }

    pub fn record_tracking_lost(&mut self) {
        self.tracking_lost += 1;
    }

    /// Share of received frames that made it through the full pipeline
    pub fn processing_ratio(&self) -> f64 {
        if self.frames_received == 0 {
            0.0
        } else {
            self.frames_processed as f64 / self.frames_received as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_ratio() {
        let mut stats = SessionStats::default();
        assert_eq!(stats.processing_ratio(), 0.0);

        for _ in 0..4 {
            stats.record_received();
        }
        stats.record_status(FrameStatus::Processed);
        stats.record_status(FrameStatus::Processed);
        stats.record_status(FrameStatus::Processed);
        stats.record_status(FrameStatus::Gated);

        assert_eq!(stats.frames_gated, 1);
        assert_eq!(stats.processing_ratio(), 0.75);
        assert!(stats.last_frame_time.is_some());

        stats.reset();
        assert_eq!(stats, SessionStats::default());
    }
}
