use super::exercise::ExerciseSession;
use super::stats::SessionStats;
use super::telemetry::FrameTelemetry;
use crate::config::FormtrackConfig;
use crate::error::ProfileError;
use crate::events::{EventBus, SessionEvent};
use crate::landmark::LandmarkFrame;
use crate::phase::Phase;
use crate::profile::{ExerciseKind, ExerciseProfile};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// What happened to a submitted frame
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The frame ran to completion
    Processed(Box<FrameTelemetry>),
    /// Another frame was in flight; this one was discarded
    DroppedBusy,
    /// No session is active
    NoSession,
}

/// Final numbers for an ended session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub exercise: ExerciseKind,
    pub rep_count: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Releases the busy flag when a frame finishes, including on unwind
pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn try_claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Single-writer front end for one exercise session.
///
/// Frames are processed at most one at a time: a frame that arrives while
/// another is in flight is dropped and counted, never queued, and the
/// producer is never blocked. Control operations are idempotent.
pub struct SessionController {
    config: FormtrackConfig,
    event_bus: EventBus,
    session: Mutex<Option<ExerciseSession>>,
    busy: AtomicBool,
    stats: Mutex<SessionStats>,
}

impl SessionController {
    pub fn new(config: FormtrackConfig, event_bus: EventBus) -> Self {
        Self {
            config,
            event_bus,
            session: Mutex::new(None),
            busy: AtomicBool::new(false),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    /// Start tracking `profile`.
    ///
    /// Starting the profile that is already active returns the existing
    /// session id; a different profile ends the current session first.
    pub fn start_session(&self, profile: ExerciseProfile) -> Result<Uuid, ProfileError> {
        let mut slot = self.session.lock();

        if let Some(active) = slot.as_ref() {
            if *active.profile() == profile {
                debug!("Session {} already active for {}", active.id(), profile.kind);
                return Ok(active.id());
            }
        }

        let session = ExerciseSession::new(profile, &self.config)?;
        if let Some(previous) = slot.take() {
            self.close(&previous);
        }

        let id = session.id();
        self.emit(SessionEvent::SessionStarted {
            session_id: id,
            exercise: session.exercise(),
            started_at: session.started_at(),
        });
        *slot = Some(session);
        self.stats.lock().reset();

        Ok(id)
    }

    /// End the active session; `None` when there is none
    pub fn end_session(&self) -> Option<SessionSummary> {
        let session = self.session.lock().take()?;
        let summary = self.close(&session);

        let stats = self.stats();
        info!(
            "Session stats: {} received, {} processed ({:.1}%), {} gated, {} dropped busy, {} reps accepted, {} rejected, tracking lost {} times",
            stats.frames_received,
            stats.frames_processed,
            stats.processing_ratio() * 100.0,
            stats.frames_gated,
            stats.frames_dropped_busy,
            stats.reps_accepted,
            stats.reps_rejected,
            stats.tracking_lost
        );

        Some(summary)
    }

    /// Clear counts and histories of the active session; `false` when there is none
    pub fn reset_session(&self) -> bool {
        let mut slot = self.session.lock();
        let Some(session) = slot.as_mut() else {
            return false;
        };

        session.reset();
        self.stats.lock().reset();
        self.emit(SessionEvent::SessionReset {
            session_id: session.id(),
            timestamp: SystemTime::now(),
        });
        true
    }

    /// Process a frame unless one is already in flight
    pub fn submit_frame(&self, frame: &LandmarkFrame) -> SubmitOutcome {
        self.stats.lock().record_received();

        let Some(_guard) = BusyGuard::try_claim(&self.busy) else {
            trace!("Frame {} dropped: previous frame still processing", frame.id);
            self.stats.lock().record_dropped_busy();
            return SubmitOutcome::DroppedBusy;
        };

        let mut slot = self.session.lock();
        let Some(session) = slot.as_mut() else {
            return SubmitOutcome::NoSession;
        };

        let outcome = session.process_frame(frame);
        drop(slot);

        {
            let mut stats = self.stats.lock();
            stats.record_status(outcome.telemetry.status);
            for event in &outcome.events {
                match event {
                    SessionEvent::RepCompleted { .. } => stats.record_rep_accepted(),
                    SessionEvent::RepRejected { .. } => stats.record_rep_rejected(),
                    SessionEvent::TrackingLost { .. } => stats.record_tracking_lost(),
                    _ => {}
                }
            }
        }

        for event in outcome.events {
            self.emit(event);
        }
        self.emit(SessionEvent::Telemetry(outcome.telemetry.clone()));

        SubmitOutcome::Processed(Box::new(outcome.telemetry))
    }

    fn close(&self, session: &ExerciseSession) -> SessionSummary {
        let summary = SessionSummary {
            session_id: session.id(),
            exercise: session.exercise(),
            rep_count: session.rep_count(),
            started_at: session.started_at(),
            ended_at: Utc::now(),
        };
        self.emit(SessionEvent::SessionEnded {
            session_id: summary.session_id,
            exercise: summary.exercise,
            rep_count: summary.rep_count,
            ended_at: summary.ended_at,
        });
        summary
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            trace!("Event not delivered: {}", e);
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.lock().as_ref().map(ExerciseSession::id)
    }

    pub fn rep_count(&self) -> Option<u32> {
        self.session.lock().as_ref().map(ExerciseSession::rep_count)
    }

    pub fn phase(&self) -> Option<Phase> {
        self.session.lock().as_ref().map(ExerciseSession::phase)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &FormtrackConfig {
        &self.config
    }

    /// Hold the busy flag as if a frame were in flight
    #[cfg(test)]
    pub(crate) fn claim_busy(&self) -> Option<BusyGuard<'_>> {
        BusyGuard::try_claim(&self.busy)
    }
}
