use super::*;
use crate::angle::Orientation;
use crate::config::FormtrackConfig;
use crate::events::{EventBus, EventFilter, SessionEvent};
use crate::form::SUSTAINED_POOR_FORM_MESSAGE;
use crate::landmark::{from_timestamp_ms, Joint, JointTriple, Landmark, LandmarkFrame};
use crate::phase::Phase;
use crate::profile::{ExerciseKind, ExerciseProfile};
use crate::source::{posed_landmarks, SyntheticSource};
use tokio::time::{timeout, Duration};

const BASE_MS: u64 = 1_700_000_000_000;
const ELBOW: JointTriple = JointTriple::new(Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist);

// Curl pattern at 20 fps: top hold 0..=9, descent 10..=28, bottom hold 29..=38, ascent 39..=57
const BOTTOM_HOLD_MID: usize = 33;
const FRAMES_PER_REP: usize = 58;

fn curl_profile() -> ExerciseProfile {
    ExerciseProfile::builtin(ExerciseKind::BicepCurl)
}

fn curl_frames(reps: u32) -> Vec<LandmarkFrame> {
    let source = SyntheticSource::new(curl_profile(), reps, 20).with_start(from_timestamp_ms(BASE_MS));
    (0..source.total_frames()).map(|id| source.frame_at(id)).collect()
}

fn session() -> ExerciseSession {
    ExerciseSession::new(curl_profile(), &FormtrackConfig::default()).unwrap()
}

fn static_frame(id: u64, landmarks: [Landmark; 17]) -> LandmarkFrame {
    LandmarkFrame::new(id, from_timestamp_ms(BASE_MS + id * 50), landmarks)
}

fn run(session: &mut ExerciseSession, frames: &[LandmarkFrame]) -> Vec<FrameOutcome> {
    frames.iter().map(|frame| session.process_frame(frame)).collect()
}

fn count_events(outcomes: &[FrameOutcome], event_type: &str) -> usize {
    outcomes
        .iter()
        .flat_map(|outcome| outcome.events.iter())
        .filter(|event| event.event_type() == event_type)
        .count()
}

#[test]
fn test_curl_counts_reps_through_full_pipeline() {
    let frames = curl_frames(2);
    assert_eq!(frames.len(), FRAMES_PER_REP * 2);

    let mut session = session();
    let outcomes = run(&mut session, &frames);

    assert_eq!(session.rep_count(), 2);
    assert_eq!(count_events(&outcomes, "rep_completed"), 2);
    assert_eq!(count_events(&outcomes, "rep_rejected"), 0);
    assert!(outcomes
        .iter()
        .all(|o| o.telemetry.status == FrameStatus::Processed));

    let completed: Vec<&FrameTelemetry> = outcomes
        .iter()
        .map(|o| &o.telemetry)
        .filter(|t| t.rep_just_completed)
        .collect();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].rep_count, 1);
    assert_eq!(completed[0].phase, Phase::Extended);
}

#[test]
fn test_rep_count_is_monotone_in_telemetry() {
    let mut session = session();
    let outcomes = run(&mut session, &curl_frames(3));

    for pair in outcomes.windows(2) {
        let before = pair[0].telemetry.rep_count;
        let after = pair[1].telemetry.rep_count;
        assert!(after == before || after == before + 1);
    }
}

#[test]
fn test_single_occluded_frame_keeps_tracking() {
    let mut frames = curl_frames(1);
    frames[BOTTOM_HOLD_MID].landmark_mut(Joint::LeftElbow).confidence = 0.1;

    let mut session = session();
    let before = run(&mut session, &frames[..BOTTOM_HOLD_MID]);
    assert_eq!(before.last().unwrap().telemetry.phase, Phase::Flexed);
    let history = session.angle_history_len(&ELBOW);

    let occluded = session.process_frame(&frames[BOTTOM_HOLD_MID]);
    assert_eq!(occluded.telemetry.status, FrameStatus::NoAngle);
    assert_eq!(occluded.telemetry.missing_joints, vec![Joint::LeftElbow]);
    assert_eq!(occluded.telemetry.phase, Phase::Flexed);
    assert_eq!(occluded.telemetry.smoothed_angle, None);
    assert!(occluded
        .telemetry
        .feedback_messages
        .contains(&JOINTS_NOT_VISIBLE_MESSAGE.to_string()));
    assert_eq!(session.angle_history_len(&ELBOW), history);
    assert_eq!(session.invalid_streak(), 1);

    run(&mut session, &frames[BOTTOM_HOLD_MID + 1..]);
    assert_eq!(session.invalid_streak(), 0);
    assert_eq!(session.rep_count(), 1);
}

const LEFT_KNEE: JointTriple = JointTriple::new(Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle);
const RIGHT_KNEE: JointTriple =
    JointTriple::new(Joint::RightHip, Joint::RightKnee, Joint::RightAnkle);

/// Squat stance with the left knee at `left` and the right knee at `right` degrees
fn uneven_knees(id: u64, left: f64, right: f64) -> LandmarkFrame {
    let knees = [
        (LEFT_KNEE, Orientation::CounterClockwise),
        (RIGHT_KNEE, Orientation::CounterClockwise),
    ];
    let mut landmarks = posed_landmarks(&knees, left);
    let right_pose = posed_landmarks(&knees, right);
    for joint in RIGHT_KNEE.joints() {
        landmarks[joint.index()] = right_pose[joint.index()];
    }
    static_frame(id, landmarks)
}

#[test]
fn test_one_hidden_side_does_not_move_bilateral_angle() {
    let mut frames: Vec<LandmarkFrame> = (0..30).map(|id| uneven_knees(id, 110.0, 170.0)).collect();
    frames[10].landmark_mut(Joint::RightAnkle).confidence = 0.1;
    frames[20].landmark_mut(Joint::LeftAnkle).confidence = 0.1;

    let mut session =
        ExerciseSession::new(ExerciseProfile::builtin(ExerciseKind::Squat), &FormtrackConfig::default())
            .unwrap();
    let outcomes = run(&mut session, &frames);

    for hidden in [10, 20] {
        let telemetry = &outcomes[hidden].telemetry;
        assert_eq!(telemetry.status, FrameStatus::Processed);
        assert_eq!(telemetry.missing_joints.len(), 1);
        assert!((telemetry.smoothed_angle.unwrap() - 140.0).abs() < 0.01);
    }
    assert!(outcomes
        .iter()
        .all(|o| o.telemetry.phase == Phase::Extended));
    // Only the initial idle to extended transition
    assert_eq!(count_events(&outcomes, "phase_changed"), 1);
    assert_eq!(count_events(&outcomes, "rep_rejected"), 0);
}

#[test]
fn test_hidden_side_stops_counting_after_invalid_frame_limit() {
    let mut session =
        ExerciseSession::new(ExerciseProfile::builtin(ExerciseKind::Squat), &FormtrackConfig::default())
            .unwrap();
    session.process_frame(&uneven_knees(0, 110.0, 170.0));

    let limit = FormtrackConfig::default().engine.max_invalid_frames as u64;
    let mut raw = Vec::new();
    for id in 1..=limit + 1 {
        let mut frame = uneven_knees(id, 110.0, 170.0);
        frame.landmark_mut(Joint::RightAnkle).confidence = 0.1;
        raw.push(session.process_frame(&frame).telemetry.raw_angle.unwrap());
    }

    assert!(raw[..limit as usize].iter().all(|angle| (angle - 140.0).abs() < 0.01));
    assert!((raw[limit as usize] - 110.0).abs() < 0.01);
}

#[test]
fn test_sustained_occlusion_forces_idle_once() {
    let mut frames = curl_frames(1);
    for frame in &mut frames[BOTTOM_HOLD_MID..BOTTOM_HOLD_MID + 15] {
        frame.landmark_mut(Joint::LeftElbow).confidence = 0.1;
        frame.landmark_mut(Joint::LeftWrist).confidence = 0.1;
    }

    let mut session = session();
    let outcomes = run(&mut session, &frames[..BOTTOM_HOLD_MID + 15]);

    let gated = &outcomes[BOTTOM_HOLD_MID..];
    assert!(gated
        .iter()
        .all(|o| o.telemetry.status == FrameStatus::Gated));
    // Ten unusable frames are tolerated; the eleventh triggers recovery
    assert_eq!(gated[9].telemetry.phase, Phase::Flexed);
    assert_eq!(gated[10].telemetry.phase, Phase::Idle);
    assert_eq!(count_events(&outcomes, "tracking_lost"), 1);
    assert!(session.is_tracking_lost());
    assert_eq!(session.angle_history_len(&ELBOW), 0);
    assert!(session.machine().min_angle().is_none());

    let resumed = session.process_frame(&frames[BOTTOM_HOLD_MID + 15]);
    assert_eq!(resumed.telemetry.status, FrameStatus::Processed);
    assert_eq!(resumed.telemetry.phase, Phase::Extended);
    assert!(!session.is_tracking_lost());

    // The interrupted rep is never counted
    run(&mut session, &frames[BOTTOM_HOLD_MID + 16..]);
    assert_eq!(session.rep_count(), 0);
}

#[test]
fn test_in_band_pose_scores_100() {
    let mut landmarks = posed_landmarks(&[(ELBOW, Orientation::Clockwise)], 165.0);
    // Upper arm about 10° off the torso
    landmarks[Joint::LeftHip.index()] = Landmark::new(0.465, 0.497, 0.9);

    let mut session = session();
    let outcome = session.process_frame(&static_frame(0, landmarks));

    assert_eq!(outcome.telemetry.phase, Phase::Extended);
    assert_eq!(outcome.telemetry.form_score, Some(100.0));
    assert!(outcome.telemetry.feedback_messages.is_empty());
    assert!(outcome.telemetry.safety_warnings.is_empty());
}

#[test]
fn test_hyperextension_warning_is_throttled() {
    let mut session = session();
    // Bent the wrong way: reflex angle 200°
    let landmarks = posed_landmarks(&[(ELBOW, Orientation::CounterClockwise)], 160.0);

    let first = session.process_frame(&static_frame(0, landmarks));
    assert_eq!(
        first.telemetry.safety_warnings,
        vec!["left elbow: hyperextension detected".to_string()]
    );
    assert_eq!(count_events(std::slice::from_ref(&first), "safety_alert"), 1);
    // Safety is independent of the form score
    assert_eq!(first.telemetry.form_score, Some(100.0));

    let repeat = session.process_frame(&static_frame(1, landmarks));
    assert!(repeat.telemetry.safety_warnings.is_empty());

    let later = session.process_frame(&static_frame(70, landmarks));
    assert_eq!(later.telemetry.safety_warnings.len(), 1);
}

#[test]
fn test_sustained_poor_form_after_full_window() {
    let mut session = session();
    let mut landmarks = posed_landmarks(&[(ELBOW, Orientation::Clockwise)], 100.0);
    // Hip above the shoulder puts the upper-arm angle at 180°
    landmarks[Joint::LeftHip.index()] = Landmark::new(0.5, 0.1, 0.9);

    let frames: Vec<LandmarkFrame> = (0..30).map(|id| static_frame(id, landmarks)).collect();
    let outcomes = run(&mut session, &frames);

    let first = &outcomes[0].telemetry;
    assert_eq!(first.phase, Phase::Extended);
    assert_eq!(first.form_score, Some(40.0));
    assert_eq!(
        first.feedback_messages,
        vec![
            "left elbow: straighten up".to_string(),
            "left shoulder: bend further".to_string()
        ]
    );
    // Cooldown suppresses repeats
    assert!(outcomes[1].telemetry.feedback_messages.is_empty());

    assert_eq!(count_events(&outcomes[..29], "sustained_poor_form"), 0);
    assert_eq!(
        outcomes[29].telemetry.feedback_messages,
        vec![SUSTAINED_POOR_FORM_MESSAGE.to_string()]
    );
    assert_eq!(count_events(&outcomes, "sustained_poor_form"), 1);
}

#[test]
fn test_reset_clears_counts() {
    let mut session = session();
    run(&mut session, &curl_frames(1));
    assert_eq!(session.rep_count(), 1);

    session.reset();
    assert_eq!(session.rep_count(), 0);
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.angle_history_len(&ELBOW), 0);
}

#[test]
fn test_invalid_profile_is_rejected_at_construction() {
    let mut profile = curl_profile();
    profile.thresholds.enter = 150.0;
    assert!(ExerciseSession::new(profile, &FormtrackConfig::default()).is_err());
}

fn controller() -> SessionController {
    SessionController::new(FormtrackConfig::default(), EventBus::new(1024))
}

#[test]
fn test_control_operations_are_idempotent() {
    let controller = controller();
    assert!(!controller.reset_session());
    assert!(controller.end_session().is_none());
    assert_eq!(
        controller.submit_frame(&curl_frames(1)[0]),
        SubmitOutcome::NoSession
    );

    let id = controller.start_session(curl_profile()).unwrap();
    assert_eq!(controller.start_session(curl_profile()).unwrap(), id);
    assert!(controller.reset_session());
    assert!(controller.reset_session());

    let squat = controller
        .start_session(ExerciseProfile::builtin(ExerciseKind::Squat))
        .unwrap();
    assert_ne!(squat, id);

    let summary = controller.end_session().unwrap();
    assert_eq!(summary.session_id, squat);
    assert_eq!(summary.exercise, ExerciseKind::Squat);
    assert!(controller.end_session().is_none());
    assert!(!controller.is_active());
}

#[test]
fn test_invalid_profile_does_not_start() {
    let controller = controller();
    let mut profile = curl_profile();
    profile.visibility.min_visible = 9;
    assert!(controller.start_session(profile).is_err());
    assert!(!controller.is_active());
}

#[test]
fn test_frame_dropped_while_busy() {
    let controller = controller();
    controller.start_session(curl_profile()).unwrap();
    let frames = curl_frames(1);

    {
        let _guard = controller.claim_busy().unwrap();
        assert_eq!(controller.submit_frame(&frames[0]), SubmitOutcome::DroppedBusy);
        assert!(controller.claim_busy().is_none());
    }

    assert!(matches!(
        controller.submit_frame(&frames[1]),
        SubmitOutcome::Processed(_)
    ));

    let stats = controller.stats();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.frames_dropped_busy, 1);
    assert_eq!(stats.frames_processed, 1);
    assert_eq!(stats.processing_ratio(), 0.5);
}

#[test]
fn test_controller_stats_track_reps() {
    let controller = controller();
    controller.start_session(curl_profile()).unwrap();
    for frame in &curl_frames(2) {
        controller.submit_frame(frame);
    }

    assert_eq!(controller.rep_count(), Some(2));
    let stats = controller.stats();
    assert_eq!(stats.reps_accepted, 2);
    assert_eq!(stats.frames_processed, (FRAMES_PER_REP * 2) as u64);
    assert_eq!(stats.frames_dropped_busy, 0);
}

#[tokio::test]
async fn test_controller_publishes_events() {
    let bus = EventBus::new(1024);
    let mut reps = bus.subscribe_filtered(EventFilter::EventTypes(vec!["rep_completed"]), "reps");
    let mut lifecycle = bus.subscribe_filtered(
        EventFilter::EventTypes(vec!["session_started", "session_ended"]),
        "lifecycle",
    );
    let mut telemetry = bus.subscribe_filtered(EventFilter::EventTypes(vec!["telemetry"]), "telemetry");

    let controller = SessionController::new(FormtrackConfig::default(), bus);
    controller.start_session(curl_profile()).unwrap();
    for frame in &curl_frames(1) {
        controller.submit_frame(frame);
    }
    controller.end_session();

    match timeout(Duration::from_millis(100), reps.recv()).await.unwrap().unwrap() {
        SessionEvent::RepCompleted { rep_count, .. } => assert_eq!(rep_count, 1),
        other => panic!("Unexpected event: {:?}", other),
    }

    let started = lifecycle.recv().await.unwrap();
    assert_eq!(started.event_type(), "session_started");
    match lifecycle.recv().await.unwrap() {
        SessionEvent::SessionEnded { rep_count, .. } => assert_eq!(rep_count, 1),
        other => panic!("Unexpected event: {:?}", other),
    }

    let first = telemetry.recv().await.unwrap();
    match first {
        SessionEvent::Telemetry(frame) => assert_eq!(frame.frame_id, 0),
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[test]
fn test_telemetry_serializes_to_json() {
    let mut session = session();
    let outcome = session.process_frame(&curl_frames(1)[0]);
    let json = serde_json::to_value(&outcome.telemetry).unwrap();

    assert_eq!(json["phase"], "extended");
    assert_eq!(json["status"], "processed");
    assert_eq!(json["rep_count"], 0);
    assert!(json["rejected_rep"].is_null());
    assert!(json["missing_joints"].as_array().unwrap().is_empty());
}
