use super::*;
use crate::angle::AngleSample;
use crate::landmark::from_timestamp_ms;
use crate::profile::{ExerciseKind, ExerciseProfile, PhaseModel, PhaseThresholds};

const BASE_MS: u64 = 1_700_000_000_000;
const CYCLE: [f64; 10] = [
    170.0, 150.0, 130.0, 110.0, 110.0, 110.0, 110.0, 130.0, 150.0, 170.0,
];

fn test_profile() -> ExerciseProfile {
    let mut profile = ExerciseProfile::builtin(ExerciseKind::Squat);
    profile.thresholds = PhaseThresholds {
        enter: 120.0,
        exit: 150.0,
        bottom_angle: 120.0,
    };
    profile
}

fn hold_profile(hold_seconds: f64) -> ExerciseProfile {
    let mut profile = test_profile();
    profile.timing.hold_seconds = Some(hold_seconds);
    profile
}

/// Samples 50 ms apart starting at `offset_ms`, with velocities consistent with the angles
fn samples(angles: &[f64], offset_ms: u64) -> Vec<AngleSample> {
    angles
        .iter()
        .enumerate()
        .map(|(i, angle)| {
            let velocity = if i == 0 {
                0.0
            } else {
                (angle - angles[i - 1]) / 0.05
            };
            AngleSample {
                raw: *angle,
                smoothed: *angle,
                velocity,
                timestamp: from_timestamp_ms(BASE_MS + offset_ms + i as u64 * 50),
            }
        })
        .collect()
}

fn run(machine: &mut PhaseStateMachine, samples: &[AngleSample]) -> Vec<PhaseUpdate> {
    samples.iter().map(|sample| machine.update(sample)).collect()
}

fn rejections(updates: &[PhaseUpdate]) -> Vec<Vec<RepRejection>> {
    updates
        .iter()
        .filter_map(|update| update.rep.as_ref())
        .filter(|rep| !rep.is_accepted())
        .map(|rep| rep.rejections().to_vec())
        .collect()
}

#[test]
fn test_single_cycle_counts_one_rep() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let updates = run(&mut machine, &samples(&CYCLE, 0));

    assert_eq!(machine.rep_count(), 1);
    assert_eq!(machine.phase(), Phase::Extended);
    assert_eq!(updates.iter().filter(|u| u.rep_completed()).count(), 1);
    // Rep lands on the exit crossing at 150°
    assert!(updates[8].rep_completed());
    assert!(rejections(&updates).is_empty());
}

#[test]
fn test_detailed_phase_sequence() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let phases: Vec<Phase> = run(&mut machine, &samples(&CYCLE, 0))
        .iter()
        .map(|u| u.phase)
        .collect();

    assert_eq!(
        phases,
        vec![
            Phase::Extended,
            Phase::Extended,
            Phase::Flexing,
            Phase::Flexed,
            Phase::Flexed,
            Phase::Flexed,
            Phase::Flexed,
            Phase::Extending,
            Phase::Extended,
            Phase::Extended,
        ]
    );
}

#[test]
fn test_simple_model_only_uses_extended_and_flexed() {
    let mut profile = test_profile();
    profile.model = PhaseModel::Simple;
    let mut machine = PhaseStateMachine::new(&profile, 10);
    let updates = run(&mut machine, &samples(&CYCLE, 0));

    assert!(updates
        .iter()
        .all(|u| matches!(u.phase, Phase::Extended | Phase::Flexed)));
    assert_eq!(machine.rep_count(), 1);
}

#[test]
fn test_two_cycles_inside_interval_count_once() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    run(&mut machine, &samples(&CYCLE, 0));
    let second = run(&mut machine, &samples(&CYCLE, 500));

    assert_eq!(machine.rep_count(), 1);
    assert_eq!(rejections(&second), vec![vec![RepRejection::TooSoon]]);
}

#[test]
fn test_two_spaced_cycles_count_twice() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    run(&mut machine, &samples(&CYCLE, 0));
    run(&mut machine, &samples(&CYCLE, 1600));

    assert_eq!(machine.rep_count(), 2);
}

#[test]
fn test_shallow_dip_is_rejected_as_bottom_not_reached() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let shallow = [170.0, 160.0, 150.0, 140.0, 140.0, 140.0, 150.0, 160.0, 170.0];
    let updates = run(&mut machine, &samples(&shallow, 0));

    assert_eq!(machine.rep_count(), 0);
    assert_eq!(
        rejections(&updates),
        vec![vec![RepRejection::BottomNotReached]]
    );
    assert!(updates.iter().all(|u| u.phase != Phase::Flexed));
}

#[test]
fn test_bounce_through_flexion_is_too_short() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let updates = run(&mut machine, &samples(&[170.0, 110.0, 150.0], 0));

    assert_eq!(machine.rep_count(), 0);
    assert_eq!(rejections(&updates), vec![vec![RepRejection::DwellTooShort]]);
}

#[test]
fn test_slow_exit_is_rejected() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let mut cycle = samples(&CYCLE, 0);
    cycle[8].velocity = 5.0;
    let updates = run(&mut machine, &cycle);

    assert_eq!(machine.rep_count(), 0);
    assert_eq!(rejections(&updates), vec![vec![RepRejection::ExitTooSlow]]);
}

#[test]
fn test_every_failing_predicate_is_reported() {
    let mut profile = test_profile();
    profile.thresholds.bottom_angle = 100.0;
    let mut machine = PhaseStateMachine::new(&profile, 10);
    let mut bounce = samples(&[170.0, 110.0, 150.0], 0);
    bounce[2].velocity = 1.0;
    let updates = run(&mut machine, &bounce);

    assert_eq!(
        rejections(&updates),
        vec![vec![
            RepRejection::DwellTooShort,
            RepRejection::BottomNotReached,
            RepRejection::ExitTooSlow,
        ]]
    );
}

#[test]
fn test_hold_profile_counts_after_hold() {
    let mut machine = PhaseStateMachine::new(&hold_profile(0.22), 10);
    let angles = [
        170.0, 140.0, 110.0, 110.0, 110.0, 110.0, 110.0, 110.0, 110.0, 130.0, 150.0, 170.0,
    ];
    let updates = run(&mut machine, &samples(&angles, 0));

    assert!(updates.iter().any(|u| u.phase == Phase::Holding));
    assert_eq!(updates[9].phase, Phase::Extending);
    assert_eq!(machine.rep_count(), 1);
}

#[test]
fn test_hold_profile_rejects_early_extension() {
    let mut machine = PhaseStateMachine::new(&hold_profile(0.22), 10);
    let angles = [170.0, 140.0, 110.0, 110.0, 110.0, 130.0, 150.0, 170.0];
    let updates = run(&mut machine, &samples(&angles, 0));

    // No extending phase before the hold is done
    assert_eq!(updates[5].phase, Phase::Flexed);
    assert!(updates.iter().all(|u| u.phase != Phase::Holding));
    assert_eq!(machine.rep_count(), 0);
    assert_eq!(
        rejections(&updates),
        vec![vec![RepRejection::HoldNotCompleted]]
    );
}

#[test]
fn test_idle_start_in_flexion() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let update = machine.update(&samples(&[100.0], 0)[0]);

    assert_eq!(update.previous, Phase::Idle);
    assert_eq!(update.phase, Phase::Flexed);
    assert!(machine.flexion_entered_at().is_some());
    assert_eq!(machine.min_angle(), Some(100.0));
}

#[test]
fn test_force_idle_keeps_count_and_clears_trackers() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    run(&mut machine, &samples(&CYCLE, 0));
    run(&mut machine, &samples(&[170.0, 140.0, 110.0], 2000));
    assert_eq!(machine.phase(), Phase::Flexed);

    machine.force_idle(from_timestamp_ms(BASE_MS + 3000));
    assert_eq!(machine.phase(), Phase::Idle);
    assert_eq!(machine.rep_count(), 1);
    assert_eq!(machine.min_angle(), None);
    assert_eq!(machine.flexion_entered_at(), None);

    let update = machine.update(&samples(&[170.0], 3050)[0]);
    assert_eq!(update.phase, Phase::Extended);
}

#[test]
fn test_reset_clears_everything() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    run(&mut machine, &samples(&CYCLE, 0));
    machine.reset();

    assert_eq!(machine.phase(), Phase::Idle);
    assert_eq!(machine.rep_count(), 0);
    assert_eq!(machine.last_rep_at(), None);
    assert_eq!(machine.history_len(), 0);
}

#[test]
fn test_history_is_bounded() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    for cycle in 0..5 {
        run(&mut machine, &samples(&CYCLE, cycle * 2000));
    }

    assert_eq!(machine.history_len(), 10);
    let last = machine.history().last().unwrap();
    assert_eq!(last.to, Phase::Extended);
    assert_eq!(machine.rep_count(), 5);
}

#[test]
fn test_backwards_clock_never_panics_or_double_counts() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    run(&mut machine, &samples(&CYCLE, 5000));
    // Same cycle replayed with timestamps earlier than the accepted rep
    let updates = run(&mut machine, &samples(&CYCLE, 0));

    assert_eq!(machine.rep_count(), 1);
    assert_eq!(rejections(&updates), vec![vec![RepRejection::TooSoon]]);
}

#[test]
fn test_rep_count_is_monotone_under_jitter() {
    let mut machine = PhaseStateMachine::new(&test_profile(), 10);
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut previous_angle = 160.0;
    let mut previous_count = 0;

    for i in 0..2000u64 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let angle = 60.0 + (seed % 12_000) as f64 / 100.0;
        let sample = AngleSample {
            raw: angle,
            smoothed: angle,
            velocity: (angle - previous_angle) / 0.033,
            timestamp: from_timestamp_ms(BASE_MS + i * 33),
        };
        previous_angle = angle;

        machine.update(&sample);
        let count = machine.rep_count();
        assert!(count == previous_count || count == previous_count + 1);
        previous_count = count;
    }
}
