use super::*;

fn five_points() -> Vec<NormalizedPoint> {
    vec![
        NormalizedPoint::new(0.5, 0.5),
        NormalizedPoint::new(0.1, 0.1),
        NormalizedPoint::new(0.9, 0.1),
        NormalizedPoint::new(0.1, 0.9),
        NormalizedPoint::new(0.9, 0.9),
    ]
}

fn started(points: Vec<NormalizedPoint>, is_tune: bool) -> BackendEvent {
    BackendEvent::CalibrationStarted {
        points,
        message: Some("Waiting for face detection...".into()),
        is_tune,
    }
}

fn running_plan(machine: &CalibrationMachine) -> &CalibrationPlan {
    match machine.state() {
        CalibrationState::Running(plan) => plan,
        other => panic!("expected running plan, got {other:?}"),
    }
}

#[test]
fn tuning_before_calibration_is_refused_without_state_change() {
    let mut machine = CalibrationMachine::new();
    let err = machine
        .begin(CalibrationKind::Tune, false)
        .expect_err("tuning must be refused");
    assert!(matches!(err, ControllerError::NotCalibrated));
    assert!(machine.is_idle());
}

#[test]
fn begin_produces_matching_start_command() {
    let mut machine = CalibrationMachine::new();
    assert_eq!(
        machine
            .begin(CalibrationKind::Calibration, false)
            .expect("calibration"),
        ClientCommand::StartCalibration
    );
    assert_eq!(
        machine.begin(CalibrationKind::Tune, true).expect("tune"),
        ClientCommand::StartTune
    );
    assert_eq!(machine.kind(), Some(CalibrationKind::Tune));
}

#[test]
fn full_five_point_sequence_completes() {
    let mut machine = CalibrationMachine::new();
    machine
        .begin(CalibrationKind::Calibration, false)
        .expect("begin");

    assert_eq!(
        machine.apply(&BackendEvent::CalibrationFaceCountdown {
            progress: 0.4,
            message: None,
        }),
        Step::Continue
    );
    assert_eq!(machine.apply(&started(five_points(), false)), Step::Continue);

    for index in 0..5 {
        assert_eq!(
            machine.apply(&BackendEvent::CalibrationPointStart {
                index,
                total: Some(5),
            }),
            Step::Continue
        );
        for progress in [0.25, 0.5, 1.0] {
            assert_eq!(
                machine.apply(&BackendEvent::CalibrationPulse { progress }),
                Step::Continue
            );
        }
        assert_eq!(
            running_plan(&machine).phase,
            PointPhase::Pulse { progress: 1.0 }
        );
        for progress in [0.0, 0.5, 1.0] {
            assert_eq!(
                machine.apply(&BackendEvent::CalibrationCapture { progress }),
                Step::Continue
            );
        }
        assert_eq!(running_plan(&machine).index, index);
    }

    let step = machine.apply(&BackendEvent::CalibrationComplete {
        success: true,
        samples: 42,
        is_tune: false,
        error: None,
    });
    assert_eq!(
        step,
        Step::Finished(CalibrationOutcome::Completed {
            kind: CalibrationKind::Calibration,
            samples: 42,
        })
    );
    assert!(machine.is_idle());
}

#[test]
fn face_countdown_after_plan_shows_countdown_on_first_point() {
    let mut machine = CalibrationMachine::new();
    machine
        .begin(CalibrationKind::Calibration, false)
        .expect("begin");
    machine.apply(&started(five_points(), false));

    assert_eq!(
        machine.apply(&BackendEvent::CalibrationFaceCountdown {
            progress: 0.0,
            message: Some("Face not detected".into()),
        }),
        Step::Continue
    );
    let overlay = machine.overlay().expect("overlay");
    assert_eq!(overlay.point, Some(NormalizedPoint::new(0.5, 0.5)));
    assert_eq!(
        overlay.visual,
        OverlayVisual::FaceCountdown {
            progress: 0.0,
            message: Some("Face not detected".into()),
        }
    );

    machine.apply(&BackendEvent::CalibrationPointStart {
        index: 0,
        total: Some(5),
    });
    assert_eq!(
        machine.apply(&BackendEvent::CalibrationFaceCountdown {
            progress: 0.5,
            message: None,
        }),
        Step::Ignored
    );
}

#[test]
fn failed_completion_is_an_abort_with_reason() {
    let mut machine = CalibrationMachine::new();
    machine.begin(CalibrationKind::Tune, true).expect("begin");
    machine.apply(&started(vec![NormalizedPoint::new(0.3, 0.3); 10], true));

    let step = machine.apply(&BackendEvent::CalibrationComplete {
        success: false,
        samples: 0,
        is_tune: false,
        error: Some("Not enough tune data".into()),
    });
    assert_eq!(
        step,
        Step::Finished(CalibrationOutcome::Aborted {
            kind: CalibrationKind::Tune,
            reason: AbortReason::Reported("Not enough tune data".into()),
        })
    );
    assert!(machine.is_idle());
}

#[test]
fn events_while_idle_are_ignored() {
    let mut machine = CalibrationMachine::new();
    assert_eq!(machine.apply(&started(five_points(), false)), Step::Ignored);
    assert_eq!(
        machine.apply(&BackendEvent::CalibrationComplete {
            success: true,
            samples: 5,
            is_tune: false,
            error: None,
        }),
        Step::Ignored
    );
    assert!(machine.overlay().is_none());
}

#[test]
fn out_of_range_point_is_ignored() {
    let mut machine = CalibrationMachine::new();
    machine
        .begin(CalibrationKind::Calibration, false)
        .expect("begin");
    machine.apply(&started(five_points(), false));
    assert_eq!(
        machine.apply(&BackendEvent::CalibrationPointStart {
            index: 7,
            total: Some(5),
        }),
        Step::Ignored
    );
    assert_eq!(running_plan(&machine).index, 0);
}

#[test]
fn empty_plan_aborts() {
    let mut machine = CalibrationMachine::new();
    machine
        .begin(CalibrationKind::Calibration, false)
        .expect("begin");
    assert!(matches!(
        machine.apply(&started(Vec::new(), false)),
        Step::Finished(CalibrationOutcome::Aborted { .. })
    ));
    assert!(machine.is_idle());
}

#[test]
fn capture_overlay_ring_depletes() {
    let mut machine = CalibrationMachine::new();
    machine
        .begin(CalibrationKind::Calibration, false)
        .expect("begin");
    machine.apply(&started(five_points(), false));
    machine.apply(&BackendEvent::CalibrationPulse { progress: 1.0 });
    machine.apply(&BackendEvent::CalibrationCapture { progress: 0.75 });

    let overlay = machine.overlay().expect("overlay");
    assert_eq!(overlay.visual, OverlayVisual::CaptureRing { remaining: 0.25 });
}

#[test]
fn progress_is_clamped() {
    let mut machine = CalibrationMachine::new();
    machine
        .begin(CalibrationKind::Calibration, false)
        .expect("begin");
    machine.apply(&BackendEvent::CalibrationFaceCountdown {
        progress: 3.0,
        message: None,
    });
    assert_eq!(
        machine.state(),
        &CalibrationState::AwaitingFaceLock {
            kind: CalibrationKind::Calibration,
            progress: 1.0,
            message: None,
        }
    );
}

#[test]
fn pulse_radius_oscillates_around_base() {
    assert!((pulse_radius(0.0) - PULSE_BASE_RADIUS).abs() < 1e-9);
    assert!(pulse_radius(0.125) > PULSE_BASE_RADIUS);
    assert!(pulse_radius(0.375) < PULSE_BASE_RADIUS);
}
