mod common;

use std::{fmt::Write, io::Cursor, thread, time::Duration};

use common::{hand, FakeCamera};
use fingercount::{
    detector::{replay::Replay, HandCandidate, HandDetector, Inline, Threaded},
    image::Image,
    landmark::LandmarkSet,
    session::{SessionController, SessionState, TextUi},
    Error,
};

fn frame_json(hands: &[(&LandmarkSet, f32)]) -> String {
    let mut out = String::from(r#"{"hands":["#);
    for (i, (lms, score)) in hands.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write!(out, r#"{{"handedness":"Right","score":{score},"landmarks":["#).unwrap();
        for (j, lm) in lms.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            write!(out, r#"{{"x":{},"y":{},"z":0.0}}"#, lm.x(), lm.y()).unwrap();
        }
        out.push_str("]}");
    }
    out.push_str("]}\n");
    out
}

#[test]
fn replay_through_session() {
    let open = hand([true; 5]);
    let two = hand([false, true, true, false, false]);
    let recording = [
        frame_json(&[(&open, 0.95)]),
        // Below the detection threshold.
        frame_json(&[(&open, 0.5)]),
        frame_json(&[(&two, 0.9), (&open, 0.85)]),
        frame_json(&[]),
    ]
    .concat();

    let (cam, log) = FakeCamera::new();
    let source = Inline::new(Replay::new(Cursor::new(recording)));
    let mut ctrl = SessionController::new(cam, source, TextUi::default());
    ctrl.start().unwrap();

    let mut readings = Vec::new();
    for _ in 0..4 {
        assert_eq!(ctrl.pump().unwrap(), 1);
        readings.push(ctrl.ui().reading().to_string());
    }
    assert_eq!(
        readings,
        ["Fingers: 5", "No hand detected", "Fingers: 2", "No hand detected"]
    );

    // Recording exhausted.
    let err = ctrl.pump().unwrap_err();
    assert!(matches!(err, Error::Detector(_)), "{err:?}");
    assert_eq!(ctrl.state(), SessionState::Idle);
    assert_eq!(log.live_tracks.get(), 0);
}

#[test]
fn tracking_threshold_applies_after_detection() {
    let open = hand([true; 5]);
    let recording = [
        frame_json(&[(&open, 0.9)]),
        frame_json(&[(&open, 0.6)]),
    ]
    .concat();

    let (cam, _log) = FakeCamera::new();
    let source = Inline::new(Replay::new(Cursor::new(recording)));
    let options = fingercount::session::SessionOptions::default().detector(
        fingercount::detector::DetectorOptions::default().min_tracking_confidence(0.5),
    );
    let mut ctrl = SessionController::with_options(cam, source, TextUi::default(), options);
    ctrl.start().unwrap();

    ctrl.pump().unwrap();
    ctrl.pump().unwrap();
    assert_eq!(ctrl.ui().reading(), "Fingers: 5");
}

#[test]
fn threaded_replay() {
    let open = hand([true; 5]);
    let recording = frame_json(&[(&open, 0.95)]).repeat(64);

    let (cam, _log) = FakeCamera::new();
    let source = Threaded::new(Replay::new(Cursor::new(recording)));
    let mut ctrl = SessionController::new(cam, source, TextUi::default());
    ctrl.start().unwrap();

    let mut applied = 0;
    for _ in 0..50 {
        applied += ctrl.pump().unwrap();
        if applied > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(applied > 0);
    assert_eq!(ctrl.ui().reading(), "Fingers: 5");

    ctrl.stop();
    assert_eq!(ctrl.dispatch().unwrap(), 0);
}

/// Fails to load its landmark model.
struct MissingModel;

impl HandDetector for MissingModel {
    fn set_model_complexity(&mut self, _complexity: u8) -> anyhow::Result<()> {
        anyhow::bail!("landmark model not found")
    }

    fn detect(&mut self, _frame: &Image) -> anyhow::Result<Vec<HandCandidate>> {
        Ok(Vec::new())
    }
}

#[test]
fn threaded_model_failure_keeps_session_idle() {
    let (cam, log) = FakeCamera::new();
    let mut ctrl = SessionController::new(cam, Threaded::new(MissingModel), TextUi::default());

    for _ in 0..2 {
        let err = ctrl.start().unwrap_err();
        assert!(matches!(err, Error::Detector(_)), "{err:?}");
        assert_eq!(ctrl.state(), SessionState::Idle);
        assert!(ctrl.ui().start_enabled());
        assert!(!ctrl.ui().stop_enabled());
        assert_eq!(log.live_tracks.get(), 0);
    }
    assert_eq!(log.acquired.get(), 2);
    assert_eq!(ctrl.ui().errors().len(), 2);
}
