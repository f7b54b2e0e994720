// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for video recording through a session

mod common;

use camera_session::pipelines::video::{
    BranchState, MediaWriter, RawContainerWriter, RawRecordKind, read_raw_container,
};
use camera_session::{Resolution, SessionError, SessionEvent, SessionState};
use common::{Harness, wait_until};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_recording_finalizes_with_even_timestamps() {
    let harness = Harness::running();
    harness.session.start_video_recording().wait().unwrap();
    assert_eq!(harness.session.recording_state(), BranchState::Running);

    for fill in 0..5 {
        assert!(harness.push(fill));
    }
    let path = harness.session.stop_video_recording().wait().unwrap();

    assert!(path.starts_with(harness.output_dir.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mem"));
    assert_eq!(harness.session.recording_state(), BranchState::NotStarted);

    let log = harness.writer_log.lock().unwrap();
    let (format, configured_path) = &log.configured[0];
    assert_eq!(format.resolution, Resolution::new(64, 48));
    assert_eq!(format.fps, 25);
    assert_eq!(configured_path, &path);
    assert_eq!(log.finalized, vec![path.clone()]);

    let expected: Vec<Duration> = (0..5).map(|i| Duration::from_millis(40) * i).collect();
    assert_eq!(log.video_timestamps, expected);
}

#[test]
fn test_second_start_is_already_recording() {
    let harness = Harness::running();
    harness.session.start_video_recording().wait().unwrap();
    assert_eq!(
        harness.session.start_video_recording().wait(),
        Err(SessionError::AlreadyRecording)
    );
}

#[test]
fn test_stop_without_recording() {
    let harness = Harness::running();
    assert_eq!(
        harness.session.stop_video_recording().wait(),
        Err(SessionError::NotRecording)
    );

    harness.session.start_video_recording().wait().unwrap();
    let first = harness.session.stop_video_recording();
    assert_eq!(
        harness.session.stop_video_recording().wait(),
        Err(SessionError::NotRecording)
    );
    assert!(first.wait().is_ok());
}

#[test]
fn test_restart_waits_for_previous_finalize() {
    let harness = Harness::running();
    harness.writer_log.lock().unwrap().finalize_delay = Duration::from_millis(150);

    harness.session.start_video_recording().wait().unwrap();
    harness.push(1);
    let mut stop = harness.session.stop_video_recording();
    harness.session.start_video_recording().wait().unwrap();

    // By the time the second recording started, the first was finalized
    assert!(matches!(stop.try_result(), Some(Ok(_))));
    let log = harness.writer_log.lock().unwrap();
    assert_eq!(log.finalized.len(), 1);
    assert_eq!(log.configured.len(), 2);
}

#[test]
fn test_dispose_discards_active_recording() {
    let mut harness = Harness::running();
    harness.session.start_video_recording().wait().unwrap();
    harness.push(1);
    harness.push(2);

    harness.session.dispose();
    {
        let log = harness.writer_log.lock().unwrap();
        assert_eq!(log.discarded, 1);
        assert!(log.finalized.is_empty());
    }
    assert_eq!(harness.session.recording_state(), BranchState::NotStarted);
    assert!(
        harness
            .drain_events()
            .iter()
            .all(|e| !matches!(e, SessionEvent::CameraError { .. }))
    );
}

#[test]
fn test_writer_failure_reports_camera_error() {
    let mut harness = Harness::running();
    harness.writer_log.lock().unwrap().fail_on_frame = Some(2);
    harness.session.start_video_recording().wait().unwrap();

    for fill in 0..3 {
        harness.push(fill);
    }
    assert_eq!(
        harness.next_event(),
        Some(SessionEvent::CameraError {
            camera_id: 1,
            description: "Recording failed: disk full".to_string(),
        })
    );
    assert!(wait_until(|| harness.session.recording_state()
        == BranchState::NotStarted));
    assert_eq!(harness.session.state(), SessionState::Running);

    // The session can record again after a failed recording
    harness.writer_log.lock().unwrap().fail_on_frame = None;
    harness.session.start_video_recording().wait().unwrap();
}

#[test]
fn test_capture_error_fails_pending_stop() {
    let harness = Harness::running();
    harness.writer_log.lock().unwrap().finalize_delay = Duration::from_millis(300);
    harness.session.start_video_recording().wait().unwrap();
    harness.push(1);

    let stop = harness.session.stop_video_recording();
    harness.source.push_error("sensor fault");

    // Either the error claimed the pending stop first, or the finalize did
    match stop.wait() {
        Err(SessionError::RecordingFailed(reason)) => assert_eq!(reason, "sensor fault"),
        Ok(path) => assert!(path.starts_with(harness.output_dir.path())),
        other => panic!("unexpected stop result {other:?}"),
    }
    assert!(harness.wait_for_state(SessionState::Disposed));
}

#[test]
fn test_raw_container_recording() {
    let factory = Arc::new(|| Box::new(RawContainerWriter::new()) as Box<dyn MediaWriter>);
    let harness = Harness::with_writer_factory(32, 16, factory);
    harness.start();

    harness.session.start_video_recording().wait().unwrap();
    for fill in 0..4 {
        harness.push(fill);
    }
    let path = harness.session.stop_video_recording().wait().unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("raw"));

    let (header, records) = read_raw_container(&path).unwrap();
    assert_eq!(header.format.resolution, Resolution::new(32, 16));
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.kind == RawRecordKind::Video));
    assert!(records.iter().all(|r| r.len == 32 * 16 * 4));
    assert_eq!(records[3].timestamp, Duration::from_millis(120));
}
