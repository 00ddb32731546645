mod common;

use std::sync::Arc;
use std::time::Duration;

use blackbox_capture_engine::frame::PixelFormat;
use blackbox_capture_engine::{RecorderEvent, SessionPhase};
use blackbox_common::clock::SimulatedClock;
use blackbox_common::error::BlackboxError;

use common::{config, drain_events, gate, monitor, regular_files, Harness, ScriptedSource};

fn sim_clock() -> Arc<SimulatedClock> {
    Arc::new(SimulatedClock::default())
}

#[test]
fn stop_right_after_start_leaves_one_segment() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let (gate, handle) = gate();
    let source = ScriptedSource::new(clock.clone()).gate_on(1, gate);
    let mut h = Harness::new(
        vec![monitor(32, 18)],
        clock,
        source,
        common::FakeEncoderFactory::new(PixelFormat::Bgra),
    );

    h.recorder.start(config(dir.path(), 60, 15, 30)).unwrap();
    handle.wait_entered();
    h.recorder.stop();
    handle.open();

    let summary = h.recorder.wait().unwrap();
    assert_eq!(summary.final_phase, SessionPhase::Stopped);
    assert_eq!(summary.segments.len(), 1);
    let segment = &summary.segments[0];
    assert_eq!(segment.frames, 1);
    assert!(segment.ended_early);
    assert!(segment.error.is_none());

    assert_eq!(regular_files(dir.path()), vec![segment.file_name.clone()]);
    assert_eq!(h.recorder.created_files(), vec![segment.file_name.clone()]);
    assert!(h.recorder.deleted_files().is_empty());
    assert_eq!(h.recorder.status().phase, SessionPhase::Stopped);
}

#[test]
fn four_segments_with_cap_three_deletes_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let source = ScriptedSource::new(clock.clone());
    let mut h = Harness::new(
        vec![monitor(1920, 1080)],
        clock,
        source,
        common::FakeEncoderFactory::new(PixelFormat::Bgra),
    );
    h.stop_after_segment(3);
    let mut events = h.recorder.take_events().unwrap();

    h.recorder.start(config(dir.path(), 5, 10, 3)).unwrap();
    let summary = h.recorder.wait().unwrap();

    assert_eq!(summary.final_phase, SessionPhase::Stopped);
    assert_eq!(summary.segments.len(), 4);
    assert!(summary.segments.iter().all(|s| s.frames == 50 && !s.ended_early));

    let created = h.recorder.created_files();
    assert_eq!(created.len(), 4);
    assert_eq!(h.recorder.deleted_files(), vec![created[0].clone()]);
    assert_eq!(regular_files(dir.path()), created[1..].to_vec());
    assert_eq!(h.encoders.max_concurrent(), 1);

    // Deletion is reported after the file's own creation.
    let events = drain_events(&mut events);
    let created_at = events
        .iter()
        .position(|e| matches!(e, RecorderEvent::SegmentCreated { file_name, .. } if *file_name == created[0]))
        .unwrap();
    let deleted_at = events
        .iter()
        .position(|e| matches!(e, RecorderEvent::FilesDeleted { files } if files == &vec![created[0].clone()]))
        .unwrap();
    assert!(created_at < deleted_at);
}

#[test]
fn capture_error_finalizes_partial_segment_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let source = ScriptedSource::new(clock.clone()).fail_on(&[20]);
    let mut h = Harness::new(
        vec![monitor(1920, 1080)],
        clock,
        source,
        common::FakeEncoderFactory::new(PixelFormat::Bgra),
    );
    h.stop_after_segment(1);
    let mut events = h.recorder.take_events().unwrap();

    h.recorder.start(config(dir.path(), 10, 10, 30)).unwrap();
    let summary = h.recorder.wait().unwrap();

    assert_eq!(summary.final_phase, SessionPhase::Stopped);
    assert_eq!(summary.segments.len(), 2);
    assert_eq!(summary.segments[0].frames, 19);
    assert!(summary.segments[0].ended_early);
    assert!(summary.segments[0]
        .error
        .as_deref()
        .unwrap()
        .contains("scripted failure on grab 20"));
    assert_eq!(summary.segments[1].frames, 100);
    assert!(summary.segments[1].error.is_none());

    let events = drain_events(&mut events);
    assert!(events.contains(&RecorderEvent::SegmentCreated {
        file_name: summary.segments[0].file_name.clone(),
        frames: 19,
        ended_early: true,
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        RecorderEvent::SegmentError { file_name: Some(name), .. } if *name == summary.segments[0].file_name
    )));
    assert_eq!(regular_files(dir.path()).len(), 2);
}

#[test]
fn stop_during_frame_write_completes_frame_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let source = ScriptedSource::new(clock.clone());
    let encoders = common::FakeEncoderFactory::new(PixelFormat::Bgr24);
    let (gate, handle) = gate();
    encoders.on_write(move |segment, frames| {
        if segment == 0 && frames == 3 {
            gate.pass(frames);
        }
    });
    let mut h = Harness::new(vec![monitor(16, 16)], clock, source, encoders);

    h.recorder.start(config(dir.path(), 60, 15, 30)).unwrap();
    assert_eq!(handle.wait_entered(), 3);

    h.recorder.stop();
    assert!(h.recorder.status().stop_requested);
    assert_eq!(h.recorder.status().to_string(), "Stopping recording...");
    let err = h
        .recorder
        .start(config(dir.path(), 60, 15, 30))
        .unwrap_err();
    assert!(matches!(err, BlackboxError::Session { .. }));
    handle.open();

    let summary = h.recorder.wait().unwrap();
    assert_eq!(summary.final_phase, SessionPhase::Stopped);
    assert_eq!(summary.segments.len(), 1);
    assert_eq!(summary.segments[0].frames, 3);
    assert_eq!(h.encoders.opened(), 1);
    assert_eq!(regular_files(dir.path()).len(), 1);
    assert!(h.recorder.status().to_string().starts_with("Recording saved: recording_"));
}

#[test]
fn ten_minute_segment_keeps_cadence_under_latency() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let source = ScriptedSource::new(clock.clone()).latency(Duration::from_millis(11));
    let encoders = common::FakeEncoderFactory::new(PixelFormat::Bgra);
    let mut h = Harness::new(vec![monitor(8, 8)], clock, source, encoders);
    h.stop_after_segment(0);

    h.recorder.start(config(dir.path(), 600, 30, 30)).unwrap();
    let summary = h.recorder.wait().unwrap();

    let frames = summary.segments[0].frames;
    assert!((17_999..=18_001).contains(&frames), "wrote {frames} frames");
    assert!(!summary.segments[0].ended_early);
}

#[test]
fn invalid_config_never_launches_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let clock = sim_clock();
    let mut h = Harness::new(
        vec![monitor(1920, 1080)],
        clock.clone(),
        ScriptedSource::new(clock),
        common::FakeEncoderFactory::new(PixelFormat::Bgra),
    );

    let mut bad_index = config(&out, 5, 10, 3);
    bad_index.monitor_index = 1;
    let err = h.recorder.start(bad_index).unwrap_err();
    assert!(matches!(err, BlackboxError::Config { .. }));

    let err = h.recorder.start(config(&out, 0, 10, 3)).unwrap_err();
    assert!(matches!(err, BlackboxError::Config { .. }));

    assert!(!h.recorder.is_running());
    assert!(h.recorder.wait().is_none());
    assert_eq!(h.recorder.status().phase, SessionPhase::Idle);
    assert!(!out.exists());
}

#[test]
fn unusable_output_dir_fails_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let clock = sim_clock();
    let mut h = Harness::new(
        vec![monitor(64, 64)],
        clock.clone(),
        ScriptedSource::new(clock),
        common::FakeEncoderFactory::new(PixelFormat::Bgra),
    );

    h.recorder.start(config(&blocker, 5, 10, 3)).unwrap();
    let summary = h.recorder.wait().unwrap();

    assert_eq!(summary.final_phase, SessionPhase::Failed);
    assert!(summary.segments.is_empty());
    let status = h.recorder.status();
    assert_eq!(status.phase, SessionPhase::Failed);
    assert!(status
        .last_error
        .as_deref()
        .unwrap()
        .contains("Cannot create output directory"));
    assert_eq!(h.encoders.opened(), 0);
}

#[test]
fn vanished_monitor_skips_segment_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let mut h = Harness::new(
        vec![monitor(32, 32)],
        clock.clone(),
        ScriptedSource::new(clock),
        common::FakeEncoderFactory::new(PixelFormat::Bgra),
    );
    let backend = h.backend.clone();
    h.encoders.on_finish(move |segment| {
        if segment == 0 {
            backend.set_monitors(Vec::new());
        }
    });
    let mut events = h.recorder.take_events().unwrap();

    h.recorder.start(config(dir.path(), 1, 5, 30)).unwrap();
    let missing = loop {
        match events.blocking_recv() {
            Some(RecorderEvent::SegmentError {
                file_name: None,
                message,
            }) => break message,
            Some(_) => continue,
            None => panic!("event channel closed"),
        }
    };
    assert!(missing.contains("Invalid monitor index 0"));
    assert!(h.recorder.is_running());

    h.recorder.stop();
    let summary = h.recorder.wait().unwrap();
    assert_eq!(summary.final_phase, SessionPhase::Stopped);
    assert_eq!(summary.segments.len(), 1);
    assert_eq!(h.encoders.opened(), 1);
}

#[test]
fn disk_full_behind_broken_pipe_fails_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let clock = sim_clock();
    let encoders = common::FakeEncoderFactory::new(PixelFormat::Bgra);
    encoders.disk_full_after(4);
    let mut h = Harness::new(
        vec![monitor(64, 64)],
        clock.clone(),
        ScriptedSource::new(clock),
        encoders,
    );
    let mut events = h.recorder.take_events().unwrap();

    h.recorder.start(config(dir.path(), 10, 10, 30)).unwrap();
    let summary = h.recorder.wait().unwrap();

    assert_eq!(summary.final_phase, SessionPhase::Failed);
    assert_eq!(summary.segments.len(), 1);
    assert_eq!(summary.segments[0].frames, 4);
    assert!(summary.error.as_deref().unwrap().contains("Disk full"));
    assert_eq!(h.encoders.opened(), 1);

    let status = h.recorder.status();
    assert_eq!(status.phase, SessionPhase::Failed);
    assert!(status.last_error.as_deref().unwrap().contains("Disk full"));

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        RecorderEvent::SegmentError { message, .. } if message.contains("Disk full")
    )));
}

#[cfg(unix)]
#[test]
fn ffmpeg_reporting_no_space_fails_the_session() {
    use std::os::unix::fs::PermissionsExt;

    use blackbox_capture_engine::encoder::FfmpegEncoderFactory;
    use blackbox_capture_engine::RecorderBackends;
    use blackbox_capture_engine::SegmentRecorder;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("ffmpeg-disk-full.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\nhead -c 100 >/dev/null\necho 'av_interleaved_write_frame(): No space left on device' >&2\nexit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let out = dir.path().join("out");

    blackbox_common::logging::init_default_logging();
    let clock = sim_clock();
    let backend = common::FakeBackend::new(
        vec![monitor(1024, 512)],
        ScriptedSource::new(clock.clone()),
    );
    let mut recorder = SegmentRecorder::new(RecorderBackends {
        capture: backend,
        encoders: Arc::new(FfmpegEncoderFactory::with_binary(
            script.to_string_lossy().into_owned(),
        )),
        clock,
    });

    recorder.start(config(&out, 60, 15, 30)).unwrap();
    let summary = recorder.wait().unwrap();

    assert_eq!(summary.final_phase, SessionPhase::Failed);
    assert_eq!(summary.segments.len(), 1);
    assert!(summary
        .error
        .as_deref()
        .unwrap()
        .contains("Disk full while writing"));
}
