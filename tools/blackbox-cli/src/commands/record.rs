//! Run the rolling recorder until Ctrl+C.

use anyhow::Context;
use blackbox_capture_engine::{
    backend_by_name, encoder_by_name, RecorderBackends, RecorderEvent, RecordingConfig,
    SegmentRecorder, SessionPhase,
};
use blackbox_common::config::RecordingDefaults;

pub async fn run(
    defaults: RecordingDefaults,
    backend: &str,
    encoder: &str,
    json: bool,
) -> anyhow::Result<()> {
    let config = RecordingConfig::from_defaults(&defaults);
    let backend = backend_by_name(backend)?;
    let encoders = encoder_by_name(encoder)?;

    println!("Starting rolling recording");
    println!("  Output:   {}", config.output_dir.display());
    println!("  Monitor:  {}", config.monitor_index);
    println!("  FPS:      {}", config.fps);
    println!("  Segment:  {}s ({})", config.segment_duration_secs, config.codec);
    println!("  Keep:     {} files", config.retention_cap);
    println!("  Backend:  {} / {}", backend.name(), encoders.name());
    println!();

    let mut recorder = SegmentRecorder::new(RecorderBackends::system(backend, encoders));
    let mut events = recorder
        .take_events()
        .context("Recorder event stream already taken")?;
    let mut status = recorder.watch_status();

    recorder.start(config)?;
    println!("Press Ctrl+C to stop recording...");
    println!();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_phase = SessionPhase::Starting;

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                println!();
                recorder.stop();
                println!("{}", recorder.status());
                break;
            }
            Some(event) = events.recv() => print_event(&event, json)?,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                if snapshot.phase != last_phase {
                    tracing::debug!(from = %last_phase, to = %snapshot.phase, "Phase changed");
                    last_phase = snapshot.phase;
                }
                if !snapshot.phase.is_active() {
                    break;
                }
            }
        }
    }

    let (recorder, summary) = tokio::task::spawn_blocking(move || {
        let summary = recorder.wait();
        (recorder, summary)
    })
    .await
    .context("Recorder shutdown task failed")?;

    while let Ok(event) = events.try_recv() {
        print_event(&event, json)?;
    }

    let status = recorder.status();
    println!("{status}");

    let Some(summary) = summary else {
        anyhow::bail!("Recorder thread exited unexpectedly");
    };
    println!(
        "Segments recorded: {}, files deleted: {}",
        summary.segments.len(),
        summary.deleted.len()
    );
    if summary.final_phase == SessionPhase::Failed {
        anyhow::bail!(
            "Recording failed: {}",
            summary.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

fn print_event(event: &RecorderEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        RecorderEvent::SegmentCreated {
            file_name,
            frames,
            ended_early,
        } => println!(
            "Recording saved: {file_name} ({frames} frames{})",
            if *ended_early { ", ended early" } else { "" }
        ),
        RecorderEvent::FilesDeleted { files } => println!("Deleted: {}", files.join(", ")),
        RecorderEvent::SegmentError { file_name, message } => match file_name {
            Some(name) => println!("Error in {name}: {message}"),
            None => println!("Error: {message}"),
        },
    }
    Ok(())
}
