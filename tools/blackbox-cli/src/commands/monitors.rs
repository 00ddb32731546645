//! List capturable monitors.

use blackbox_capture_engine::backend_by_name;

pub fn run(backend: &str) -> anyhow::Result<()> {
    let backend = backend_by_name(backend)?;
    let monitors = backend.detect_monitors()?;

    if monitors.is_empty() {
        println!("No monitors detected ({} backend).", backend.name());
        return Ok(());
    }

    for (index, monitor) in monitors.iter().enumerate() {
        println!(
            "{}  [--monitor {index}] {}{}",
            monitor.label(index),
            monitor.name,
            if monitor.primary { " (primary)" } else { "" }
        );
    }
    Ok(())
}
