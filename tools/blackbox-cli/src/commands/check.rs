//! Check system capabilities.

use std::process::{Command, Stdio};

use blackbox_capture_engine::encoder::available_encoders;
use blackbox_capture_engine::source::available_backends;
use blackbox_platform::{detect_display_server, detect_monitors, DisplayServer};

fn tool_available(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn run() -> anyhow::Result<()> {
    println!("Blackbox System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;

    match detect_display_server() {
        DisplayServer::X11 => println!("[OK] Display server: X11"),
        DisplayServer::Wayland => {
            println!("[WARN] Display server: Wayland (x11grab only sees XWayland windows)")
        }
        DisplayServer::Unknown => {
            ready = false;
            println!("[FAIL] Display server: Unknown (is DISPLAY set?)");
        }
    }

    if tool_available("ffmpeg", "-version") {
        println!("[OK] ffmpeg found");
    } else {
        ready = false;
        println!("[FAIL] ffmpeg not found on PATH (required for x11grab capture and encoding)");
    }

    if tool_available("xrandr", "--version") {
        match detect_monitors() {
            Ok(monitors) => {
                println!("[OK] Monitors detected: {}", monitors.len());
                for (index, m) in monitors.iter().enumerate() {
                    println!(
                        "     {} {}{}",
                        m.label(index),
                        m.name,
                        if m.primary { " (primary)" } else { "" }
                    );
                }
            }
            Err(e) => {
                ready = false;
                println!("[FAIL] Monitor detection: {e}");
            }
        }
    } else {
        ready = false;
        println!("[FAIL] xrandr not found on PATH (required for monitor detection)");
    }

    println!();
    println!("Capture backends: {}", available_backends().join(", "));
    println!("Encoders:         {}", available_encoders().join(", "));

    println!();
    if ready {
        println!("All required capabilities are available. Blackbox is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }
    Ok(())
}
