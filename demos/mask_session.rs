//! Massage session example
//!
//! Demonstrates a complete session:
//! - Connecting to the mask
//! - Starting a pattern with a timer
//! - Watching status updates and the timer completing
//! - Stopping the session
//!
//! Run with: cargo run --example mask_session
//!
//! To choose the pattern, intensity and duration:
//!   cargo run --example mask_session -- --mode 2 --intensity 60 --minutes 5

use smart_mask_ble::{format_time_left, Error, EventKind, MaskController, MaskEvent, MaskMode, Result};
use std::time::Duration;

fn arg<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> T {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,smart_mask_ble=debug")
        .init();

    println!("Massage Mask Session");
    println!("====================\n");

    let args: Vec<String> = std::env::args().collect();
    let raw_mode: u8 = arg(&args, "--mode", 1);
    let intensity: u8 = arg(&args, "--intensity", 50);
    let minutes: u32 = arg(&args, "--minutes", 1);

    let mode = MaskMode::from_raw(raw_mode).ok_or_else(|| Error::InvalidParameter {
        name: "mode".to_string(),
        value: raw_mode.to_string(),
    })?;

    let controller = MaskController::new().await?;

    let _timer = controller.on(EventKind::TimerComplete, |_| {
        println!("\n>>> Timer complete");
    });

    println!("Scanning for mask...");
    controller.connect().await?;
    println!("Connected.\n");

    println!(
        "Starting {} at {}% for {} minute(s)",
        mode.label(),
        intensity,
        minutes
    );
    controller.set_mode(mode, intensity).await?;
    controller.set_timer(minutes * 60).await?;

    let mut events = controller.subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(u64::from(minutes) * 60 + 10);

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        };

        match event {
            Ok(MaskEvent::StatusUpdated(session)) => {
                println!(
                    "  {:<10} intensity {:>3}%  left {:>6}  battery {:>3}%",
                    session
                        .pattern()
                        .map(|p| p.label().to_string())
                        .unwrap_or_else(|| format!("mode {}", session.mode)),
                    session.intensity,
                    format_time_left(session.time_left),
                    session.battery
                );
            }
            Ok(MaskEvent::Error { kind, message }) => println!("  error ({:?}): {}", kind, message),
            Ok(MaskEvent::TimerComplete) | Ok(MaskEvent::Disconnected) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    if controller.is_connected() {
        println!("\nStopping session");
        controller.stop_session().await?;
    }

    controller.shutdown().await?;
    println!("Done.");
    Ok(())
}
