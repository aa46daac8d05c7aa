//! Start the bridge and print every telemetry event as a JSON line.
//!
//! Usage: cargo run --example listen -- [teleop.toml] [--arm]

use std::io::{self, Write};
use std::time::Duration;
use teleop_bridge::{BridgeConfig, BridgeError, TelemetryEvent};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let arm = args.iter().any(|a| a == "--arm");
    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => BridgeConfig::load(path),
        None => Ok(BridgeConfig::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Peer:     {}:{}", config.peer_host, config.peer_port);
    eprintln!("Protocol: {:?}", config.protocol);
    eprintln!("Profile:  {}", config.profile);

    let bridge = match teleop_bridge::bridge::start(config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to start bridge: {}", e);
            std::process::exit(1);
        }
    };
    eprintln!("Listening on {} (Ctrl+C to stop)...", bridge.local_addr());

    let handle = bridge.handle();
    let telemetry = handle.subscribe();
    if arm {
        if let Err(e) = handle.arm(true) {
            eprintln!("Arm request failed: {}", e);
        }
    }

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut armed: Option<bool> = None;
    let mut idle_timeouts: u32 = 0;

    loop {
        match telemetry.recv_timeout(Duration::from_secs(2)) {
            Ok(event) => {
                idle_timeouts = 0;
                if let TelemetryEvent::Heartbeat(hb) = &event {
                    if armed != Some(hb.armed) {
                        eprintln!("Vehicle {}", if hb.armed { "ARMED" } else { "DISARMED" });
                        armed = Some(hb.armed);
                    }
                }
                let _ = writeln!(out, "{}", event.to_json());
                let _ = out.flush();
            }
            Err(BridgeError::Timeout) => {
                idle_timeouts += 1;
                eprintln!("No telemetry for 2s (timeout #{})", idle_timeouts);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    bridge.stop();
}
