//! WebSocket gateway: UI clients drive the bridge and receive telemetry.
//!
//! Inbound text frames (one JSON object each):
//!   {"type":"hotkeys","command":"FORWARD"}
//!   {"type":"stick","x":0.0,"y":-1.0}
//!   {"type":"arm","armed":true}
//!   {"type":"pulse","command":"UP"}
//!
//! Every telemetry event and command acknowledgment is broadcast to all
//! clients as `{"type": ..., "data": {...}}`.
//!
//! Usage: cargo run --example ws_gateway -- [teleop.toml]

use serde::Deserialize;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teleop_bridge::{BridgeConfig, BridgeError, BridgeHandle, Command, TelemetryStream};
use tungstenite::Message;

const PORT: u16 = 5000;

type WsClient = Arc<Mutex<tungstenite::WebSocket<TcpStream>>>;
type Clients = Arc<Mutex<Vec<WsClient>>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Hotkeys { command: String },
    Stick { x: f32, y: f32 },
    Arm { armed: bool },
    Pulse { command: String },
}

fn main() {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(path),
        None => Ok(BridgeConfig::default()),
    };
    let bridge = match config.and_then(teleop_bridge::bridge::start) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to start bridge: {}", e);
            std::process::exit(1);
        }
    };
    let handle = bridge.handle();

    let clients: Clients = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicBool::new(true));

    let telemetry = handle.subscribe();
    let broadcast_clients = clients.clone();
    let broadcast_running = running.clone();
    let broadcast_thread = std::thread::Builder::new()
        .name("ws-broadcast".into())
        .spawn(move || broadcast_loop(telemetry, broadcast_clients, broadcast_running))
        .unwrap_or_else(|e| {
            eprintln!("Failed to spawn broadcast thread: {}", e);
            std::process::exit(1);
        });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", PORT)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", PORT, e);
        std::process::exit(1);
    });
    eprintln!("[WS] ws://localhost:{} (bridge on {})", PORT, bridge.local_addr());

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[TCP] accept error: {}", e);
                continue;
            }
        };
        let clients = clients.clone();
        let handle = handle.clone();
        std::thread::spawn(move || handle_client(stream, clients, handle));
    }

    running.store(false, Ordering::Relaxed);
    let _ = broadcast_thread.join();
    bridge.stop();
}

/// Accept the handshake, register for broadcast and apply inbound commands
/// until the client goes away.
fn handle_client(stream: TcpStream, clients: Clients, handle: BridgeHandle) {
    // Short read timeout so the broadcast thread can take the lock between reads.
    stream.set_read_timeout(Some(Duration::from_millis(50))).ok();
    stream.set_write_timeout(Some(Duration::from_secs(2))).ok();
    stream.set_nodelay(true).ok();

    let ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("[WS] handshake error: {}", e);
            return;
        }
    };
    let ws = Arc::new(Mutex::new(ws));
    {
        let mut list = clients.lock().unwrap();
        list.push(ws.clone());
        eprintln!("[WS] Client connected ({} total)", list.len());
    }

    loop {
        let msg = ws.lock().unwrap().read();
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = dispatch(&handle, &text) {
                    eprintln!("[WS] rejected {}: {}", text, e);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(_) => break,
        }
    }

    let mut list = clients.lock().unwrap();
    list.retain(|c| !Arc::ptr_eq(c, &ws));
    eprintln!("[WS] Client disconnected ({} total)", list.len());
}

fn dispatch(handle: &BridgeHandle, text: &str) -> teleop_bridge::Result<()> {
    let msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| BridgeError::Transport(format!("bad message: {}", e)))?;
    match msg {
        ClientMessage::Hotkeys { command } => handle.apply_command(command.parse::<Command>()?),
        ClientMessage::Stick { x, y } => handle.apply_stick(x, y),
        ClientMessage::Arm { armed } => handle.arm(armed),
        ClientMessage::Pulse { command } => handle.pulse(command.parse::<Command>()?),
    }
}

/// Forward every telemetry event to every connected client.
fn broadcast_loop(telemetry: TelemetryStream, clients: Clients, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        let event = match telemetry.recv_timeout(Duration::from_secs(1)) {
            Ok(ev) => ev,
            Err(BridgeError::Timeout) => continue,
            Err(e) => {
                eprintln!("[WS] telemetry error: {}", e);
                break;
            }
        };

        let msg = Message::Text(event.to_json());
        let mut list = clients.lock().unwrap();
        list.retain(|ws_arc| {
            let mut ws = ws_arc.lock().unwrap();
            ws.send(msg.clone()).is_ok()
        });
    }
}
