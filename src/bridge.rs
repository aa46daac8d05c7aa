use crate::config::BridgeConfig;
use crate::input::{InputEvent, InputNormalizer};
use crate::telemetry::{TelemetryPublisher, TelemetryStream, DEFAULT_SUBSCRIBER_CAPACITY};
use crate::transport::{self, LinkStats, LoopMessage, SharedState, TransportLoop, TransportState};
use crate::types::{Command, CommandSessionState, Stick};
use crate::{BridgeError, Result};
use crossbeam_channel::Sender;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long handle queries wait for the loop to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Validate `config`, bind the local socket and start the bridge threads.
pub fn start(config: BridgeConfig) -> Result<Bridge> {
    Bridge::start(config)
}

/// A running bridge: the event loop thread plus the telemetry reader.
///
/// Dropping the bridge stops both threads.
pub struct Bridge {
    handle: BridgeHandle,
    local_addr: SocketAddr,
    state: SharedState,
    stop_flag: Arc<AtomicBool>,
    loop_thread: Option<JoinHandle<()>>,
    reader_thread: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Start the bridge.
    ///
    /// Returns `Config` for an invalid address or profile and `Io` if the
    /// local bind fails.
    pub fn start(config: BridgeConfig) -> Result<Bridge> {
        config.validate()?;
        let peer = config.peer_addr()?;
        let normalizer = InputNormalizer::new(config.binding_profile()?, config.deadzone);

        let state = SharedState::default();
        let socket = UdpSocket::bind(config.bind_addr()?)?;
        let local_addr = socket.local_addr()?;
        let reader_socket = socket.try_clone()?;
        state.set(TransportState::Connected);
        log::info!("Bound {} (peer {})", local_addr, peer);

        let (tx, rx) = crossbeam_channel::unbounded();
        let publisher = TelemetryPublisher::new();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let reader_tx = tx.clone();
        let reader_stop = stop_flag.clone();
        let reader_thread = std::thread::Builder::new()
            .name("teleop-reader".into())
            .spawn(move || transport::reader_loop(reader_socket, reader_tx, reader_stop))
            .map_err(|e| BridgeError::Transport(format!("Failed to spawn reader thread: {}", e)))?;

        let event_loop = TransportLoop::new(config, socket, peer, normalizer, publisher.clone());
        let loop_state = state.clone();
        let loop_thread = match std::thread::Builder::new()
            .name("teleop-loop".into())
            .spawn(move || event_loop.run(rx, loop_state))
        {
            Ok(thread) => thread,
            Err(e) => {
                stop_flag.store(true, Ordering::Relaxed);
                let _ = reader_thread.join();
                return Err(BridgeError::Transport(format!(
                    "Failed to spawn event loop thread: {}",
                    e
                )));
            }
        };

        Ok(Bridge {
            handle: BridgeHandle { tx, publisher },
            local_addr,
            state,
            stop_flag,
            loop_thread: Some(loop_thread),
            reader_thread: Some(reader_thread),
        })
    }

    /// A cloneable handle for operator connections.
    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Address telemetry is received on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> TransportState {
        self.state.get()
    }

    /// Shorthand for `handle().subscribe()`.
    pub fn subscribe(&self) -> TelemetryStream {
        self.handle.subscribe()
    }

    /// Stop the bridge and wait for its threads to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.handle.tx.send(LoopMessage::Shutdown);
        if let Some(thread) = self.loop_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.reader_thread.take() {
            let _ = thread.join();
        }
        self.state.set(TransportState::Closed);
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable entry point into the event loop.
///
/// Every call is queued on the loop channel and applied in arrival order,
/// so concurrent operators resolve as last write wins.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: Sender<LoopMessage>,
    publisher: TelemetryPublisher,
}

impl BridgeHandle {
    fn send(&self, msg: LoopMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| BridgeError::Stopped)
    }

    /// Apply a discrete command. A local acknowledgment is published.
    pub fn apply_command(&self, command: Command) -> Result<()> {
        self.send(LoopMessage::Command(command))
    }

    /// Apply a raw left-stick reading; the deadzone is applied by the loop.
    pub fn apply_stick(&self, x: f32, y: f32) -> Result<()> {
        self.apply_stick_on(Stick::Left, x, y)
    }

    pub fn apply_stick_on(&self, stick: Stick, x: f32, y: f32) -> Result<()> {
        self.send(LoopMessage::Stick { stick, x, y })
    }

    /// Feed a raw key, gamepad or focus event through the input normalizer.
    pub fn apply_input(&self, event: InputEvent) -> Result<()> {
        self.send(LoopMessage::Input(event))
    }

    /// Request arming or disarming. The command goes out on the next tick.
    pub fn arm(&self, armed: bool) -> Result<()> {
        self.send(LoopMessage::Arm(armed))
    }

    /// Send a single frame for `command` immediately, outside the tick.
    pub fn pulse(&self, command: Command) -> Result<()> {
        self.send(LoopMessage::Pulse(command))
    }

    /// Switch the active binding profile.
    pub fn set_profile(&self, name: &str) -> Result<()> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(LoopMessage::SetProfile {
            name: name.to_string(),
            reply,
        })?;
        rx.recv_timeout(REPLY_TIMEOUT).map_err(reply_error)?
    }

    /// Current session state, after every call queued before this one.
    pub fn snapshot(&self) -> Result<CommandSessionState> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(LoopMessage::Snapshot(reply))?;
        rx.recv_timeout(REPLY_TIMEOUT).map_err(reply_error)
    }

    /// Frame and error counters of the link.
    pub fn link_stats(&self) -> Result<LinkStats> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(LoopMessage::Stats(reply))?;
        rx.recv_timeout(REPLY_TIMEOUT).map_err(reply_error)
    }

    pub fn subscribe(&self) -> TelemetryStream {
        self.publisher.subscribe(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

fn reply_error(e: crossbeam_channel::RecvTimeoutError) -> BridgeError {
    match e {
        crossbeam_channel::RecvTimeoutError::Timeout => BridgeError::Timeout,
        crossbeam_channel::RecvTimeoutError::Disconnected => BridgeError::ChannelDisconnected,
    }
}
