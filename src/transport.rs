use crate::config::BridgeConfig;
use crate::framing::FrameSplitter;
use crate::input::{read_stick, InputEvent, InputNormalizer, NormalizedInput};
use crate::protocol::{self, FrameHeader, Message};
use crate::session::CommandSession;
use crate::telemetry::{TelemetryEvent, TelemetryPublisher};
use crate::types::{Command, CommandSessionState, Stick};
use crate::Result;
use crossbeam_channel::{Receiver, Sender};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Largest UDP payload; anything smaller would truncate datagrams silently.
const MAX_DATAGRAM: usize = 65_535;

/// Reader wake-up period used to poll the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Lifecycle of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Idle = 0,
    /// Socket bound, loop not yet running.
    Connected = 1,
    /// Ticking and receiving.
    Running = 2,
    Closed = 3,
}

/// Transport state shared between the loop thread and the bridge handle.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn get(&self) -> TransportState {
        match self.0.load(Ordering::Acquire) {
            1 => TransportState::Connected,
            2 => TransportState::Running,
            3 => TransportState::Closed,
            _ => TransportState::Idle,
        }
    }

    pub fn set(&self, state: TransportState) {
        let prev = self.0.swap(state as u8, Ordering::AcqRel);
        if prev != state as u8 {
            log::debug!("Transport state -> {:?}", state);
        }
    }
}

/// Everything that reaches the event loop travels as one of these.
pub(crate) enum LoopMessage {
    Command(Command),
    Stick { stick: Stick, x: f32, y: f32 },
    Input(InputEvent),
    Arm(bool),
    Pulse(Command),
    SetProfile {
        name: String,
        reply: Sender<Result<()>>,
    },
    Snapshot(Sender<CommandSessionState>),
    Stats(Sender<LinkStats>),
    Datagram(Vec<u8>),
    Shutdown,
}

/// Link counters kept by the event loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    /// Sends that failed; the loop keeps ticking regardless.
    pub send_errors: u64,
    pub frames_received: u64,
    pub decode_errors: u64,
}

/// Single-threaded owner of the session, normalizer, splitter and the
/// outbound sequence counter.
pub(crate) struct TransportLoop {
    config: BridgeConfig,
    socket: UdpSocket,
    peer: SocketAddr,
    session: CommandSession,
    normalizer: InputNormalizer,
    splitter: FrameSplitter,
    publisher: TelemetryPublisher,
    sequence: u8,
    sent_armed: bool,
    last_heartbeat: Option<Instant>,
    stats: LinkStats,
}

impl TransportLoop {
    pub fn new(
        config: BridgeConfig,
        socket: UdpSocket,
        peer: SocketAddr,
        normalizer: InputNormalizer,
        publisher: TelemetryPublisher,
    ) -> Self {
        let session = CommandSession::new(config.speed, config.yaw_rate);
        Self {
            config,
            socket,
            peer,
            session,
            normalizer,
            splitter: FrameSplitter::new(),
            publisher,
            sequence: 0,
            sent_armed: false,
            last_heartbeat: None,
            stats: LinkStats::default(),
        }
    }

    /// Run until a `Shutdown` message arrives or every sender is gone.
    pub fn run(mut self, rx: Receiver<LoopMessage>, state: SharedState) {
        let ticker = crossbeam_channel::tick(self.config.tick_interval());
        state.set(TransportState::Running);
        log::info!(
            "Transport running: sending to {} every {:?} ({:?})",
            self.peer,
            self.config.tick_interval(),
            self.config.protocol
        );

        loop {
            crossbeam_channel::select! {
                recv(rx) -> msg => match msg {
                    Ok(LoopMessage::Shutdown) | Err(_) => break,
                    Ok(msg) => self.handle(msg),
                },
                recv(ticker) -> _ => self.on_tick(),
            }
        }

        state.set(TransportState::Closed);
        log::info!(
            "Transport stopped: {} frames sent ({} send errors), {} received ({} decode errors)",
            self.stats.frames_sent,
            self.stats.send_errors,
            self.stats.frames_received,
            self.stats.decode_errors
        );
    }

    fn next_header(&mut self) -> FrameHeader {
        let header = self.config.frame_header(self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Send one encoded frame. Failures are logged and counted only.
    fn send(&mut self, frame: &[u8]) -> bool {
        match self.socket.send_to(frame, self.peer) {
            Ok(_) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                self.stats.send_errors += 1;
                log::warn!("Send to {} failed: {}", self.peer, e);
                false
            }
        }
    }

    fn on_tick(&mut self) {
        let state = self.session.snapshot();
        let target = self.config.target();

        if state.armed != self.sent_armed {
            let header = self.next_header();
            let frame = protocol::encode_arm_disarm(state.armed, &header, &target);
            if self.send(&frame) {
                log::info!("Sent {}", if state.armed { "ARM" } else { "DISARM" });
                self.sent_armed = state.armed;
            }
        }

        if let Some(interval) = self.config.heartbeat_interval() {
            let due = self.last_heartbeat.map_or(true, |t| t.elapsed() >= interval);
            if due {
                let header = self.next_header();
                let frame = protocol::encode_heartbeat(&header);
                self.send(&frame);
                self.last_heartbeat = Some(Instant::now());
            }
        }

        let header = self.next_header();
        let frame = protocol::encode_session(&state, &header, &target);
        if self.send(&frame) {
            log::trace!(
                "seq={} vx={:+.2} vy={:+.2} vz={:+.2} yaw_rate={:+.2}",
                header.sequence,
                state.velocity_x,
                state.velocity_y,
                state.velocity_z,
                state.yaw_rate
            );
        }
    }

    fn handle(&mut self, msg: LoopMessage) {
        match msg {
            LoopMessage::Command(cmd) => self.apply_command(cmd),
            LoopMessage::Stick { stick, x, y } => {
                let reading = read_stick(x, y, self.config.deadzone);
                self.apply_normalized(NormalizedInput::Stick { stick, reading });
            }
            LoopMessage::Input(event) => {
                for out in self.normalizer.handle(event) {
                    self.apply_normalized(out);
                }
            }
            LoopMessage::Arm(armed) => self.session.set_armed(armed),
            LoopMessage::Pulse(cmd) => self.pulse(cmd),
            LoopMessage::SetProfile { name, reply } => {
                let result = self.config.profile_named(&name).map(|profile| {
                    if let Some(out) = self.normalizer.set_profile(profile) {
                        self.apply_normalized(out);
                    }
                });
                match &result {
                    Ok(()) => log::info!("Active profile: {}", self.normalizer.profile().name()),
                    Err(e) => log::warn!("Profile change rejected: {}", e),
                }
                let _ = reply.send(result);
            }
            LoopMessage::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            LoopMessage::Stats(reply) => {
                let _ = reply.send(self.stats);
            }
            LoopMessage::Datagram(bytes) => self.on_datagram(&bytes),
            LoopMessage::Shutdown => {}
        }
    }

    fn apply_normalized(&mut self, out: NormalizedInput) {
        match out {
            NormalizedInput::Command(cmd) => self.apply_command(cmd),
            NormalizedInput::Released => self.session.stop(),
            NormalizedInput::Stick { stick, reading } => {
                log::debug!("{:?} stick {}", stick, reading.direction);
                self.session.apply_stick(stick, reading.vector)
            }
        }
    }

    fn apply_command(&mut self, cmd: Command) {
        let event = if cmd == Command::ToggleHotkeys {
            if let Some(out) = self.normalizer.toggle_enabled() {
                self.apply_normalized(out);
            }
            let enabled = self.normalizer.hotkeys_enabled();
            TelemetryEvent::local_ack(
                cmd,
                true,
                format!("Hotkeys {}", if enabled { "enabled" } else { "disabled" }),
            )
        } else if cmd.is_motion() {
            self.session.apply(cmd);
            TelemetryEvent::local_ack(cmd, true, format!("Command {} executed", cmd))
        } else {
            TelemetryEvent::local_ack(cmd, false, format!("Command {} has no vehicle action", cmd))
        };
        log::debug!("{}", event.to_json());
        self.publisher.publish(&event);
    }

    /// Send a one-shot frame for `cmd` right away. The next tick resends
    /// the session state, which stops the pulse if the session is idle.
    fn pulse(&mut self, cmd: Command) {
        let header = self.next_header();
        let target = self.config.target();
        match protocol::encode_command(cmd, self.config.speed, &header, &target) {
            Some(frame) => {
                let sent = self.send(&frame);
                self.publisher.publish(&TelemetryEvent::local_ack(
                    cmd,
                    sent,
                    format!("Pulse {} {}", cmd, if sent { "sent" } else { "failed" }),
                ));
            }
            None => {
                // Nothing encoded, give the sequence number back.
                self.sequence = header.sequence;
                self.publisher.publish(&TelemetryEvent::local_ack(
                    cmd,
                    false,
                    format!("Command {} has no vehicle action", cmd),
                ));
            }
        }
    }

    fn on_datagram(&mut self, bytes: &[u8]) {
        self.splitter.push(bytes);
        while let Some(result) = self.splitter.next_frame() {
            let frame = match result {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.decode_errors += 1;
                    log::warn!("Decode error: {}", e);
                    continue;
                }
            };
            self.stats.frames_received += 1;

            match protocol::parse(&frame) {
                Ok(Message::Unknown { msg_id, payload }) => {
                    log::trace!(
                        "Ignoring msg {} ({} bytes) from {}/{}",
                        msg_id,
                        payload.len(),
                        frame.system_id,
                        frame.component_id
                    );
                }
                Ok(msg) => match TelemetryEvent::from_message(&msg) {
                    Some(event) => self.publisher.publish(&event),
                    None => log::trace!("Not publishing {:?}", msg),
                },
                Err(e) => {
                    self.stats.decode_errors += 1;
                    log::warn!("Decode error: {}", e);
                }
            }
        }
    }
}

/// Blocking receive loop. Runs in its own thread and forwards every
/// datagram into the event loop channel.
pub(crate) fn reader_loop(socket: UdpSocket, sender: Sender<LoopMessage>, stop_flag: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    if let Err(e) = socket.set_read_timeout(Some(READ_TIMEOUT)) {
        log::warn!("Failed to set read timeout: {}", e);
    }
    log::info!("Telemetry reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Telemetry reader stopping (stop flag set)");
            break;
        }

        let len = match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                log::trace!("{} bytes from {}", n, from);
                n
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => {
                log::warn!("Receive error: {}", e);
                std::thread::sleep(READ_TIMEOUT);
                continue;
            }
        };

        if sender.send(LoopMessage::Datagram(buf[..len].to_vec())).is_err() {
            log::info!("Event loop gone, stopping reader");
            break;
        }
    }
}
