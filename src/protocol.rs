//! MAVLink-framed command/telemetry codec.
//!
//! Pure functions only: nothing here touches a socket or keeps state
//! between calls. The caller owns the sequence counter.

use crate::error::DecodeError;
use crate::types::{
    Attitude, Command, CommandAck, CommandLong, CommandSessionState, GlobalPosition,
    ProtocolVariant, TelemetryFrame, TypeMask, VelocityTarget,
};

// -- Framing --
pub const STX_LEGACY: u8 = 0xFE;
pub const STX_V2: u8 = 0xFD;
pub const HEADER_LEN_LEGACY: usize = 6;
pub const HEADER_LEN_V2: usize = 10;
pub const CHECKSUM_LEN: usize = 2;
pub const SIGNATURE_LEN: usize = 13;
pub const INCOMPAT_SIGNED: u8 = 0x01;

// -- Message ids --
pub const MSG_HEARTBEAT: u32 = 0;
pub const MSG_ATTITUDE: u32 = 30;
pub const MSG_GLOBAL_POSITION_INT: u32 = 33;
pub const MSG_COMMAND_LONG: u32 = 76;
pub const MSG_COMMAND_ACK: u32 = 77;
pub const MSG_SET_POSITION_TARGET_LOCAL_NED: u32 = 84;

// -- Payload sizes (base message, no v2 extensions) --
pub const HEARTBEAT_LEN: usize = 9;
pub const ATTITUDE_LEN: usize = 28;
pub const GLOBAL_POSITION_INT_LEN: usize = 28;
pub const COMMAND_LONG_LEN: usize = 33;
pub const COMMAND_ACK_LEN: usize = 3;
pub const SET_POSITION_TARGET_LEN: usize = 53;

// -- Enum values used by the bridge --
pub const MAV_FRAME_LOCAL_NED: u8 = 1;
pub const MAV_CMD_COMPONENT_ARM_DISARM: u16 = 400;
pub const MAV_TYPE_GCS: u8 = 6;
pub const MAV_AUTOPILOT_INVALID: u8 = 8;
pub const MAV_STATE_ACTIVE: u8 = 4;
pub const MAV_MODE_FLAG_SAFETY_ARMED: u8 = 0x80;
pub const MAVLINK_VERSION: u8 = 3;

/// Per-message seed byte mixed into the checksum, or `None` for ids this
/// codec does not know (such frames cannot be validated).
pub fn crc_extra(msg_id: u32) -> Option<u8> {
    match msg_id {
        MSG_HEARTBEAT => Some(50),
        MSG_ATTITUDE => Some(39),
        MSG_GLOBAL_POSITION_INT => Some(104),
        MSG_COMMAND_LONG => Some(152),
        MSG_COMMAND_ACK => Some(143),
        MSG_SET_POSITION_TARGET_LOCAL_NED => Some(143),
        _ => None,
    }
}

fn payload_len(msg_id: u32) -> Option<usize> {
    match msg_id {
        MSG_HEARTBEAT => Some(HEARTBEAT_LEN),
        MSG_ATTITUDE => Some(ATTITUDE_LEN),
        MSG_GLOBAL_POSITION_INT => Some(GLOBAL_POSITION_INT_LEN),
        MSG_COMMAND_LONG => Some(COMMAND_LONG_LEN),
        MSG_COMMAND_ACK => Some(COMMAND_ACK_LEN),
        MSG_SET_POSITION_TARGET_LOCAL_NED => Some(SET_POSITION_TARGET_LEN),
        _ => None,
    }
}

/// Feed one byte into a CRC-16/MCRF4XX (X.25) accumulator.
#[inline]
pub fn crc_accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

/// CRC-16/MCRF4XX over `data`, starting from 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &b| crc_accumulate(b, crc))
}

/// Frame checksum: CRC over everything after the start byte, then the
/// message's CRC_EXTRA.
pub fn frame_checksum(header_and_payload: &[u8], extra: u8) -> u16 {
    crc_accumulate(extra, crc16(header_and_payload))
}

/// Header fields the caller controls when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub variant: ProtocolVariant,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
}

/// Addressee of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

/// A complete, checksum-verified (when the id is known) inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub variant: ProtocolVariant,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub msg_id: u32,
    pub payload: Vec<u8>,
}

/// Parsed payload of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat(TelemetryFrame),
    Attitude(Attitude),
    GlobalPosition(GlobalPosition),
    CommandAck(CommandAck),
    CommandLong(CommandLong),
    VelocityTarget(VelocityTarget),
    /// Message id this codec has no layout for.
    Unknown { msg_id: u32, payload: Vec<u8> },
}

/// Wrap a serialized payload in a frame of the header's protocol revision.
///
/// Layout (legacy): `[0xFE, len, seq, sys, comp, msgid, payload..., crc_lo, crc_hi]`
/// Layout (v2):     `[0xFD, len, incompat, compat, seq, sys, comp, msgid x3 LE, payload..., crc_lo, crc_hi]`
///
/// V2 payloads have trailing zero bytes stripped (the first byte is always kept).
pub fn encode_frame(header: &FrameHeader, msg_id: u32, payload: &[u8]) -> Vec<u8> {
    let payload = match header.variant {
        ProtocolVariant::Legacy => payload,
        ProtocolVariant::V2 => {
            let end = payload
                .iter()
                .rposition(|&b| b != 0)
                .map_or(1, |i| i + 1)
                .min(payload.len());
            &payload[..end]
        }
    };
    debug_assert!(payload.len() <= u8::MAX as usize);

    let mut buf = Vec::with_capacity(HEADER_LEN_V2 + payload.len() + CHECKSUM_LEN);
    match header.variant {
        ProtocolVariant::Legacy => {
            debug_assert!(msg_id <= u8::MAX as u32);
            buf.extend_from_slice(&[
                STX_LEGACY,
                payload.len() as u8,
                header.sequence,
                header.system_id,
                header.component_id,
                msg_id as u8,
            ]);
        }
        ProtocolVariant::V2 => {
            let id = msg_id.to_le_bytes();
            buf.extend_from_slice(&[
                STX_V2,
                payload.len() as u8,
                0, // incompat flags: unsigned
                0, // compat flags
                header.sequence,
                header.system_id,
                header.component_id,
                id[0],
                id[1],
                id[2],
            ]);
        }
    }
    buf.extend_from_slice(payload);

    let extra = crc_extra(msg_id).unwrap_or(0);
    let crc = frame_checksum(&buf[1..], extra);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Serialize a SET_POSITION_TARGET_LOCAL_NED payload.
pub fn write_velocity_target(t: &VelocityTarget) -> [u8; SET_POSITION_TARGET_LEN] {
    let mut p = [0u8; SET_POSITION_TARGET_LEN];
    p[0..4].copy_from_slice(&t.time_boot_ms.to_le_bytes());
    let floats = [
        t.position[0],
        t.position[1],
        t.position[2],
        t.velocity[0],
        t.velocity[1],
        t.velocity[2],
        t.acceleration[0],
        t.acceleration[1],
        t.acceleration[2],
        t.yaw,
        t.yaw_rate,
    ];
    for (i, v) in floats.iter().enumerate() {
        let off = 4 + i * 4;
        p[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }
    p[48..50].copy_from_slice(&t.type_mask.to_le_bytes());
    p[50] = t.target_system;
    p[51] = t.target_component;
    p[52] = t.coordinate_frame;
    p
}

/// Serialize a COMMAND_LONG payload.
pub fn write_command_long(c: &CommandLong) -> [u8; COMMAND_LONG_LEN] {
    let mut p = [0u8; COMMAND_LONG_LEN];
    for (i, v) in c.params.iter().enumerate() {
        p[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    p[28..30].copy_from_slice(&c.command.to_le_bytes());
    p[30] = c.target_system;
    p[31] = c.target_component;
    p[32] = c.confirmation;
    p
}

/// Serialize a HEARTBEAT payload.
pub fn write_heartbeat(h: &TelemetryFrame) -> [u8; HEARTBEAT_LEN] {
    let mut p = [0u8; HEARTBEAT_LEN];
    p[0..4].copy_from_slice(&h.custom_mode.to_le_bytes());
    p[4] = h.vehicle_type;
    p[5] = h.autopilot;
    p[6] = h.base_mode;
    p[7] = h.system_status;
    p[8] = h.mavlink_version;
    p
}

fn velocity_target(velocity: [f32; 3], yaw_rate: f32, target: &Target) -> VelocityTarget {
    VelocityTarget {
        time_boot_ms: 0,
        target_system: target.system,
        target_component: target.component,
        coordinate_frame: MAV_FRAME_LOCAL_NED,
        type_mask: TypeMask::velocity_only().bits(),
        velocity,
        yaw_rate,
        ..VelocityTarget::default()
    }
}

/// Encode the session's motion fields as a velocity-target frame.
///
/// `armed` is not part of this message; arming travels as a COMMAND_LONG
/// (see [`encode_arm_disarm`]).
pub fn encode_session(state: &CommandSessionState, header: &FrameHeader, target: &Target) -> Vec<u8> {
    let t = velocity_target(
        [state.velocity_x, state.velocity_y, state.velocity_z],
        state.yaw_rate,
        target,
    );
    encode_frame(header, MSG_SET_POSITION_TARGET_LOCAL_NED, &write_velocity_target(&t))
}

/// Encode a one-shot velocity-target frame for a discrete motion command.
///
/// Only the commanded axis is non-zero. Returns `None` for commands that
/// do not move the vehicle. The frame does not persist on the vehicle side
/// beyond its own timeout; the caller sends any follow-up stop.
pub fn encode_command(
    command: Command,
    speed: f32,
    header: &FrameHeader,
    target: &Target,
) -> Option<Vec<u8>> {
    let velocity = match command {
        Command::Forward => [speed, 0.0, 0.0],
        Command::Backward => [-speed, 0.0, 0.0],
        Command::Left => [0.0, -speed, 0.0],
        Command::Right => [0.0, speed, 0.0],
        // NED: z points down
        Command::Up => [0.0, 0.0, -speed],
        Command::Down => [0.0, 0.0, speed],
        _ => return None,
    };
    let t = velocity_target(velocity, 0.0, target);
    Some(encode_frame(
        header,
        MSG_SET_POSITION_TARGET_LOCAL_NED,
        &write_velocity_target(&t),
    ))
}

/// Encode COMPONENT_ARM_DISARM (param1 = 1 arm, 0 disarm).
pub fn encode_arm_disarm(arm: bool, header: &FrameHeader, target: &Target) -> Vec<u8> {
    let mut params = [0.0f32; 7];
    params[0] = if arm { 1.0 } else { 0.0 };
    let cmd = CommandLong {
        target_system: target.system,
        target_component: target.component,
        command: MAV_CMD_COMPONENT_ARM_DISARM,
        confirmation: 0,
        params,
    };
    encode_frame(header, MSG_COMMAND_LONG, &write_command_long(&cmd))
}

/// Encode the ground-station heartbeat announcing this bridge.
pub fn encode_heartbeat(header: &FrameHeader) -> Vec<u8> {
    let hb = TelemetryFrame {
        vehicle_type: MAV_TYPE_GCS,
        autopilot: MAV_AUTOPILOT_INVALID,
        custom_mode: 0,
        base_mode: 0,
        system_status: MAV_STATE_ACTIVE,
        mavlink_version: MAVLINK_VERSION,
        armed: false,
    };
    encode_frame(header, MSG_HEARTBEAT, &write_heartbeat(&hb))
}

#[inline]
fn u16_at(p: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([p[off], p[off + 1]])
}

#[inline]
fn i16_at(p: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([p[off], p[off + 1]])
}

#[inline]
fn u32_at(p: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

#[inline]
fn i32_at(p: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

#[inline]
fn f32_at(p: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]])
}

/// Parse a HEARTBEAT payload.
///
/// Payload layout (fixed offsets):
/// - `[0..4]`: custom_mode u32 LE
/// - `[4]`: type
/// - `[5]`: autopilot
/// - `[6]`: base_mode (bit 7 = safety armed)
/// - `[7]`: system_status
/// - `[8]`: mavlink_version
pub fn parse_heartbeat(p: &[u8]) -> TelemetryFrame {
    let base_mode = p[6];
    TelemetryFrame {
        custom_mode: u32_at(p, 0),
        vehicle_type: p[4],
        autopilot: p[5],
        base_mode,
        system_status: p[7],
        mavlink_version: p[8],
        armed: base_mode & MAV_MODE_FLAG_SAFETY_ARMED != 0,
    }
}

/// Parse an ATTITUDE payload: time_boot_ms then six f32 (rad, rad/s).
pub fn parse_attitude(p: &[u8]) -> Attitude {
    Attitude {
        time_boot_ms: u32_at(p, 0),
        roll: f32_at(p, 4),
        pitch: f32_at(p, 8),
        yaw: f32_at(p, 12),
        rollspeed: f32_at(p, 16),
        pitchspeed: f32_at(p, 20),
        yawspeed: f32_at(p, 24),
    }
}

/// Parse GLOBAL_POSITION_INT, converting degE7 / mm / cm/s / cdeg.
pub fn parse_global_position(p: &[u8]) -> GlobalPosition {
    let hdg = u16_at(p, 26);
    GlobalPosition {
        time_boot_ms: u32_at(p, 0),
        latitude: i32_at(p, 4) as f64 / 1e7,
        longitude: i32_at(p, 8) as f64 / 1e7,
        altitude: i32_at(p, 12) as f32 / 1000.0,
        relative_altitude: i32_at(p, 16) as f32 / 1000.0,
        vx: i16_at(p, 20) as f32 / 100.0,
        vy: i16_at(p, 22) as f32 / 100.0,
        vz: i16_at(p, 24) as f32 / 100.0,
        heading: (hdg != u16::MAX).then(|| hdg as f32 / 100.0),
    }
}

pub fn parse_command_ack(p: &[u8]) -> CommandAck {
    CommandAck {
        command: u16_at(p, 0),
        result: p[2],
    }
}

pub fn parse_command_long(p: &[u8]) -> CommandLong {
    let mut params = [0.0f32; 7];
    for (i, v) in params.iter_mut().enumerate() {
        *v = f32_at(p, i * 4);
    }
    CommandLong {
        params,
        command: u16_at(p, 28),
        target_system: p[30],
        target_component: p[31],
        confirmation: p[32],
    }
}

pub fn parse_velocity_target(p: &[u8]) -> VelocityTarget {
    VelocityTarget {
        time_boot_ms: u32_at(p, 0),
        position: [f32_at(p, 4), f32_at(p, 8), f32_at(p, 12)],
        velocity: [f32_at(p, 16), f32_at(p, 20), f32_at(p, 24)],
        acceleration: [f32_at(p, 28), f32_at(p, 32), f32_at(p, 36)],
        yaw: f32_at(p, 40),
        yaw_rate: f32_at(p, 44),
        type_mask: u16_at(p, 48),
        target_system: p[50],
        target_component: p[51],
        coordinate_frame: p[52],
    }
}

/// Interpret a complete frame's payload by message id.
///
/// V2 payloads are zero-extended to the base message length (undoing
/// trailing-zero truncation); a legacy payload shorter than the base
/// length is an error. Unknown ids are returned as opaque payloads.
pub fn parse(frame: &RawFrame) -> Result<Message, DecodeError> {
    let Some(expected) = payload_len(frame.msg_id) else {
        return Ok(Message::Unknown {
            msg_id: frame.msg_id,
            payload: frame.payload.clone(),
        });
    };

    if frame.variant == ProtocolVariant::Legacy && frame.payload.len() < expected {
        return Err(DecodeError::ShortPayload {
            msg_id: frame.msg_id,
            len: frame.payload.len(),
        });
    }

    let mut p = frame.payload.clone();
    if p.len() < expected {
        p.resize(expected, 0);
    }

    let msg = match frame.msg_id {
        MSG_HEARTBEAT => Message::Heartbeat(parse_heartbeat(&p)),
        MSG_ATTITUDE => Message::Attitude(parse_attitude(&p)),
        MSG_GLOBAL_POSITION_INT => Message::GlobalPosition(parse_global_position(&p)),
        MSG_COMMAND_ACK => Message::CommandAck(parse_command_ack(&p)),
        MSG_COMMAND_LONG => Message::CommandLong(parse_command_long(&p)),
        MSG_SET_POSITION_TARGET_LOCAL_NED => Message::VelocityTarget(parse_velocity_target(&p)),
        _ => unreachable!("payload_len covers every known id"),
    };
    Ok(msg)
}

/// Rebuild the session motion fields from a decoded velocity target.
/// `armed` is not carried by this message and comes back `false`.
pub fn session_from_velocity_target(t: &VelocityTarget) -> CommandSessionState {
    CommandSessionState {
        velocity_x: t.velocity[0],
        velocity_y: t.velocity[1],
        velocity_z: t.velocity[2],
        yaw_rate: t.yaw_rate,
        armed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::FrameSplitter;

    fn header(variant: ProtocolVariant, sequence: u8) -> FrameHeader {
        FrameHeader {
            variant,
            sequence,
            system_id: 255,
            component_id: 190,
        }
    }

    const TARGET: Target = Target {
        system: 1,
        component: 1,
    };

    fn decode_one(bytes: &[u8]) -> RawFrame {
        let mut splitter = FrameSplitter::new();
        splitter.push(bytes);
        splitter.next_frame().unwrap().unwrap()
    }

    #[test]
    fn test_crc16_check_value() {
        // CRC-16/MCRF4XX catalogue check value
        assert_eq!(crc16(b"123456789"), 0x6F91);
    }

    #[test]
    fn test_legacy_header_layout() {
        let bytes = encode_session(
            &CommandSessionState::default(),
            &header(ProtocolVariant::Legacy, 7),
            &TARGET,
        );
        assert_eq!(bytes[0], STX_LEGACY);
        assert_eq!(bytes[1] as usize, SET_POSITION_TARGET_LEN);
        assert_eq!(bytes[2], 7);
        assert_eq!(bytes[3], 255);
        assert_eq!(bytes[4], 190);
        assert_eq!(bytes[5], MSG_SET_POSITION_TARGET_LOCAL_NED as u8);
        assert_eq!(
            bytes.len(),
            HEADER_LEN_LEGACY + SET_POSITION_TARGET_LEN + CHECKSUM_LEN
        );
    }

    #[test]
    fn test_v2_header_length_matches_payload() {
        let state = CommandSessionState {
            velocity_x: 2.0,
            ..Default::default()
        };
        let bytes = encode_session(&state, &header(ProtocolVariant::V2, 0), &TARGET);
        assert_eq!(bytes[0], STX_V2);
        let len = bytes[1] as usize;
        assert_eq!(bytes.len(), HEADER_LEN_V2 + len + CHECKSUM_LEN);
        // coordinate_frame is the last payload byte and non-zero, so nothing is truncated
        assert_eq!(len, SET_POSITION_TARGET_LEN);
        assert_eq!(&bytes[7..10], &[84, 0, 0]);
    }

    #[test]
    fn test_v2_truncates_trailing_zeros() {
        let ack = [0x90, 0x01, 0x00]; // command 400, result 0
        let bytes = encode_frame(&header(ProtocolVariant::V2, 0), MSG_COMMAND_ACK, &ack);
        assert_eq!(bytes[1], 2);

        let frame = decode_one(&bytes);
        assert_eq!(
            parse(&frame).unwrap(),
            Message::CommandAck(CommandAck {
                command: 400,
                result: 0
            })
        );
    }

    #[test]
    fn test_session_round_trip() {
        let states = [
            CommandSessionState::default(),
            CommandSessionState {
                velocity_x: 2.0,
                velocity_y: -1.5,
                velocity_z: 0.25,
                yaw_rate: -0.5,
                armed: false,
            },
            CommandSessionState {
                velocity_x: -0.0,
                velocity_y: 1e-3,
                velocity_z: -3.0,
                yaw_rate: 1.0,
                armed: false,
            },
        ];
        for variant in [ProtocolVariant::Legacy, ProtocolVariant::V2] {
            for state in &states {
                let bytes = encode_session(state, &header(variant, 42), &TARGET);
                let frame = decode_one(&bytes);
                assert_eq!(frame.variant, variant);
                assert_eq!(frame.sequence, 42);
                match parse(&frame).unwrap() {
                    Message::VelocityTarget(t) => {
                        assert_eq!(session_from_velocity_target(&t), *state);
                        assert_eq!(t.type_mask, TypeMask::velocity_only().bits());
                        assert_eq!(t.coordinate_frame, MAV_FRAME_LOCAL_NED);
                        assert_eq!(t.target_system, 1);
                    }
                    other => panic!("unexpected message: {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_consecutive_ticks_differ_only_in_sequence() {
        let state = CommandSessionState {
            velocity_x: 1.0,
            yaw_rate: 0.2,
            ..Default::default()
        };
        let a = encode_session(&state, &header(ProtocolVariant::V2, 10), &TARGET);
        let b = encode_session(&state, &header(ProtocolVariant::V2, 11), &TARGET);
        assert_eq!(a.len(), b.len());
        let crc_at = a.len() - CHECKSUM_LEN;
        let diffs: Vec<usize> = (0..crc_at).filter(|&i| a[i] != b[i]).collect();
        assert_eq!(diffs, vec![4]); // v2 sequence byte
    }

    #[test]
    fn test_encode_command_single_axis() {
        let h = header(ProtocolVariant::V2, 0);
        let bytes = encode_command(Command::Left, 2.0, &h, &TARGET).unwrap();
        match parse(&decode_one(&bytes)).unwrap() {
            Message::VelocityTarget(t) => assert_eq!(t.velocity, [0.0, -2.0, 0.0]),
            other => panic!("unexpected message: {:?}", other),
        }

        let bytes = encode_command(Command::Up, 1.0, &h, &TARGET).unwrap();
        match parse(&decode_one(&bytes)).unwrap() {
            Message::VelocityTarget(t) => assert_eq!(t.velocity, [0.0, 0.0, -1.0]),
            other => panic!("unexpected message: {:?}", other),
        }

        assert!(encode_command(Command::Help, 2.0, &h, &TARGET).is_none());
        assert!(encode_command(Command::CameraYawLeft, 2.0, &h, &TARGET).is_none());
    }

    #[test]
    fn test_arm_disarm_command() {
        let bytes = encode_arm_disarm(true, &header(ProtocolVariant::Legacy, 3), &TARGET);
        match parse(&decode_one(&bytes)).unwrap() {
            Message::CommandLong(c) => {
                assert_eq!(c.command, MAV_CMD_COMPONENT_ARM_DISARM);
                assert_eq!(c.params[0], 1.0);
                assert_eq!(c.target_system, 1);
                assert_eq!(c.target_component, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_armed_bit() {
        let mut payload = [0u8; HEARTBEAT_LEN];
        payload[0..4].copy_from_slice(&4u32.to_le_bytes());
        payload[4] = 2; // quadrotor
        payload[5] = 3; // ardupilot
        payload[6] = 0x80;
        payload[7] = 4;
        payload[8] = 3;
        let hb = parse_heartbeat(&payload);
        assert!(hb.armed);
        assert_eq!(hb.custom_mode, 4);
        assert_eq!(hb.vehicle_type, 2);
        assert_eq!(hb.autopilot, 3);
        assert_eq!(hb.system_status, 4);

        payload[6] = 0x00;
        assert!(!parse_heartbeat(&payload).armed);

        // custom-mode-enabled without the safety bit
        payload[6] = 0x01;
        assert!(!parse_heartbeat(&payload).armed);
    }

    #[test]
    fn test_gcs_heartbeat_parses() {
        let bytes = encode_heartbeat(&header(ProtocolVariant::V2, 0));
        match parse(&decode_one(&bytes)).unwrap() {
            Message::Heartbeat(hb) => {
                assert_eq!(hb.vehicle_type, MAV_TYPE_GCS);
                assert_eq!(hb.system_status, MAV_STATE_ACTIVE);
                assert!(!hb.armed);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_global_position_units() {
        let mut p = [0u8; GLOBAL_POSITION_INT_LEN];
        p[4..8].copy_from_slice(&473_977_418i32.to_le_bytes());
        p[8..12].copy_from_slice(&85_455_939i32.to_le_bytes());
        p[12..16].copy_from_slice(&584_070i32.to_le_bytes());
        p[16..20].copy_from_slice(&10_000i32.to_le_bytes());
        p[20..22].copy_from_slice(&150i16.to_le_bytes());
        p[24..26].copy_from_slice(&(-20i16).to_le_bytes());
        p[26..28].copy_from_slice(&u16::MAX.to_le_bytes());
        let pos = parse_global_position(&p);
        assert!((pos.latitude - 47.3977418).abs() < 1e-9);
        assert!((pos.longitude - 8.5455939).abs() < 1e-9);
        assert!((pos.altitude - 584.07).abs() < 1e-3);
        assert!((pos.relative_altitude - 10.0).abs() < 1e-6);
        assert!((pos.vx - 1.5).abs() < 1e-6);
        assert!((pos.vz + 0.2).abs() < 1e-6);
        assert_eq!(pos.heading, None);
    }

    #[test]
    fn test_unknown_message_is_opaque() {
        let frame = RawFrame {
            variant: ProtocolVariant::V2,
            sequence: 0,
            system_id: 1,
            component_id: 1,
            msg_id: 253,
            payload: vec![1, 2, 3],
        };
        assert_eq!(
            parse(&frame).unwrap(),
            Message::Unknown {
                msg_id: 253,
                payload: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn test_short_legacy_payload_is_error() {
        let frame = RawFrame {
            variant: ProtocolVariant::Legacy,
            sequence: 0,
            system_id: 1,
            component_id: 1,
            msg_id: MSG_HEARTBEAT,
            payload: vec![0; 5],
        };
        assert_eq!(
            parse(&frame),
            Err(DecodeError::ShortPayload {
                msg_id: MSG_HEARTBEAT,
                len: 5
            })
        );
    }
}
