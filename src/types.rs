use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete operator command.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
    Forward = 4,
    Backward = 5,
    CameraPitchUp = 6,
    CameraPitchDown = 7,
    CameraYawLeft = 8,
    CameraYawRight = 9,
    Notes = 10,
    Help = 11,
    ToggleHotkeys = 12,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::Left,
        Command::Right,
        Command::Up,
        Command::Down,
        Command::Forward,
        Command::Backward,
        Command::CameraPitchUp,
        Command::CameraPitchDown,
        Command::CameraYawLeft,
        Command::CameraYawRight,
        Command::Notes,
        Command::Help,
        Command::ToggleHotkeys,
    ];

    /// Name used on the UI command channel, e.g. `"FORWARD"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Left => "LEFT",
            Command::Right => "RIGHT",
            Command::Up => "UP",
            Command::Down => "DOWN",
            Command::Forward => "FORWARD",
            Command::Backward => "BACKWARD",
            Command::CameraPitchUp => "CAMERA_PITCH_UP",
            Command::CameraPitchDown => "CAMERA_PITCH_DOWN",
            Command::CameraYawLeft => "CAMERA_YAW_LEFT",
            Command::CameraYawRight => "CAMERA_YAW_RIGHT",
            Command::Notes => "NOTES",
            Command::Help => "HELP",
            Command::ToggleHotkeys => "TOGGLE_HOTKEYS",
        }
    }

    /// Look up a command by its `#[repr(C)]` discriminant.
    pub fn from_index(index: i32) -> Option<Command> {
        Command::ALL.iter().copied().find(|c| *c as i32 == index)
    }

    /// True for commands that move the vehicle.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Command::Left
                | Command::Right
                | Command::Up
                | Command::Down
                | Command::Forward
                | Command::Backward
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = crate::BridgeError;

    fn from_str(s: &str) -> crate::Result<Self> {
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::BridgeError::UnknownCommand(s.to_string()))
    }
}

/// 8-way compass direction of an analog stick, plus `Neutral`.
///
/// Screen convention: positive y points down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Neutral,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
    Up,
    UpRight,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Neutral => "Neutral",
            Direction::Right => "Right",
            Direction::DownRight => "Down-Right",
            Direction::Down => "Down",
            Direction::DownLeft => "Down-Left",
            Direction::Left => "Left",
            Direction::UpLeft => "Up-Left",
            Direction::Up => "Up",
            Direction::UpRight => "Up-Right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadzone-clamped analog stick reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StickVector {
    pub x: f32,
    pub y: f32,
}

/// Which analog stick a vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    /// Translation: x strafes, y moves forward/backward.
    Left,
    /// Yaw (x) and climb (y).
    Right,
}

/// The shared record of intended vehicle motion.
///
/// Velocities are in m/s in the local NED frame (z positive down),
/// `yaw_rate` in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CommandSessionState {
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub velocity_z: f32,
    pub yaw_rate: f32,
    pub armed: bool,
}

/// Wire protocol revision used for outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Start byte 0xFE, 6-byte header, 8-bit message id.
    Legacy,
    /// Start byte 0xFD, 10-byte header, 24-bit message id.
    #[default]
    V2,
}

bitflags::bitflags! {
    /// Ignore-flags of a position-target message. A set bit tells the
    /// vehicle to ignore the corresponding field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeMask: u16 {
        const X_IGNORE        = 1 << 0;
        const Y_IGNORE        = 1 << 1;
        const Z_IGNORE        = 1 << 2;
        const VX_IGNORE       = 1 << 3;
        const VY_IGNORE       = 1 << 4;
        const VZ_IGNORE       = 1 << 5;
        const AFX_IGNORE      = 1 << 6;
        const AFY_IGNORE      = 1 << 7;
        const AFZ_IGNORE      = 1 << 8;
        const FORCE_SET       = 1 << 9;
        const YAW_IGNORE      = 1 << 10;
        const YAW_RATE_IGNORE = 1 << 11;

        const POSITION = Self::X_IGNORE.bits() | Self::Y_IGNORE.bits() | Self::Z_IGNORE.bits();
        const VELOCITY = Self::VX_IGNORE.bits() | Self::VY_IGNORE.bits() | Self::VZ_IGNORE.bits();
        const ACCELERATION = Self::AFX_IGNORE.bits() | Self::AFY_IGNORE.bits() | Self::AFZ_IGNORE.bits();
    }
}

impl TypeMask {
    /// Mask for a frame that populates velocity and yaw rate only.
    pub const fn velocity_only() -> TypeMask {
        TypeMask::POSITION
            .union(TypeMask::ACCELERATION)
            .union(TypeMask::FORCE_SET)
            .union(TypeMask::YAW_IGNORE)
    }
}

/// Decoded HEARTBEAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryFrame {
    #[serde(rename = "type")]
    pub vehicle_type: u8,
    pub autopilot: u8,
    pub custom_mode: u32,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
    pub armed: bool,
}

/// Decoded ATTITUDE. Angles in radians, rates in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

/// Decoded GLOBAL_POSITION_INT, converted to degrees, metres and m/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalPosition {
    pub time_boot_ms: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// MSL altitude in metres.
    pub altitude: f32,
    /// Altitude above home in metres.
    pub relative_altitude: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    /// Heading in degrees, `None` when the vehicle reports it as unknown.
    pub heading: Option<f32>,
}

/// Decoded COMMAND_ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    pub command: u16,
    pub result: u8,
}

/// SET_POSITION_TARGET_LOCAL_NED payload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityTarget {
    pub time_boot_ms: u32,
    pub target_system: u8,
    pub target_component: u8,
    pub coordinate_frame: u8,
    pub type_mask: u16,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub acceleration: [f32; 3],
    pub yaw: f32,
    pub yaw_rate: f32,
}

/// COMMAND_LONG payload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandLong {
    pub target_system: u8,
    pub target_component: u8,
    pub command: u16,
    pub confirmation: u8,
    pub params: [f32; 7],
}
