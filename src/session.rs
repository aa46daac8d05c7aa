//! The command session: one register of intended vehicle motion.
//!
//! Each mutation is applied as a unit and overwrites whatever was there
//! (last write wins per field). When several operators drive the same
//! session nothing arbitrates between them beyond the order in which
//! their calls arrive.

use crate::types::{Command, CommandSessionState, Stick, StickVector};

/// Default translation speed in m/s.
pub const DEFAULT_SPEED: f32 = 2.0;
/// Default full-deflection yaw rate in rad/s.
pub const DEFAULT_YAW_RATE: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct CommandSession {
    state: CommandSessionState,
    speed: f32,
    max_yaw_rate: f32,
}

impl CommandSession {
    pub fn new(speed: f32, max_yaw_rate: f32) -> Self {
        Self {
            state: CommandSessionState::default(),
            speed,
            max_yaw_rate,
        }
    }

    /// Apply a discrete command. Commands that do not move the vehicle
    /// leave the state untouched and return `false`.
    pub fn apply(&mut self, command: Command) -> bool {
        let v = self.speed;
        let s = &mut self.state;
        match command {
            Command::Forward => s.velocity_x = v,
            Command::Backward => s.velocity_x = -v,
            Command::Right => s.velocity_y = v,
            Command::Left => s.velocity_y = -v,
            // NED: negative z climbs
            Command::Up => s.velocity_z = -v,
            Command::Down => s.velocity_z = v,
            _ => return false,
        }
        true
    }

    /// Zero every motion field.
    pub fn stop(&mut self) {
        self.state = CommandSessionState {
            armed: self.state.armed,
            ..CommandSessionState::default()
        };
    }

    /// Apply a deadzone-clamped stick vector.
    ///
    /// Left stick: up (negative y) flies forward, x strafes.
    /// Right stick: x yaws, y climbs (up) or descends (down).
    pub fn apply_stick(&mut self, stick: Stick, v: StickVector) {
        let s = &mut self.state;
        match stick {
            Stick::Left => {
                s.velocity_x = -v.y * self.speed;
                s.velocity_y = v.x * self.speed;
            }
            Stick::Right => {
                s.yaw_rate = v.x * self.max_yaw_rate;
                s.velocity_z = v.y * self.speed;
            }
        }
    }

    pub fn set_armed(&mut self, armed: bool) {
        self.state.armed = armed;
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> CommandSessionState {
        self.state
    }
}

impl Default for CommandSession {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED, DEFAULT_YAW_RATE)
    }
}
