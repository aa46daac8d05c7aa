//! Bridge configuration, loaded from a TOML file.
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! peer_host = "10.0.0.226"
//! peer_port = 14550
//! bind_host = "0.0.0.0"
//! bind_port = 14551
//! tick_interval_ms = 100
//! protocol = "v2"          # or "legacy"
//! profile = "gamepad"
//!
//! [profiles.gamepad]
//! moveForward = "axis:1-"
//! moveBackward = "axis:1+"
//! help = "button:9"
//! ```

use crate::input::{BindingProfile, DEFAULT_DEADZONE};
use crate::protocol::{FrameHeader, Target};
use crate::session::{DEFAULT_SPEED, DEFAULT_YAW_RATE};
use crate::types::ProtocolVariant;
use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Vehicle address frames are sent to.
    pub peer_host: String,
    pub peer_port: u16,
    /// Local address telemetry is received on.
    pub bind_host: String,
    pub bind_port: u16,
    /// Outbound command period.
    pub tick_interval_ms: u64,
    /// Ground-station heartbeat period; 0 disables it.
    pub heartbeat_interval_ms: u64,
    /// Our own system/component id in outbound headers.
    pub system_id: u8,
    pub component_id: u8,
    /// Vehicle system/component addressed by commands.
    pub target_system: u8,
    pub target_component: u8,
    pub protocol: ProtocolVariant,
    /// Translation speed for discrete commands and full stick deflection, m/s.
    pub speed: f32,
    /// Yaw rate at full right-stick deflection, rad/s.
    pub yaw_rate: f32,
    pub deadzone: f32,
    /// Active binding profile name.
    pub profile: String,
    /// User-defined profiles: name -> (action -> physical input).
    pub profiles: HashMap<String, HashMap<String, String>>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            peer_host: "127.0.0.1".to_string(),
            peer_port: 14550,
            bind_host: "0.0.0.0".to_string(),
            bind_port: 14551,
            tick_interval_ms: 100,
            heartbeat_interval_ms: 1000,
            system_id: 255,
            component_id: 190,
            target_system: 1,
            target_component: 1,
            protocol: ProtocolVariant::V2,
            speed: DEFAULT_SPEED,
            yaw_rate: DEFAULT_YAW_RATE,
            deadzone: DEFAULT_DEADZONE,
            profile: "skydio".to_string(),
            profiles: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            BridgeError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.peer_port == 0 {
            return Err(BridgeError::Config("peer_port must be non-zero".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(BridgeError::Config("tick_interval_ms must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(BridgeError::Config(format!(
                "deadzone {} outside [0, 1)",
                self.deadzone
            )));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(BridgeError::Config(format!("invalid speed {}", self.speed)));
        }
        if !self.yaw_rate.is_finite() || self.yaw_rate < 0.0 {
            return Err(BridgeError::Config(format!("invalid yaw_rate {}", self.yaw_rate)));
        }
        for name in self.profiles.keys() {
            BindingProfile::resolve(name, &self.profiles)?;
        }
        self.binding_profile()?;
        self.peer_addr()?;
        self.bind_addr()?;
        Ok(())
    }

    pub fn binding_profile(&self) -> Result<BindingProfile> {
        BindingProfile::resolve(&self.profile, &self.profiles)
    }

    /// Look up a profile by name against this configuration's tables.
    pub fn profile_named(&self, name: &str) -> Result<BindingProfile> {
        BindingProfile::resolve(name, &self.profiles)
    }

    fn resolve(host: &str, port: u16, what: &str) -> Result<SocketAddr> {
        (host, port)
            .to_socket_addrs()
            .map_err(|e| BridgeError::Config(format!("invalid {} {}:{}: {}", what, host, port, e)))?
            .next()
            .ok_or_else(|| BridgeError::Config(format!("{} {}:{} did not resolve", what, host, port)))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Self::resolve(&self.peer_host, self.peer_port, "peer address")
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        Self::resolve(&self.bind_host, self.bind_port, "bind address")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    /// Outbound header template; the transport fills in the sequence.
    pub fn frame_header(&self, sequence: u8) -> FrameHeader {
        FrameHeader {
            variant: self.protocol,
            sequence,
            system_id: self.system_id,
            component_id: self.component_id,
        }
    }

    pub fn target(&self) -> Target {
        Target {
            system: self.target_system,
            component: self.target_component,
        }
    }
}
