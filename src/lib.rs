//! # teleop-bridge - operator input to vehicle command bridge
//!
//! Turns keyboard, gamepad and UI commands into MAVLink-framed velocity
//! setpoints sent over UDP, and fans decoded vehicle telemetry back out to
//! subscribers. Provides:
//! - Input normalization with rebindable profiles and stick deadzones
//! - A single command session ticked to the vehicle at a fixed rate
//! - Legacy and v2 frame codecs with checksums and stream resync
//! - C FFI for embedding in a UI host
//!
//! ## Quick Start
//! ```no_run
//! use teleop_bridge::{BridgeConfig, Command};
//! use std::time::Duration;
//!
//! let config = BridgeConfig::load("teleop.toml").unwrap();
//! let bridge = teleop_bridge::bridge::start(config).unwrap();
//! let handle = bridge.handle();
//! let telemetry = handle.subscribe();
//!
//! handle.arm(true).unwrap();
//! handle.apply_command(Command::Forward).unwrap();
//! for _ in 0..10 {
//!     let event = telemetry.recv_timeout(Duration::from_secs(1)).unwrap();
//!     println!("{}", event.to_json());
//! }
//! bridge.stop();
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod framing;
pub mod input;
pub mod session;
pub mod telemetry;
pub mod config;
pub mod transport;
pub mod bridge;
pub mod ffi;

pub use bridge::{Bridge, BridgeHandle};
pub use config::BridgeConfig;
pub use error::{BridgeError, DecodeError};
pub use input::{BindingProfile, InputEvent, InputNormalizer, NormalizedInput};
pub use session::CommandSession;
pub use telemetry::{TelemetryEvent, TelemetryStream};
pub use transport::{LinkStats, TransportState};
pub use types::*;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
