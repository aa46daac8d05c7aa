use std::fmt;

/// Errors raised while splitting or parsing inbound frames.
///
/// None of these are fatal: the receive path logs them, drops the offending
/// bytes and keeps scanning for the next sentinel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("skipped {0} bytes with no frame sentinel")]
    Garbage(usize),

    #[error("checksum mismatch on msg {msg_id}: expected 0x{expected:04x}, got 0x{actual:04x}")]
    Checksum {
        msg_id: u32,
        expected: u16,
        actual: u16,
    },

    #[error("unsupported incompat flags 0x{0:02x}")]
    IncompatFlags(u8),

    #[error("unverifiable msg {msg_id} not followed by a sentinel")]
    Unframed { msg_id: u32 },

    #[error("payload for msg {msg_id} too short: {len} bytes")]
    ShortPayload { msg_id: u32, len: usize },
}

/// Errors that can occur while configuring or running the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Bridge stopped")]
    Stopped,

    #[error("Telemetry stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Channel disconnected")]
    ChannelDisconnected,

    #[error("Buffer too small: {needed} bytes needed")]
    BufferTooSmall { needed: usize },
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &BridgeError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
