//! C FFI layer for teleop-bridge.
//!
//! Opaque handle-based API for C/C++ hosts. The generated header is written
//! to `include/teleop_bridge.h` by cbindgen. Commands are passed as their
//! `TbCommand` discriminant.

use crate::bridge::{Bridge, BridgeHandle};
use crate::config::BridgeConfig;
use crate::error::LastError;
use crate::telemetry::TelemetryStream;
use crate::types::Command;
use crate::{BridgeError, Result};
use std::ffi::{c_char, c_int, CStr};
use std::time::Duration;

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque running-bridge handle.
pub struct TbBridge(Bridge);

/// Opaque telemetry subscription handle.
pub struct TbTelemetryStream(TelemetryStream);

fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

unsafe fn handle_of(bridge: *const TbBridge) -> Option<BridgeHandle> {
    if bridge.is_null() {
        return None;
    }
    Some((*bridge).0.handle())
}

unsafe fn load_config(path: *const c_char) -> Result<BridgeConfig> {
    if path.is_null() {
        return Ok(BridgeConfig::default());
    }
    let path = CStr::from_ptr(path)
        .to_str()
        .map_err(|e| BridgeError::Config(format!("config path is not UTF-8: {}", e)))?;
    BridgeConfig::load(path)
}

/// Start a bridge from a TOML config file. Pass NULL for defaults.
/// Returns NULL on error (check tb_last_error()).
///
/// # Safety
/// `config_path` must be a valid null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_bridge_start(config_path: *const c_char) -> *mut TbBridge {
    match load_config(config_path).and_then(Bridge::start) {
        Ok(bridge) => Box::into_raw(Box::new(TbBridge(bridge))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Stop a bridge and free it.
///
/// # Safety
/// `bridge` must be a pointer returned by `tb_bridge_start`, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_bridge_stop(bridge: *mut TbBridge) {
    if !bridge.is_null() {
        let TbBridge(bridge) = *Box::from_raw(bridge);
        bridge.stop();
    }
}

/// Apply a discrete command. Returns 0 on success, -1 on error.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_apply_command(bridge: *const TbBridge, command: c_int) -> c_int {
    let Some(handle) = handle_of(bridge) else {
        return -1;
    };
    match Command::from_index(command) {
        Some(cmd) => status(handle.apply_command(cmd)),
        None => status(Err(BridgeError::UnknownCommand(command.to_string()))),
    }
}

/// Send a one-shot frame for a motion command. Returns 0 on success.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_pulse(bridge: *const TbBridge, command: c_int) -> c_int {
    let Some(handle) = handle_of(bridge) else {
        return -1;
    };
    match Command::from_index(command) {
        Some(cmd) => status(handle.pulse(cmd)),
        None => status(Err(BridgeError::UnknownCommand(command.to_string()))),
    }
}

/// Apply a raw left-stick reading in [-1, 1] (screen coordinates, y down).
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_apply_stick(bridge: *const TbBridge, x: f32, y: f32) -> c_int {
    match handle_of(bridge) {
        Some(handle) => status(handle.apply_stick(x, y)),
        None => -1,
    }
}

/// Arm (`armed = true`) or disarm the vehicle.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_arm(bridge: *const TbBridge, armed: bool) -> c_int {
    match handle_of(bridge) {
        Some(handle) => status(handle.arm(armed)),
        None => -1,
    }
}

/// Subscribe to telemetry. Free the result with `tb_stream_free`.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_subscribe(bridge: *const TbBridge) -> *mut TbTelemetryStream {
    match handle_of(bridge) {
        Some(handle) => Box::into_raw(Box::new(TbTelemetryStream(handle.subscribe()))),
        None => std::ptr::null_mut(),
    }
}

/// Receive the next telemetry event as null-terminated JSON.
/// `timeout_ms`: 0 = try without blocking, -1 = block forever.
/// Returns the JSON length (excluding the terminator), or -1 on
/// error/timeout.
///
/// # Safety
/// `stream` must be a valid stream pointer, or null. `buf` must point to
/// at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn tb_stream_recv_json(
    stream: *const TbTelemetryStream,
    buf: *mut c_char,
    len: usize,
    timeout_ms: c_int,
) -> c_int {
    if stream.is_null() || buf.is_null() {
        return -1;
    }
    let stream = &(*stream).0;

    let result = if timeout_ms == 0 {
        stream.try_recv().ok_or(BridgeError::Timeout)
    } else if timeout_ms < 0 {
        stream.recv()
    } else {
        stream.recv_timeout(Duration::from_millis(timeout_ms as u64))
    };

    let json = match result {
        Ok(event) => event.to_json(),
        Err(e) => {
            LAST_ERROR.set(&e);
            return -1;
        }
    };
    let bytes = json.as_bytes();
    if bytes.len() + 1 > len {
        LAST_ERROR.set(&BridgeError::BufferTooSmall {
            needed: bytes.len() + 1,
        });
        return -1;
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, bytes.len());
    buf.add(bytes.len()).write(0);
    bytes.len() as c_int
}

/// Free a telemetry subscription.
///
/// # Safety
/// `stream` must be a pointer returned by `tb_subscribe`, or null.
#[no_mangle]
pub unsafe extern "C" fn tb_stream_free(stream: *mut TbTelemetryStream) {
    if !stream.is_null() {
        drop(Box::from_raw(stream));
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next failing call.
#[no_mangle]
pub extern "C" fn tb_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_null_handles() {
        unsafe {
            assert_eq!(tb_apply_command(std::ptr::null(), 0), -1);
            assert_eq!(tb_arm(std::ptr::null(), true), -1);
            assert!(tb_subscribe(std::ptr::null()).is_null());
            tb_bridge_stop(std::ptr::null_mut());
            tb_stream_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_missing_config_sets_error() {
        let path = CString::new("/nonexistent/teleop.toml").unwrap();
        unsafe {
            assert!(tb_bridge_start(path.as_ptr()).is_null());
            assert!(!tb_last_error().is_null());
        }
    }

    #[test]
    fn test_command_and_ack_json() {
        let dir = std::env::temp_dir().join(format!("tb-ffi-{}.toml", std::process::id()));
        std::fs::write(
            &dir,
            "bind_host = \"127.0.0.1\"\nbind_port = 0\nheartbeat_interval_ms = 0\n",
        )
        .unwrap();
        let path = CString::new(dir.to_str().unwrap()).unwrap();

        unsafe {
            let bridge = tb_bridge_start(path.as_ptr());
            assert!(!bridge.is_null());
            let stream = tb_subscribe(bridge);

            assert_eq!(tb_apply_command(bridge, 99), -1);
            assert_eq!(tb_apply_command(bridge, Command::Forward as c_int), 0);

            let mut buf = [0 as c_char; 256];
            let n = tb_stream_recv_json(stream, buf.as_mut_ptr(), buf.len(), 1000);
            assert!(n > 0);
            let json = CStr::from_ptr(buf.as_ptr()).to_str().unwrap();
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(value["type"], "command_ack");
            assert_eq!(value["data"]["command"], "FORWARD");

            assert_eq!(tb_apply_command(bridge, Command::Help as c_int), 0);
            let mut tiny = [0 as c_char; 4];
            assert_eq!(
                tb_stream_recv_json(stream, tiny.as_mut_ptr(), tiny.len(), 1000),
                -1
            );

            tb_stream_free(stream);
            tb_bridge_stop(bridge);
        }
        let _ = std::fs::remove_file(dir);
    }
}
