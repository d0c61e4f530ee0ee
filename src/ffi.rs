//! C interface for plugin hosts.
//!
//! A host creates one bridge with [`midibridge_create`], polls it from its
//! update loop and releases it with [`midibridge_destroy`]. Nothing here
//! reports errors: every function answers with the same sentinels as
//! [`Bridge`], and a null bridge pointer behaves like an empty bridge.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::midi::{create_default_engine, DefaultMidiEngine};
use log::warn;
use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::{Mutex, PoisonError};

static NOT_READY_C: &[u8] = b"(not ready)\0";

/// Opaque bridge handed to C callers
pub struct FfiBridge {
    bridge: Bridge<DefaultMidiEngine>,
    name_buffer: Mutex<CString>,
}

impl FfiBridge {
    pub fn new(bridge: Bridge<DefaultMidiEngine>) -> Self {
        FfiBridge {
            bridge,
            name_buffer: Mutex::new(CString::default()),
        }
    }

    /// Stores `name` and returns a pointer that stays valid until the next
    /// name request on this bridge.
    fn hold_name(&self, name: String) -> *const c_char {
        let name = CString::new(name.replace('\0', " ")).unwrap_or_default();
        let mut buffer = self
            .name_buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *buffer = name;
        buffer.as_ptr()
    }
}

fn not_ready() -> *const c_char {
    NOT_READY_C.as_ptr() as *const c_char
}

fn index_from(index: i32) -> Option<usize> {
    usize::try_from(index).ok()
}

fn count_to_c(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Creates a bridge configured from `MIDIBRIDGE_*` environment variables.
#[no_mangle]
pub extern "C" fn midibridge_create() -> *mut FfiBridge {
    let config = BridgeConfig::load(None).unwrap_or_else(|e| {
        warn!("Using default configuration: {}", e);
        BridgeConfig::default()
    });
    let engine = create_default_engine(&config);
    let bridge = Bridge::with_strategy(engine, config.strategy);
    Box::into_raw(Box::new(FfiBridge::new(bridge)))
}

/// Closes every device and frees the bridge.
///
/// # Safety
///
/// `bridge` must be null or a pointer returned by [`midibridge_create`] that
/// has not been destroyed yet. It must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn midibridge_destroy(bridge: *mut FfiBridge) {
    if !bridge.is_null() {
        drop(Box::from_raw(bridge));
    }
}

/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_count_sources(bridge: *const FfiBridge) -> i32 {
    match bridge.as_ref() {
        Some(ffi) => count_to_c(ffi.bridge.count_sources()),
        None => 0,
    }
}

/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_count_destinations(bridge: *const FfiBridge) -> i32 {
    match bridge.as_ref() {
        Some(ffi) => count_to_c(ffi.bridge.count_destinations()),
        None => 0,
    }
}

/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_source_id_at_index(bridge: *const FfiBridge, index: i32) -> u32 {
    match (bridge.as_ref(), index_from(index)) {
        (Some(ffi), Some(index)) => ffi.bridge.source_id_at_index(index),
        _ => 0,
    }
}

/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_destination_id_at_index(
    bridge: *const FfiBridge,
    index: i32,
) -> u32 {
    match (bridge.as_ref(), index_from(index)) {
        (Some(ffi), Some(index)) => ffi.bridge.destination_id_at_index(index),
        _ => 0,
    }
}

/// Returns a NUL-terminated name, valid until the next name call on the
/// same bridge.
///
/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_source_name(bridge: *const FfiBridge, id: u32) -> *const c_char {
    match bridge.as_ref() {
        Some(ffi) => ffi.hold_name(ffi.bridge.source_name(id)),
        None => not_ready(),
    }
}

/// Returns a NUL-terminated name, valid until the next name call on the
/// same bridge.
///
/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_destination_name(
    bridge: *const FfiBridge,
    id: u32,
) -> *const c_char {
    match bridge.as_ref() {
        Some(ffi) => ffi.hold_name(ffi.bridge.destination_name(id)),
        None => not_ready(),
    }
}

/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_dequeue_incoming_message(bridge: *const FfiBridge) -> u64 {
    match bridge.as_ref() {
        Some(ffi) => ffi.bridge.dequeue_incoming_message(),
        None => 0,
    }
}

/// # Safety
///
/// `bridge` must be null or a live pointer from [`midibridge_create`].
#[no_mangle]
pub unsafe extern "C" fn midibridge_send_message(bridge: *const FfiBridge, message: u64) {
    if let Some(ffi) = bridge.as_ref() {
        ffi.bridge.send_message(message);
    }
}
