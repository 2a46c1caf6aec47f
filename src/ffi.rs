use crate::Control::{ControlReader, ControlWriter};
use crate::Core::alloc::RingSetRegistry;
use crate::Core::WaitOutcome;
use crate::KRing::Structs::Message_Structs::{header_len, seal_plain, KIND_PLAIN};
use crate::KRing::Structs::Direction;
use crate::KRing::{ControlConfig, Handle, Host, Mode, RingId, RingSetConfig};
use crate::error::{ErrorKind, RingError};
use std::ffi::{c_char, CStr};
use std::ptr;
use std::time::Duration;

// Error codes
pub const KRING_SUCCESS: i32 = 0;
pub const KRING_ERROR_NULL_POINTER: i32 = -1;
pub const KRING_ERROR_INVALID_ARG: i32 = -2;
pub const KRING_ERROR_BAD_NAME: i32 = -3;
pub const KRING_ERROR_UNKNOWN_RING_SET: i32 = -4;
pub const KRING_ERROR_INVALID_RING_ID: i32 = -5;
pub const KRING_ERROR_WRITE_TO_ALL: i32 = -6;
pub const KRING_ERROR_WRITER_ID: i32 = -7;
pub const KRING_ERROR_READER_ID: i32 = -8;
pub const KRING_ERROR_EXISTS: i32 = -9;
pub const KRING_ERROR_INVALID_CONFIG: i32 = -10;
pub const KRING_ERROR_BUSY: i32 = -11;
pub const KRING_ERROR_MAP: i32 = -12;
pub const KRING_ERROR_PROTOCOL: i32 = -13;
pub const KRING_ERROR_EMPTY: i32 = -14;
pub const KRING_ERROR_TIMED_OUT: i32 = -15;
pub const KRING_ERROR_INTERRUPTED: i32 = -16;
pub const KRING_ERROR_WRONG_MODE: i32 = -17;
pub const KRING_ERROR_FULL: i32 = -18;

pub const KRING_MODE_READ: i32 = 0;
pub const KRING_MODE_WRITE: i32 = 1;

pub const KRING_HOST_IN_PROCESS: i32 = 0;
pub const KRING_HOST_SHARED_MEMORY: i32 = 1;

pub const KRING_DIR_CLIENT: i32 = 1;
pub const KRING_DIR_SERVER: i32 = 2;

/// Error code for each error kind.
pub fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::BadName => KRING_ERROR_BAD_NAME,
        ErrorKind::UnknownRingSet => KRING_ERROR_UNKNOWN_RING_SET,
        ErrorKind::InvalidRingId => KRING_ERROR_INVALID_RING_ID,
        ErrorKind::WriteToAllRings => KRING_ERROR_WRITE_TO_ALL,
        ErrorKind::NoFreeWriterId => KRING_ERROR_WRITER_ID,
        ErrorKind::NoFreeReaderId => KRING_ERROR_READER_ID,
        ErrorKind::AlreadyExists => KRING_ERROR_EXISTS,
        ErrorKind::InvalidConfig => KRING_ERROR_INVALID_CONFIG,
        ErrorKind::Busy => KRING_ERROR_BUSY,
        ErrorKind::Map => KRING_ERROR_MAP,
        ErrorKind::Protocol => KRING_ERROR_PROTOCOL,
    }
}

fn report(err: RingError) -> i32 {
    eprintln!("FFI Error: {}", err);
    error_code(err.kind())
}

/// Handle to a registry instance (opaque pointer)
pub struct RegistryHandle {
    inner: RingSetRegistry,
}

/// Handle to a bound reader or writer (opaque pointer)
pub struct KringHandle {
    inner: Handle,
    /// The held message did not fit the caller's buffer last time.
    pending: bool,
}

unsafe fn name_arg<'a>(name: *const c_char) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    CStr::from_ptr(name).to_str().ok()
}

// -----------------------------------------------------------------------------
// Registry API
// -----------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn kring_registry_new() -> *mut RegistryHandle {
    Box::into_raw(Box::new(RegistryHandle {
        inner: RingSetRegistry::new(),
    }))
}

/// Free a registry. Handles opened from it stay usable.
#[no_mangle]
pub extern "C" fn kring_registry_free(registry: *mut RegistryHandle) {
    if !registry.is_null() {
        unsafe {
            let _ = Box::from_raw(registry);
        }
    }
}

/// Create a ring set.
///
/// # Arguments
/// * `host` - `KRING_HOST_IN_PROCESS` or `KRING_HOST_SHARED_MEMORY`.
///
/// # Returns
/// * 0 on success, negative error code otherwise.
#[no_mangle]
pub extern "C" fn kring_create(
    registry: *mut RegistryHandle,
    name: *const c_char,
    rings: u32,
    slots: u32,
    slot_size: u32,
    readers: u32,
    writers: u32,
    host: i32,
) -> i32 {
    if registry.is_null() || name.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    let Some(host) = host_arg(host) else {
        return KRING_ERROR_INVALID_ARG;
    };
    let config = RingSetConfig {
        rings: rings as usize,
        slots: slots as usize,
        slot_size: slot_size as usize,
        readers: readers as usize,
        writers: writers as usize,
        host,
    };
    let registry = unsafe { &(*registry).inner };
    match registry.create(name, config) {
        Ok(_) => KRING_SUCCESS,
        Err(e) => report(e),
    }
}

/// Attach to a shared-memory ring set created by another process.
#[no_mangle]
pub extern "C" fn kring_attach(registry: *mut RegistryHandle, name: *const c_char) -> i32 {
    if registry.is_null() || name.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    match unsafe { &(*registry).inner }.attach(name) {
        Ok(_) => KRING_SUCCESS,
        Err(e) => report(e),
    }
}

#[no_mangle]
pub extern "C" fn kring_teardown(registry: *mut RegistryHandle, name: *const c_char) -> i32 {
    if registry.is_null() || name.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    match unsafe { &(*registry).inner }.teardown(name) {
        Ok(()) => KRING_SUCCESS,
        Err(e) => report(e),
    }
}

// -----------------------------------------------------------------------------
// Handle API
// -----------------------------------------------------------------------------

/// Bind a reader or writer.
///
/// # Arguments
/// * `ring_id` - Ring index, or any negative value for every ring (readers only).
/// * `mode` - `KRING_MODE_READ` or `KRING_MODE_WRITE`.
/// * `out` - Receives the handle on success.
#[no_mangle]
pub extern "C" fn kring_open(
    registry: *mut RegistryHandle,
    name: *const c_char,
    ring_id: i32,
    mode: i32,
    out: *mut *mut KringHandle,
) -> i32 {
    if registry.is_null() || name.is_null() || out.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    let mode = match mode {
        KRING_MODE_READ => Mode::Read,
        KRING_MODE_WRITE => Mode::Write,
        _ => return KRING_ERROR_INVALID_ARG,
    };
    match unsafe { &(*registry).inner }.open(name, RingId::from_raw(ring_id), mode) {
        Ok(inner) => {
            let handle = Box::new(KringHandle { inner, pending: false });
            unsafe { *out = Box::into_raw(handle) };
            KRING_SUCCESS
        }
        Err(e) => report(e),
    }
}

/// Write one plain message.
///
/// # Returns
/// * Bytes stored (the message is cut to the slot size), or a negative error code.
#[no_mangle]
pub extern "C" fn kring_write_plain(handle: *mut KringHandle, data: *const u8, len: usize) -> i64 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return KRING_ERROR_NULL_POINTER as i64;
    }
    let Handle::Writer(writer) = (unsafe { &mut (*handle).inner }) else {
        return KRING_ERROR_WRONG_MODE as i64;
    };
    writer.write_plain(unsafe { bytes_arg(data, len) }) as i64
}

fn host_arg(host: i32) -> Option<Host> {
    match host {
        KRING_HOST_IN_PROCESS => Some(Host::InProcess),
        KRING_HOST_SHARED_MEMORY => Some(Host::SharedMemory),
        _ => None,
    }
}

fn wait_code(outcome: WaitOutcome) -> i32 {
    match outcome {
        WaitOutcome::Notified => KRING_SUCCESS,
        WaitOutcome::TimedOut => KRING_ERROR_TIMED_OUT,
        WaitOutcome::Interrupted => KRING_ERROR_INTERRUPTED,
    }
}

unsafe fn bytes_arg<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    }
}

/// Reserve a slot for a plain message and expose its payload area.
///
/// # Arguments
/// * `out_buf` - Receives the payload address; valid until `kring_write_second`.
/// * `out_len` - Receives the payload capacity.
///
/// Calling it again before `kring_write_second` returns the same area.
#[no_mangle]
pub extern "C" fn kring_write_first(handle: *mut KringHandle, out_buf: *mut *mut u8, out_len: *mut usize) -> i32 {
    if handle.is_null() || out_buf.is_null() || out_len.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Handle::Writer(writer) = (unsafe { &mut (*handle).inner }) else {
        return KRING_ERROR_WRONG_MODE;
    };
    let off = header_len(KIND_PLAIN);
    let slot = writer.write_first();
    unsafe {
        *out_buf = slot.as_mut_ptr().add(off);
        *out_len = slot.len() - off;
    }
    KRING_SUCCESS
}

/// Publish the slot reserved by `kring_write_first` with `len` payload bytes.
///
/// # Returns
/// * Bytes recorded (clamped to the capacity), or a negative error code.
/// * KRING_ERROR_INVALID_ARG when nothing is reserved.
#[no_mangle]
pub extern "C" fn kring_write_second(handle: *mut KringHandle, len: usize) -> i64 {
    if handle.is_null() {
        return KRING_ERROR_NULL_POINTER as i64;
    }
    let Handle::Writer(writer) = (unsafe { &mut (*handle).inner }) else {
        return KRING_ERROR_WRONG_MODE as i64;
    };
    if writer.reserved().is_none() {
        return KRING_ERROR_INVALID_ARG as i64;
    }
    let stored = seal_plain(writer.write_first(), len);
    writer.write_second();
    stored as i64
}

/// Write one packet slot; bytes beyond the slot capacity are cut.
///
/// # Arguments
/// * `dir` - `KRING_DIR_CLIENT` or `KRING_DIR_SERVER`.
#[no_mangle]
pub extern "C" fn kring_write_packet(handle: *mut KringHandle, dir: i32, data: *const u8, len: usize) -> i64 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return KRING_ERROR_NULL_POINTER as i64;
    }
    let Some(dir) = u8::try_from(dir).ok().and_then(Direction::from_u8) else {
        return KRING_ERROR_INVALID_ARG as i64;
    };
    let Handle::Writer(writer) = (unsafe { &mut (*handle).inner }) else {
        return KRING_ERROR_WRONG_MODE as i64;
    };
    writer.write_packet(dir, unsafe { bytes_arg(data, len) }) as i64
}

/// Write one decrypted record. `host` may be null.
#[no_mangle]
pub extern "C" fn kring_write_decrypted(
    handle: *mut KringHandle,
    id: i64,
    side: u8,
    host: *const c_char,
    data: *const u8,
    len: usize,
) -> i64 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return KRING_ERROR_NULL_POINTER as i64;
    }
    let host = if host.is_null() {
        None
    } else {
        match unsafe { CStr::from_ptr(host) }.to_str() {
            Ok(h) => Some(h),
            Err(_) => return KRING_ERROR_INVALID_ARG as i64,
        }
    };
    let Handle::Writer(writer) = (unsafe { &mut (*handle).inner }) else {
        return KRING_ERROR_WRONG_MODE as i64;
    };
    writer.write_decrypted(id, side, host, unsafe { bytes_arg(data, len) }) as i64
}

/// Copy the payload of the next message.
///
/// # Arguments
/// * `out_len` - Input: size of `out_buf`, Output: size of the payload.
///
/// # Returns
/// * 0 on success.
/// * KRING_ERROR_EMPTY when nothing is available.
/// * KRING_ERROR_INVALID_ARG if the buffer is too small; the message stays
///   held and the next call returns it again.
#[no_mangle]
pub extern "C" fn kring_next_plain(handle: *mut KringHandle, out_buf: *mut u8, out_len: *mut usize) -> i32 {
    if handle.is_null() || out_len.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let handle = unsafe { &mut *handle };
    let Handle::Reader(reader) = &mut handle.inner else {
        return KRING_ERROR_WRONG_MODE;
    };
    let max_len = unsafe { *out_len };

    let data = if handle.pending {
        reader.current().map(|m| m.payload())
    } else {
        reader.next_plain()
    };
    let Some(data) = data else {
        handle.pending = false;
        return KRING_ERROR_EMPTY;
    };

    unsafe { *out_len = data.len() };
    if data.len() > max_len || (out_buf.is_null() && !data.is_empty()) {
        handle.pending = true;
        return KRING_ERROR_INVALID_ARG;
    }
    if !data.is_empty() {
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), out_buf, data.len()) };
    }
    handle.pending = false;
    KRING_SUCCESS
}

/// 1 when a message is waiting, 0 when not, negative on error.
#[no_mangle]
pub extern "C" fn kring_avail(handle: *mut KringHandle) -> i32 {
    if handle.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    match unsafe { &(*handle).inner } {
        Handle::Reader(reader) => reader.avail() as i32,
        Handle::Writer(_) => KRING_ERROR_WRONG_MODE,
    }
}

#[no_mangle]
pub extern "C" fn kring_skips(handle: *mut KringHandle, out: *mut u64) -> i32 {
    if handle.is_null() || out.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    match unsafe { &(*handle).inner } {
        Handle::Reader(reader) => {
            unsafe { *out = reader.skips() };
            KRING_SUCCESS
        }
        Handle::Writer(_) => KRING_ERROR_WRONG_MODE,
    }
}

/// Sleep until data is published.
///
/// # Arguments
/// * `timeout_ms` - Negative waits forever.
#[no_mangle]
pub extern "C" fn kring_wait(handle: *mut KringHandle, timeout_ms: i64) -> i32 {
    if handle.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Handle::Reader(reader) = (unsafe { &(*handle).inner }) else {
        return KRING_ERROR_WRONG_MODE;
    };
    let timeout = (timeout_ms >= 0).then(|| Duration::from_millis(timeout_ms as u64));
    wait_code(reader.wait(timeout))
}

/// Close and free a handle.
#[no_mangle]
pub extern "C" fn kring_close(handle: *mut KringHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle); // Dropped automatically
        }
    }
}

// -----------------------------------------------------------------------------
// Control channel API
// -----------------------------------------------------------------------------

/// Handle to a bound control-channel writer or reader (opaque pointer)
pub enum KringControlHandle {
    Writer(ControlWriter),
    Reader {
        reader: ControlReader,
        /// The held message did not fit the caller's buffer last time.
        pending: bool,
    },
}

#[no_mangle]
pub extern "C" fn kring_control_create(
    registry: *mut RegistryHandle,
    name: *const c_char,
    nodes: u32,
    slot_size: u32,
    writers: u32,
    host: i32,
) -> i32 {
    if registry.is_null() || name.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    let Some(host) = host_arg(host) else {
        return KRING_ERROR_INVALID_ARG;
    };
    let config = ControlConfig {
        nodes: nodes as usize,
        slot_size: slot_size as usize,
        writers: writers as usize,
        host,
    };
    match unsafe { &(*registry).inner }.create_control(name, config) {
        Ok(_) => KRING_SUCCESS,
        Err(e) => report(e),
    }
}

#[no_mangle]
pub extern "C" fn kring_control_attach(registry: *mut RegistryHandle, name: *const c_char) -> i32 {
    if registry.is_null() || name.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    match unsafe { &(*registry).inner }.attach_control(name) {
        Ok(_) => KRING_SUCCESS,
        Err(e) => report(e),
    }
}

/// Bind the single reader (`KRING_MODE_READ`) or a writer.
#[no_mangle]
pub extern "C" fn kring_control_open(
    registry: *mut RegistryHandle,
    name: *const c_char,
    mode: i32,
    out: *mut *mut KringControlHandle,
) -> i32 {
    if registry.is_null() || name.is_null() || out.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let Some(name) = (unsafe { name_arg(name) }) else {
        return KRING_ERROR_BAD_NAME;
    };
    let chan = match unsafe { &(*registry).inner }.control(name) {
        Ok(chan) => chan,
        Err(e) => return report(e),
    };
    let bound = match mode {
        KRING_MODE_READ => chan.open_reader().map(|reader| KringControlHandle::Reader {
            reader,
            pending: false,
        }),
        KRING_MODE_WRITE => chan.open_writer().map(KringControlHandle::Writer),
        _ => return KRING_ERROR_INVALID_ARG,
    };
    match bound {
        Ok(handle) => {
            unsafe { *out = Box::into_raw(Box::new(handle)) };
            KRING_SUCCESS
        }
        Err(e) => report(e),
    }
}

/// Copy `data` into a free node and publish it.
///
/// # Returns
/// * 0 on success.
/// * KRING_ERROR_FULL when every node is in flight.
#[no_mangle]
pub extern "C" fn kring_control_send(handle: *mut KringControlHandle, data: *const u8, len: usize) -> i32 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return KRING_ERROR_NULL_POINTER;
    }
    let KringControlHandle::Writer(writer) = (unsafe { &mut *handle }) else {
        return KRING_ERROR_WRONG_MODE;
    };
    if writer.send(unsafe { bytes_arg(data, len) }) {
        KRING_SUCCESS
    } else {
        KRING_ERROR_FULL
    }
}

/// Copy the next control message. Same buffer contract as `kring_next_plain`.
#[no_mangle]
pub extern "C" fn kring_control_read(handle: *mut KringControlHandle, out_buf: *mut u8, out_len: *mut usize) -> i32 {
    if handle.is_null() || out_len.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let KringControlHandle::Reader { reader, pending } = (unsafe { &mut *handle }) else {
        return KRING_ERROR_WRONG_MODE;
    };
    let max_len = unsafe { *out_len };

    let data = if *pending { reader.current() } else { reader.read() };
    let Some(data) = data else {
        *pending = false;
        return KRING_ERROR_EMPTY;
    };

    unsafe { *out_len = data.len() };
    if data.len() > max_len || (out_buf.is_null() && !data.is_empty()) {
        *pending = true;
        return KRING_ERROR_INVALID_ARG;
    }
    if !data.is_empty() {
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), out_buf, data.len()) };
    }
    *pending = false;
    KRING_SUCCESS
}

/// Sleep until a message is published. Negative `timeout_ms` waits forever.
#[no_mangle]
pub extern "C" fn kring_control_wait(handle: *mut KringControlHandle, timeout_ms: i64) -> i32 {
    if handle.is_null() {
        return KRING_ERROR_NULL_POINTER;
    }
    let KringControlHandle::Reader { reader, .. } = (unsafe { &*handle }) else {
        return KRING_ERROR_WRONG_MODE;
    };
    let timeout = (timeout_ms >= 0).then(|| Duration::from_millis(timeout_ms as u64));
    wait_code(reader.wait(timeout))
}

#[no_mangle]
pub extern "C" fn kring_control_close(handle: *mut KringControlHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle);
        }
    }
}
