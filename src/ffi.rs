//! C ABI exported by the `cdylib`.
//!
//! `GetHardwareInfo` returns a buffer allocated with the C allocator. The
//! caller owns it from that point on and must hand it to `FreeResult` exactly
//! once. Passing any other pointer to `FreeResult`, or the same pointer twice,
//! is undefined behavior; debug builds detect it and abort.
//!
//! A backend that cannot be opened yields a null pointer. A null or non-UTF-8
//! input yields `{}`.

use crate::error::{BridgeError, Result};
use crate::filter::TokenSet;
use crate::monitor;
use crate::payload::EMPTY_PAYLOAD;
use std::ffi::{c_char, CStr};
use std::panic;
use std::ptr;
use tracing::{error, warn};

/// # Safety
///
/// `input` must be null or point to a NUL-terminated buffer that stays valid
/// and unmodified for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn GetHardwareInfo(input: *const c_char) -> *mut c_char {
    let result = panic::catch_unwind(|| {
        // SAFETY: forwarded caller contract.
        unsafe { hardware_info(input) }
    });
    match result {
        Ok(Some(text)) => buffer::into_foreign(&text),
        Ok(None) => ptr::null_mut(),
        Err(_) => {
            error!("panic while reading hardware info");
            ptr::null_mut()
        }
    }
}

/// # Safety
///
/// `ptr` must be null or a pointer returned by `GetHardwareInfo` that has not
/// been released yet.
#[no_mangle]
pub unsafe extern "C" fn FreeResult(ptr: *mut c_char) {
    // SAFETY: forwarded caller contract.
    if let Err(err) = unsafe { buffer::release(ptr) } {
        error!(error = %err, "FreeResult called with a foreign or released pointer");
        std::process::abort();
    }
}

/// Closes the sensor backend. A later `GetHardwareInfo` opens it again.
#[no_mangle]
pub extern "C" fn ShutdownHardwareInfo() {
    if panic::catch_unwind(monitor::shutdown).is_err() {
        error!("panic while shutting down the sensor backend");
    }
}

unsafe fn hardware_info(input: *const c_char) -> Option<String> {
    // SAFETY: forwarded caller contract.
    let tokens = match unsafe { decode_input(input) } {
        Ok(tokens) => tokens,
        Err(err) => {
            warn!(error = %err, "rejecting input buffer");
            return Some(EMPTY_PAYLOAD.to_string());
        }
    };
    if tokens.is_empty() {
        return Some(EMPTY_PAYLOAD.to_string());
    }

    monitor::with_monitor(|m| match m.payload(&tokens) {
        Ok(text) => Some(text),
        Err(err) => {
            error!(error = %err, "hardware info unavailable");
            None
        }
    })
}

unsafe fn decode_input(input: *const c_char) -> Result<TokenSet> {
    if input.is_null() {
        return Err(BridgeError::InvalidInput("null pointer".to_string()));
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let text = unsafe { CStr::from_ptr(input) }
        .to_str()
        .map_err(|err| BridgeError::InvalidInput(err.to_string()))?;
    Ok(TokenSet::decode(text))
}

/// Ownership transfer of text buffers through `malloc`/`free`.
pub mod buffer {
    use crate::error::Result;
    use std::ffi::c_char;
    use std::ptr;
    use tracing::error;

    /// Copies `text` into a new NUL-terminated C buffer. Null if allocation
    /// fails.
    pub fn into_foreign(text: &str) -> *mut c_char {
        let bytes = text.as_bytes();
        // SAFETY: plain allocation, checked for null below.
        let raw = unsafe { libc::malloc(bytes.len() + 1) } as *mut u8;
        if raw.is_null() {
            error!(len = bytes.len() + 1, "malloc failed for result buffer");
            return ptr::null_mut();
        }
        // SAFETY: `raw` holds `bytes.len() + 1` bytes and does not overlap `bytes`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), raw, bytes.len());
            *raw.add(bytes.len()) = 0;
        }
        ledger::track(raw as usize);
        raw as *mut c_char
    }

    /// Frees a buffer from [`into_foreign`]. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`into_foreign`] and not have been released.
    /// Debug builds return `ContractViolation` instead of freeing when that
    /// does not hold.
    pub unsafe fn release(ptr: *mut c_char) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        ledger::retire(ptr as usize)?;
        // SAFETY: allocated by `libc::malloc` in `into_foreign`.
        unsafe { libc::free(ptr as *mut libc::c_void) };
        Ok(())
    }

    #[cfg(debug_assertions)]
    mod ledger {
        use crate::error::{BridgeError, Result};
        use std::collections::BTreeSet;
        use std::sync::{Mutex, PoisonError};

        static OUTSTANDING: Mutex<BTreeSet<usize>> = Mutex::new(BTreeSet::new());

        pub fn track(addr: usize) {
            OUTSTANDING
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(addr);
        }

        pub fn retire(addr: usize) -> Result<()> {
            let removed = OUTSTANDING
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&addr);
            if !removed {
                return Err(BridgeError::ContractViolation(format!(
                    "{addr:#x} is not an outstanding result buffer"
                )));
            }
            Ok(())
        }
    }

    #[cfg(not(debug_assertions))]
    mod ledger {
        use crate::error::Result;

        pub fn track(_: usize) {}

        pub fn retire(_: usize) -> Result<()> {
            Ok(())
        }
    }

}
