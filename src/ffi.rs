//! The native control surface: four `extern "C"` entry points a managed
//! host can call directly, each backed by a safe inner function on
//! [`RunContext`].
//!
//! Every entry point validates its pointer before dereferencing and wraps
//! its body in [`std::panic::catch_unwind`] so a bug in the core cannot
//! unwind across the FFI boundary into managed code.

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::context::RunContext;
use crate::diagnostic::{self, NoSymbols};

/// # Safety
/// `ctx` must be a valid, non-null pointer obtained from leaking a
/// `Box<RunContext>`, and must not be aliased by any other live reference
/// for the duration of this call.
#[no_mangle]
pub unsafe extern "C" fn heisen_enable(ctx: *mut RunContext) {
    guard(ctx, |ctx| ctx.enable());
}

/// # Safety
/// See [`heisen_enable`].
#[no_mangle]
pub unsafe extern "C" fn heisen_disable(ctx: *mut RunContext) {
    guard(ctx, |ctx| ctx.disable());
}

/// # Safety
/// See [`heisen_enable`].
#[no_mangle]
pub unsafe extern "C" fn heisen_set_total_method_count(ctx: *mut RunContext, n: u32) {
    guard(ctx, |ctx| ctx.config.total_methods = n as usize);
}

/// Returns a heap-allocated, NUL-terminated DOT document for the current
/// run state, or a null pointer on failure. The caller owns the returned
/// string and must release it with [`heisen_free_string`].
///
/// # Safety
/// See [`heisen_enable`].
#[no_mangle]
pub unsafe extern "C" fn heisen_dump_current_interleaving(ctx: *mut RunContext) -> *mut c_char {
    let document = guard(ctx, |ctx| diagnostic::emit(ctx, &NoSymbols));
    match document.and_then(|doc| CString::new(doc).ok()) {
        Some(cstring) => cstring.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Releases a string previously returned by [`heisen_dump_current_interleaving`].
///
/// # Safety
/// `s` must either be null or a pointer previously returned by
/// `heisen_dump_current_interleaving`, not yet freed.
#[no_mangle]
pub unsafe extern "C" fn heisen_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(CString::from_raw(s));
}

/// Checks `ctx` for null, then runs `body` under `catch_unwind`, logging
/// and swallowing any panic rather than letting it unwind across the FFI
/// boundary.
unsafe fn guard<T>(ctx: *mut RunContext, body: impl FnOnce(&mut RunContext) -> T) -> Option<T> {
    if ctx.is_null() {
        error!("heisen-core: FFI entry point called with a null RunContext pointer");
        return None;
    }
    let ctx = &mut *ctx;
    match panic::catch_unwind(AssertUnwindSafe(|| body(ctx))) {
        Ok(value) => Some(value),
        Err(_) => {
            error!("heisen-core: panic caught at the FFI boundary");
            None
        }
    }
}
