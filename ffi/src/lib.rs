//! C-ABI wrapper around `tsnet-core`.
//!
//! # Overview
//! Exposes the request dispatcher through `extern "C"` functions so any
//! language with a C FFI can send requests and transfer files without
//! linking to Rust's async runtime directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - A handle owns its own tokio runtime. `tsnet_perform`, `tsnet_download`
//!   and `tsnet_upload` return immediately; a call that returns `Ok` later
//!   fires exactly one of its completion callbacks on a runtime worker
//!   thread. Any other return code means nothing was dispatched.
//! - Outcomes are lent to the callback and released when it returns, so
//!   the C caller never frees anything it receives.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tsnet_core::{
    ClientConfig, DefaultSecurityPolicy, HttpMethod, Outcome, Parameters, Progress, ProgressCallback,
    RequestDispatcher, UreqTransport,
};

use types::*;

/// Borrow a C string argument. `None` for null or non-UTF-8 input.
unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Dispatcher lifecycle
// ---------------------------------------------------------------------------

/// Create a dispatcher with its own runtime, bound to `base_url`.
///
/// `base_url` may be null and set later with `tsnet_set_base_url`.
/// Returns null if the runtime cannot be started or an internal panic
/// occurs. Free the handle with `tsnet_dispatcher_free`.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_dispatcher_new(base_url: *const c_char) -> *mut FfiDispatcher {
    catch_unwind(|| {
        let base_url = unsafe { str_arg(base_url) }.unwrap_or("");
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tsnet-ffi")
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "could not start runtime");
                return std::ptr::null_mut();
            }
        };
        let inner = Arc::new(RequestDispatcher::new(
            ClientConfig::new(base_url),
            Arc::new(UreqTransport::default()),
        ));
        Box::into_raw(Box::new(FfiDispatcher { runtime, inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a dispatcher created by `tsnet_dispatcher_new`. Safe to call with
/// null. Calls still in flight are abandoned and their callbacks may never
/// fire.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_dispatcher_free(dispatcher: *mut FfiDispatcher) {
    if !dispatcher.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let FfiDispatcher { runtime, inner } = *unsafe { Box::from_raw(dispatcher) };
            drop(inner);
            runtime.shutdown_background();
        }));
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Replace the base URL used by subsequent calls.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_set_base_url(
    dispatcher: *const FfiDispatcher,
    base_url: *const c_char,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || base_url.is_null() {
            return FfiErrorCode::NullArg;
        }
        let dispatcher = unsafe { &*dispatcher };
        let Some(base_url) = (unsafe { str_arg(base_url) }) else {
            return FfiErrorCode::InvalidArgument;
        };
        dispatcher.inner.set_base_url(base_url);
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// Set basic-auth credentials. A null `username` clears them.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_set_basic_auth(
    dispatcher: *const FfiDispatcher,
    username: *const c_char,
    password: *const c_char,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return FfiErrorCode::NullArg;
        }
        let dispatcher = unsafe { &*dispatcher };
        if username.is_null() {
            dispatcher.inner.clear_basic_auth();
            return FfiErrorCode::Ok;
        }
        let password = if password.is_null() {
            Some("")
        } else {
            unsafe { str_arg(password) }
        };
        let (Some(username), Some(password)) = (unsafe { str_arg(username) }, password) else {
            return FfiErrorCode::InvalidArgument;
        };
        dispatcher.inner.set_basic_auth(username, password);
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// Switch to the default security policy, with certificate verification
/// relaxed when `allow` is true.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_set_allow_invalid_certificates(
    dispatcher: *const FfiDispatcher,
    allow: bool,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return FfiErrorCode::NullArg;
        }
        let dispatcher = unsafe { &*dispatcher };
        let policy = if allow {
            DefaultSecurityPolicy::allowing_invalid_certificates()
        } else {
            DefaultSecurityPolicy::default()
        };
        dispatcher.inner.set_security_policy(Arc::new(policy));
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Lend the outcome to whichever callback matches it.
fn complete(
    outcome: Outcome,
    method: HttpMethod,
    on_success: FfiCompletionCallback,
    on_error: FfiCompletionCallback,
    user_data: UserData,
) {
    let owned = OwnedOutcome::from_core(&outcome, method);
    let ffi = owned.as_ffi();
    let callback = if outcome.is_success() { on_success } else { on_error };
    if let Some(callback) = callback {
        callback(user_data.get(), &ffi);
    }
}

fn progress_adapter(on_progress: FfiProgressCallback, user_data: UserData) -> Option<ProgressCallback> {
    let callback = on_progress?;
    Some(Arc::new(move |p: Progress| {
        callback(
            user_data.get(),
            to_i64(p.bytes),
            to_i64(p.total_bytes),
            p.total_expected.map_or(-1, to_i64),
        );
    }))
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Send `method` to `path` under the base URL.
///
/// `method` is an `FfiHttpMethod` discriminant. `params_json` is a JSON
/// object of parameters, or null for none. Returns `NullArg` if `dispatcher`
/// or `path` is null and `InvalidArgument` if `method` is out of range, a
/// string is not UTF-8 or `params_json` is not a JSON object.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_perform(
    dispatcher: *const FfiDispatcher,
    path: *const c_char,
    method: u32,
    params_json: *const c_char,
    on_success: FfiCompletionCallback,
    on_error: FfiCompletionCallback,
    user_data: *mut c_void,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || path.is_null() {
            return FfiErrorCode::NullArg;
        }
        let Ok(method) = FfiHttpMethod::try_from(method) else {
            return FfiErrorCode::InvalidArgument;
        };
        let dispatcher = unsafe { &*dispatcher };
        let Some(path) = (unsafe { str_arg(path) }) else {
            return FfiErrorCode::InvalidArgument;
        };
        let parameters: Parameters = if params_json.is_null() {
            Parameters::new()
        } else {
            let parsed = unsafe { str_arg(params_json) }
                .and_then(|json| serde_json::from_str(json).ok());
            match parsed {
                Some(parameters) => parameters,
                None => return FfiErrorCode::InvalidArgument,
            }
        };

        let inner = Arc::clone(&dispatcher.inner);
        let path = path.to_string();
        let method = HttpMethod::from(method);
        let user_data = UserData::new(user_data);
        dispatcher.runtime.spawn(async move {
            let outcome = inner.send(&path, method, &parameters).await;
            complete(outcome, method, on_success, on_error, user_data);
        });
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// Stream `source` (a path under the base URL, or an absolute URL) into the
/// local file `destination`.
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_download(
    dispatcher: *const FfiDispatcher,
    source: *const c_char,
    destination: *const c_char,
    on_progress: FfiProgressCallback,
    on_success: FfiCompletionCallback,
    on_error: FfiCompletionCallback,
    user_data: *mut c_void,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || source.is_null() || destination.is_null() {
            return FfiErrorCode::NullArg;
        }
        let dispatcher = unsafe { &*dispatcher };
        let (Some(source), Some(destination)) = (unsafe { str_arg(source) }, unsafe { str_arg(destination) })
        else {
            return FfiErrorCode::InvalidArgument;
        };

        let inner = Arc::clone(&dispatcher.inner);
        let source = source.to_string();
        let destination = destination.to_string();
        let user_data = UserData::new(user_data);
        dispatcher.runtime.spawn(async move {
            let on_progress = progress_adapter(on_progress, user_data);
            let outcome = inner.download(&source, &destination, on_progress).await;
            complete(outcome, HttpMethod::Get, on_success, on_error, user_data);
        });
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// POST the local file `source` to `destination` (a path under the base
/// URL, or an absolute URL).
#[unsafe(no_mangle)]
pub extern "C" fn tsnet_upload(
    dispatcher: *const FfiDispatcher,
    source: *const c_char,
    destination: *const c_char,
    on_progress: FfiProgressCallback,
    on_success: FfiCompletionCallback,
    on_error: FfiCompletionCallback,
    user_data: *mut c_void,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || source.is_null() || destination.is_null() {
            return FfiErrorCode::NullArg;
        }
        let dispatcher = unsafe { &*dispatcher };
        let (Some(source), Some(destination)) = (unsafe { str_arg(source) }, unsafe { str_arg(destination) })
        else {
            return FfiErrorCode::InvalidArgument;
        };

        let inner = Arc::clone(&dispatcher.inner);
        let source = source.to_string();
        let destination = destination.to_string();
        let user_data = UserData::new(user_data);
        dispatcher.runtime.spawn(async move {
            let on_progress = progress_adapter(on_progress, user_data);
            let outcome = inner.upload(&source, &destination, on_progress).await;
            complete(outcome, HttpMethod::Post, on_success, on_error, user_data);
        });
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
