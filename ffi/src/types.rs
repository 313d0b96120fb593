//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with C-compatible representations:
//! borrowed `*const c_char` instead of `String`, pointer plus length instead
//! of `Vec<u8>`, and enums with explicit discriminants. An `FfiOutcome` only
//! borrows from an `OwnedOutcome` that lives on the Rust side for the
//! duration of the completion callback, so C never frees anything it
//! receives.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tsnet_core::{HttpMethod, Outcome, Payload, RequestDispatcher, TransportError};

/// Opaque handle to a dispatcher and the runtime its requests run on. C
/// callers receive a pointer to this and pass it back into every FFI
/// function.
pub struct FfiDispatcher {
    pub(crate) runtime: Runtime,
    pub(crate) inner: Arc<RequestDispatcher>,
}

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Post = 0,
    Get = 1,
    Put = 2,
    Head = 3,
    Delete = 4,
    Trace = 5,
    Connect = 6,
    Patch = 7,
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Head => HttpMethod::Head,
            FfiHttpMethod::Delete => HttpMethod::Delete,
            FfiHttpMethod::Trace => HttpMethod::Trace,
            FfiHttpMethod::Connect => HttpMethod::Connect,
            FfiHttpMethod::Patch => HttpMethod::Patch,
        }
    }
}

/// C hands the method over as a plain integer; unknown values are returned
/// as the error.
impl TryFrom<u32> for FfiHttpMethod {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, u32> {
        Ok(match raw {
            0 => FfiHttpMethod::Post,
            1 => FfiHttpMethod::Get,
            2 => FfiHttpMethod::Put,
            3 => FfiHttpMethod::Head,
            4 => FfiHttpMethod::Delete,
            5 => FfiHttpMethod::Trace,
            6 => FfiHttpMethod::Connect,
            7 => FfiHttpMethod::Patch,
            other => return Err(other),
        })
    }
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Head => FfiHttpMethod::Head,
            HttpMethod::Delete => FfiHttpMethod::Delete,
            HttpMethod::Trace => FfiHttpMethod::Trace,
            HttpMethod::Connect => FfiHttpMethod::Connect,
            HttpMethod::Patch => FfiHttpMethod::Patch,
        }
    }
}

/// Return code of every FFI call, and the error category of an outcome.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NullArg = 1,
    InvalidArgument = 2,
    InvalidUrl = 3,
    Policy = 4,
    Transport = 5,
    Http = 6,
    Io = 7,
    Decode = 8,
    Task = 9,
    Panic = 10,
}

impl From<&TransportError> for FfiErrorCode {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::InvalidUrl { .. } => FfiErrorCode::InvalidUrl,
            TransportError::Policy(_) => FfiErrorCode::Policy,
            TransportError::Transport(_) => FfiErrorCode::Transport,
            TransportError::Status { .. } => FfiErrorCode::Http,
            TransportError::Io(_) => FfiErrorCode::Io,
            TransportError::Decode(_) => FfiErrorCode::Decode,
            TransportError::Task(_) => FfiErrorCode::Task,
        }
    }
}

/// The result of one dispatched call, as seen by a completion callback.
///
/// Every pointer is borrowed and only valid until the callback returns.
/// Absent strings are null. `http_status` is 0 when no response was
/// received. `body` holds the raw response bytes (empty for downloads,
/// whose content is at `file_path`).
#[repr(C)]
pub struct FfiOutcome {
    pub error_code: FfiErrorCode,
    pub error_message: *const c_char,
    pub method: FfiHttpMethod,
    pub url: *const c_char,
    pub http_status: u16,
    pub content_type: *const c_char,
    pub body: *const u8,
    pub body_len: usize,
    pub file_path: *const c_char,
}

/// Called exactly once per successfully dispatched call.
pub type FfiCompletionCallback =
    Option<extern "C" fn(user_data: *mut c_void, outcome: *const FfiOutcome)>;

/// Called from a runtime worker thread during transfers. `total_expected`
/// is -1 when the size is unknown.
pub type FfiProgressCallback = Option<
    extern "C" fn(user_data: *mut c_void, bytes: i64, total_bytes: i64, total_expected: i64),
>;

/// The caller's context pointer, carried to the worker thread untouched.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UserData(*mut c_void);

// SAFETY: the pointer is never dereferenced on the Rust side; the C caller
// is responsible for whatever it points to being usable from the callback
// thread.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    pub(crate) fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub(crate) fn get(self) -> *mut c_void {
        self.0
    }
}

/// Owns the strings and bytes an `FfiOutcome` points into.
#[derive(Debug)]
pub(crate) struct OwnedOutcome {
    error_code: FfiErrorCode,
    error_message: Option<CString>,
    method: FfiHttpMethod,
    url: Option<CString>,
    http_status: u16,
    content_type: Option<CString>,
    body: Vec<u8>,
    file_path: Option<CString>,
}

impl OwnedOutcome {
    /// `method` is reported when the outcome carries no request.
    pub(crate) fn from_core(outcome: &Outcome, method: HttpMethod) -> Self {
        let (error_code, error_message) = match outcome {
            Outcome::Success { .. } => (FfiErrorCode::Ok, None),
            Outcome::Failure { error, .. } => {
                (FfiErrorCode::from(&error.error), Some(c_string(&error.to_string())))
            }
        };
        let request = outcome.request();
        let response = outcome.response();
        let file_path = match outcome.result() {
            Some(Payload::File(path)) => Some(c_string(&path.to_string_lossy())),
            _ => None,
        };

        Self {
            error_code,
            error_message,
            method: request.map_or(method, |r| r.method).into(),
            url: request.map(|r| c_string(&r.url)),
            http_status: response.map_or(0, |r| r.status),
            content_type: response.and_then(|r| r.content_type()).map(c_string),
            body: response.map(|r| r.body.clone()).unwrap_or_default(),
            file_path,
        }
    }

    /// Borrowing view; must not outlive `self`.
    pub(crate) fn as_ffi(&self) -> FfiOutcome {
        FfiOutcome {
            error_code: self.error_code,
            error_message: as_ptr(&self.error_message),
            method: self.method,
            url: as_ptr(&self.url),
            http_status: self.http_status,
            content_type: as_ptr(&self.content_type),
            body: if self.body.is_empty() {
                ptr::null()
            } else {
                self.body.as_ptr()
            },
            body_len: self.body.len(),
            file_path: as_ptr(&self.file_path),
        }
    }
}

/// Interior NULs cannot cross into C; they are dropped.
fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn as_ptr(s: &Option<CString>) -> *const c_char {
    s.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}
