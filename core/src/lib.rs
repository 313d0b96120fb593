//! Request dispatch with typed outcomes and tracked file transfers.
//!
//! # Overview
//! A `RequestDispatcher` holds a base URL, optional basic-auth credentials
//! and a security policy. It sends one-shot requests with any of the eight
//! HTTP verbs, streams downloads to disk and uploads from disk, and resolves
//! every call to exactly one `Outcome`.
//!
//! # Design
//! - Request construction (`request`) is pure and separate from I/O.
//! - The HTTP stack sits behind the `Transport` trait; `UreqTransport` is
//!   the default and runs on tokio's blocking pool.
//! - Configuration is snapshotted per request, so reconfiguring never
//!   changes where an in-flight request goes.
//! - `shared()` and `background()` are the process-wide dispatchers; any
//!   number of independent ones can be built with `RequestDispatcher::new`.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod outcome;
pub mod progress;
pub mod request;
pub mod security;
pub mod transport;

pub use config::{ClientConfig, Credentials, ParameterEncoding};
pub use dispatcher::{RequestDispatcher, TransferSpec};
pub use error::{NetworkError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use outcome::{Outcome, Payload};
pub use progress::{Progress, ProgressCallback};
pub use request::{build_request, Parameters, RequestSpec};
pub use security::{DefaultSecurityPolicy, PinnedHostPolicy, SecurityPolicy};
pub use transport::{Transport, UreqTransport};
