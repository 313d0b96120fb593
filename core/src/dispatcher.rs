//! The request dispatcher: configuration plus a transport.
//!
//! # Design
//! `RequestDispatcher` owns the current `ClientConfig` behind a lock and a
//! shared `Transport`. Every operation first takes an `Arc` snapshot of the
//! config and builds its `HttpRequest` from that snapshot, so setters called
//! while a request is in flight only affect later requests. The transport
//! call and all body I/O run on tokio's blocking pool; the async caller gets
//! back exactly one `Outcome`.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::Span;
use uuid::Uuid;

use crate::config::{ClientConfig, Credentials, ParameterEncoding};
use crate::error::{NetworkError, TransportError};
use crate::http::{HttpMethod, HttpRequest};
use crate::outcome::{Outcome, Payload};
use crate::progress::{ProgressCallback, ProgressReader};
use crate::request::{build_request, Parameters, RequestSpec};
use crate::security::SecurityPolicy;
use crate::transport::{StreamingResponse, Transport, UploadStream, UreqTransport};

static SHARED: Lazy<RequestDispatcher> = Lazy::new(RequestDispatcher::default);
static BACKGROUND: Lazy<RequestDispatcher> = Lazy::new(RequestDispatcher::default);

/// A download or upload: where the bytes come from, where they go, and who
/// hears about progress.
///
/// For downloads `source` is a URL (or a path under the base URL) and
/// `destination` a local file; uploads are the other way round.
#[derive(Clone)]
pub struct TransferSpec {
    pub source: String,
    pub destination: String,
    pub on_progress: Option<ProgressCallback>,
}

impl TransferSpec {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }
}

impl fmt::Debug for TransferSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSpec")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

pub struct RequestDispatcher {
    config: RwLock<Arc<ClientConfig>>,
    transport: Arc<dyn Transport>,
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new(ClientConfig::default(), Arc::new(UreqTransport::default()))
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("config", &self.config())
            .field("transport", &self.transport)
            .finish()
    }
}

impl RequestDispatcher {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            transport,
        }
    }

    /// Process-wide dispatcher for ordinary requests.
    pub fn shared() -> &'static RequestDispatcher {
        &SHARED
    }

    /// Process-wide dispatcher for uploads and downloads, configured
    /// independently of `shared()`.
    pub fn background() -> &'static RequestDispatcher {
        &BACKGROUND
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<ClientConfig> {
        let current = self.config.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    fn update(&self, change: impl FnOnce(ClientConfig) -> ClientConfig) {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let next = change(ClientConfig::clone(&**current));
        *current = Arc::new(next);
    }

    /// Replace base URL and credentials; the security policy is only
    /// replaced when one is given.
    pub fn configure(
        &self,
        base_url: &str,
        credentials: Option<Credentials>,
        security_policy: Option<Arc<dyn SecurityPolicy>>,
    ) {
        self.update(|config| {
            let config = config.with_base_url(base_url).with_credentials(credentials);
            match security_policy {
                Some(policy) => config.with_security_policy(policy),
                None => config,
            }
        });
    }

    pub fn set_base_url(&self, base_url: &str) {
        self.update(|config| config.with_base_url(base_url));
    }

    pub fn set_basic_auth(&self, username: &str, password: &str) {
        self.update(|config| config.with_credentials(Some(Credentials::new(username, password))));
    }

    pub fn clear_basic_auth(&self) {
        self.update(|config| config.with_credentials(None));
    }

    pub fn set_security_policy(&self, policy: Arc<dyn SecurityPolicy>) {
        self.update(|config| config.with_security_policy(policy));
    }

    pub fn set_parameter_encoding(&self, encoding: ParameterEncoding) {
        self.update(|config| config.with_parameter_encoding(encoding));
    }

    /// Send `method` to `path` under the base URL.
    pub async fn send(&self, path: &str, method: HttpMethod, parameters: &Parameters) -> Outcome {
        self.send_spec(RequestSpec::new(path, method).with_parameters(parameters.clone()))
            .await
    }

    pub async fn send_spec(&self, spec: RequestSpec) -> Outcome {
        let config = self.config();
        let request = match prepare(&config, &spec) {
            Ok(request) => request,
            Err(error) => return rejected(error),
        };
        let transport = Arc::clone(&self.transport);
        let policy = Arc::clone(config.security_policy());

        run_blocking(request, move |request| {
            let response = transport
                .execute(&request, None, policy.as_ref())
                .and_then(|streaming| streaming.into_response().map_err(TransportError::from));
            match response {
                Ok(response) => Outcome::from_response(request, response),
                Err(error) => Outcome::failure(NetworkError::new(error).with_request(request)),
            }
        })
        .await
    }

    /// Stream `source` into the local file `destination`.
    pub async fn download(
        &self,
        source: &str,
        destination: impl AsRef<Path>,
        on_progress: Option<ProgressCallback>,
    ) -> Outcome {
        let destination = destination.as_ref().to_path_buf();
        let config = self.config();
        let request = match prepare(&config, &RequestSpec::new(source, HttpMethod::Get)) {
            Ok(request) => request,
            Err(error) => return rejected(error),
        };
        let transport = Arc::clone(&self.transport);
        let policy = Arc::clone(config.security_policy());

        run_blocking(request, move |request| {
            let streaming = match transport.execute(&request, None, policy.as_ref()) {
                Ok(streaming) => streaming,
                Err(error) => return Outcome::failure(NetworkError::new(error).with_request(request)),
            };
            if !(200..300).contains(&streaming.status) {
                return match streaming.into_response() {
                    Ok(response) => Outcome::from_response(request, response),
                    Err(error) => Outcome::failure(NetworkError::new(error.into()).with_request(request)),
                };
            }
            let head = streaming.head();
            match save(streaming, &destination, on_progress) {
                Ok(written) => {
                    tracing::debug!(bytes = written, path = %destination.display(), "download stored");
                    Outcome::Success {
                        result: Payload::File(destination),
                        request,
                        response: head,
                    }
                }
                Err(error) => Outcome::failure(
                    NetworkError::new(error.into())
                        .with_request(request)
                        .with_response(head),
                ),
            }
        })
        .await
    }

    /// POST the local file `source` to `destination`.
    pub async fn upload(
        &self,
        source: impl AsRef<Path>,
        destination: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Outcome {
        let source = source.as_ref().to_path_buf();
        let config = self.config();
        let mut request = match prepare(&config, &RequestSpec::new(destination, HttpMethod::Post)) {
            Ok(request) => request,
            Err(error) => return rejected(error),
        };
        request
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
        request
            .headers
            .push(("Content-Type".to_string(), "application/octet-stream".to_string()));
        let transport = Arc::clone(&self.transport);
        let policy = Arc::clone(config.security_policy());

        run_blocking(request, move |request| {
            let upload = match open_upload(&source, on_progress) {
                Ok(upload) => upload,
                Err(error) => return Outcome::failure(NetworkError::new(error.into()).with_request(request)),
            };
            let response = transport
                .execute(&request, Some(upload), policy.as_ref())
                .and_then(|streaming| streaming.into_response().map_err(TransportError::from));
            match response {
                Ok(response) => Outcome::from_response(request, response),
                Err(error) => Outcome::failure(NetworkError::new(error).with_request(request)),
            }
        })
        .await
    }

    pub async fn download_spec(&self, spec: TransferSpec) -> Outcome {
        self.download(&spec.source, &spec.destination, spec.on_progress).await
    }

    pub async fn upload_spec(&self, spec: TransferSpec) -> Outcome {
        self.upload(&spec.source, &spec.destination, spec.on_progress).await
    }
}

/// Build the request and let the security policy veto it.
fn prepare(config: &ClientConfig, spec: &RequestSpec) -> Result<HttpRequest, NetworkError> {
    let request = build_request(config, spec)?;
    if let Err(reason) = config.security_policy().evaluate(&request) {
        return Err(NetworkError::new(TransportError::Policy(reason)).with_request(request));
    }
    Ok(request)
}

fn rejected(error: NetworkError) -> Outcome {
    tracing::warn!(%error, "request not dispatched");
    Outcome::failure(error)
}

/// Run `task` on the blocking pool inside a per-request span and log how it
/// ended.
async fn run_blocking<F>(request: HttpRequest, task: F) -> Outcome
where
    F: FnOnce(HttpRequest) -> Outcome + Send + 'static,
{
    let request_id = Uuid::new_v4();
    let span = tracing::debug_span!(
        "dispatch",
        %request_id,
        method = %request.method,
        url = %request.url
    );
    let fallback = request.clone();
    let task_span = span.clone();
    let joined = tokio::task::spawn_blocking(move || task_span.in_scope(|| task(request))).await;

    let outcome = joined.unwrap_or_else(|e| {
        Outcome::failure(NetworkError::new(TransportError::Task(e.to_string())).with_request(fallback))
    });
    log_outcome(&span, &outcome);
    outcome
}

fn log_outcome(span: &Span, outcome: &Outcome) {
    span.in_scope(|| match outcome {
        Outcome::Success { response, .. } => tracing::debug!(status = response.status, "request completed"),
        Outcome::Failure { error, .. } => tracing::warn!(%error, "request failed"),
    });
}

/// Write the body to a hidden `.part` file next to `destination`, then
/// rename it into place. The partial file is removed on any error or panic.
fn save(
    streaming: StreamingResponse,
    destination: &Path,
    on_progress: Option<ProgressCallback>,
) -> io::Result<u64> {
    let partial = partial_path(destination)?;
    let mut guard = PartialFile {
        path: &partial,
        keep: false,
    };
    let written = write_partial(streaming, &partial, on_progress)?;
    fs::rename(&partial, destination)?;
    guard.keep = true;
    Ok(written)
}

/// Removes the partial file when dropped, including while unwinding from a
/// panicking progress callback, unless it was renamed into place.
struct PartialFile<'a> {
    path: &'a Path,
    keep: bool,
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if !self.keep {
            fs::remove_file(self.path).ok();
        }
    }
}

fn write_partial(
    streaming: StreamingResponse,
    partial: &Path,
    on_progress: Option<ProgressCallback>,
) -> io::Result<u64> {
    let expected = streaming.content_length();
    let mut reader = ProgressReader::new(streaming.body, expected, on_progress);
    let mut file = BufWriter::new(File::create(partial)?);
    let written = io::copy(&mut reader, &mut file)?;
    file.flush()?;

    if let Some(expected) = expected {
        if written < expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended after {written} of {expected} bytes"),
            ));
        }
    }
    Ok(written)
}

fn partial_path(destination: &Path) -> io::Result<PathBuf> {
    let name = destination.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination `{}` has no file name", destination.display()),
        )
    })?;
    let partial = format!(".{}.{}.part", name.to_string_lossy(), Uuid::new_v4().simple());
    Ok(destination.with_file_name(partial))
}

fn open_upload(source: &Path, on_progress: Option<ProgressCallback>) -> io::Result<UploadStream> {
    let file = File::open(source)?;
    let length = file.metadata()?.len();
    Ok(UploadStream {
        reader: Box::new(ProgressReader::new(file, Some(length), on_progress)),
        length,
    })
}
