//! Connection handler that serves a session over a JSONL stream.
//!
//! The handler reads request lines until the peer disconnects. Each request
//! runs on its own scoped thread so a blocking `Next` never holds up later
//! requests on the same connection; responses are serialized through a shared
//! writer and correlated by `request_id`. When the stream ends the session's
//! resources are stopped first, which releases any pending `Next`, and only
//! then are the request threads joined.

use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::thread::{self, Scope};
use std::time::Duration;

use keel_config::Config;
use keel_rpc_types::{ErrorCode, Request, Response};
use tracing::{debug, warn};

use crate::health::HealthReporter;
use crate::registry::FacadeRegistry;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::parse_request;
use super::response::ResponseWriter;
use super::session::{Collaborators, Session};

const READ_CHUNK: usize = 4096;

type SharedWriter = Mutex<ResponseWriter<ConnectionStream>>;

/// Limits applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Largest accepted request line, excluding the newline.
    pub max_request_bytes: usize,
    /// Poll interval for watchers created by the session.
    pub watcher_poll: Duration,
}

impl SessionSettings {
    /// Reads the limits from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_request_bytes: config.max_request_bytes(),
            watcher_poll: config.watcher_poll_interval(),
        }
    }
}

/// Serves one [`Session`] per accepted connection.
pub struct SessionConnectionHandler {
    registry: Arc<FacadeRegistry>,
    collaborators: Collaborators,
    reporter: Arc<dyn HealthReporter>,
    settings: SessionSettings,
}

impl std::fmt::Debug for SessionConnectionHandler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SessionConnectionHandler")
            .field("facades", &self.registry.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionConnectionHandler {
    /// Creates a handler sharing `registry` and `collaborators` across
    /// connections.
    #[must_use]
    pub fn new(
        registry: Arc<FacadeRegistry>,
        collaborators: Collaborators,
        reporter: Arc<dyn HealthReporter>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            registry,
            collaborators,
            reporter,
            settings,
        }
    }

    fn serve(&self, stream: ConnectionStream) {
        let peer = stream.peer();
        self.reporter.connection_opened(&peer);
        let writer = match stream.try_clone() {
            Ok(clone) => Mutex::new(ResponseWriter::new(clone)),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, %peer, "failed to clone connection");
                return;
            }
        };
        let session = Session::new(
            Arc::clone(&self.registry),
            self.collaborators.clone(),
            self.settings.watcher_poll,
        );

        let stopped = thread::scope(|scope| {
            let mut reader = RequestReader::new(stream, self.settings.max_request_bytes);
            read_requests(scope, &mut reader, &session, &writer);
            session.close()
        });
        self.reporter.connection_closed(&peer, stopped);
    }
}

impl ConnectionHandler for SessionConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

fn read_requests<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    reader: &mut RequestReader<ConnectionStream>,
    session: &'env Session,
    writer: &'env SharedWriter,
) {
    loop {
        match reader.next_line() {
            Ok(Some(line)) => match parse_request(&line) {
                Ok(Some(request)) => spawn_request(scope, session, writer, request),
                Ok(None) => {}
                Err(rejected) => {
                    warn!(target: DISPATCH_TARGET, error = %rejected.error, "rejected request line");
                    send_error(writer, rejected.request_id, &rejected.error);
                }
            },
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client closed connection");
                return;
            }
            Err(error) => {
                if error.code() == ErrorCode::BadRequest {
                    send_error(writer, None, &error);
                }
                if error.closes_connection() {
                    warn!(target: DISPATCH_TARGET, %error, "closing connection");
                    return;
                }
                warn!(target: DISPATCH_TARGET, %error, "skipping unreadable request line");
            }
        }
    }
}

fn spawn_request<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    session: &'env Session,
    writer: &'env SharedWriter,
    request: Request,
) {
    let request_id = request.request_id;
    let spawned = thread::Builder::new()
        .name(format!("keel-request-{request_id}"))
        .spawn_scoped(scope, move || {
            let response = session.handle(request);
            send(writer, &response);
        });
    if let Err(error) = spawned {
        warn!(target: DISPATCH_TARGET, %error, request_id, "failed to spawn request thread");
        let failure = DispatchError::internal(format!("failed to schedule request: {error}"));
        send_error(writer, Some(request_id), &failure);
    }
}

fn send(writer: &SharedWriter, response: &Response) {
    with_writer(writer, |guard| guard.write_response(response));
}

fn send_error(writer: &SharedWriter, request_id: Option<u64>, error: &DispatchError) {
    with_writer(writer, |guard| guard.write_error(request_id, error.to_body()));
}

fn with_writer(
    writer: &SharedWriter,
    write: impl FnOnce(&mut ResponseWriter<ConnectionStream>) -> Result<(), DispatchError>,
) {
    let Ok(mut guard) = writer.lock() else {
        warn!(target: DISPATCH_TARGET, "response writer lock poisoned");
        return;
    };
    if let Err(error) = write(&mut *guard) {
        debug!(target: DISPATCH_TARGET, %error, "failed to write response");
    }
}

/// Splits a byte stream into bounded JSONL lines.
///
/// Bytes following a newline are kept for the next call, so pipelined
/// requests arriving in one read are all served.
#[derive(Debug)]
pub(crate) struct RequestReader<R> {
    reader: R,
    buffer: Vec<u8>,
    max_bytes: usize,
    eof: bool,
}

impl<R: Read> RequestReader<R> {
    pub(crate) fn new(reader: R, max_bytes: usize) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            max_bytes,
            eof: false,
        }
    }

    /// Returns the next line including its newline, the unterminated tail at
    /// end of stream, or `None` once the stream is exhausted.
    pub(crate) fn next_line(&mut self) -> Result<Option<Vec<u8>>, DispatchError> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                enforce_limit(pos, self.max_bytes)?;
                return Ok(Some(self.buffer.drain(..=pos).collect()));
            }
            enforce_limit(self.buffer.len(), self.max_bytes)?;
            if self.eof {
                return Ok((!self.buffer.is_empty()).then(|| std::mem::take(&mut self.buffer)));
            }
            let read = read_with_retry(&mut self.reader, &mut chunk)?;
            if read == 0 {
                self.eof = true;
            } else {
                self.buffer.extend_from_slice(&chunk[..read]);
            }
        }
    }
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Enforces the maximum request size limit.
fn enforce_limit(size: usize, max_size: usize) -> Result<(), DispatchError> {
    if size > max_size {
        return Err(DispatchError::request_too_large(size, max_size));
    }
    Ok(())
}
