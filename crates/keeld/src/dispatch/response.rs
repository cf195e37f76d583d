//! Response serialization for the dispatch loop.

use std::io::Write;

use keel_rpc_types::{ErrorBody, Response};

use super::errors::DispatchError;

/// Writer that frames responses as JSONL lines.
///
/// Every response is flushed immediately so a pending watcher result is not
/// held back behind later output.
#[derive(Debug)]
pub(crate) struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub(crate) fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one response line and flushes the stream.
    pub(crate) fn write_response(&mut self, response: &Response) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, response)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes an error response.
    pub(crate) fn write_error(
        &mut self,
        request_id: Option<u64>,
        error: ErrorBody,
    ) -> Result<(), DispatchError> {
        self.write_response(&Response::failure(request_id, error))
    }
}
