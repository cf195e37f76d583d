//! Connection handlers used by the listener tests.

use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;

use super::{ConnectionHandler, ConnectionStream};

/// Records each connection's peer and echoes every line back upper-cased
/// until the client disconnects.
///
/// Holding a connection open keeps its handler thread busy, which lets tests
/// check that one idle client never blocks another.
#[derive(Debug, Default)]
pub(crate) struct EchoHandler {
    peers: Mutex<Vec<String>>,
}

impl EchoHandler {
    /// Peers seen so far, in accept order.
    pub(crate) fn peers(&self) -> Vec<String> {
        self.peers.lock().expect("peer log poisoned").clone()
    }
}

impl ConnectionHandler for EchoHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.peers
            .lock()
            .expect("peer log poisoned")
            .push(stream.peer());
        let Ok(mut writer) = stream.try_clone() else {
            return;
        };
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else {
                return;
            };
            if writeln!(writer, "{}", line.to_uppercase()).is_err() {
                return;
            }
        }
    }
}
