//! JSONL request dispatch for client sessions.
//!
//! Every accepted connection gets a [`Session`]. The session's first request
//! must be `Admin` v3 `Login`; afterwards each request line names a facade,
//! version, optional resource id, and method:
//!
//! ```json
//! {"request_id":1,"facade":"Admin","version":3,"method":"Login","params":{"auth_tag":"user-admin","credentials":"hunter2"}}
//! {"request_id":2,"facade":"Client","version":1,"method":"WatchAll"}
//! {"request_id":3,"facade":"AllWatcher","version":2,"id":"1","method":"Next"}
//! ```
//!
//! Each line is answered by exactly one response carrying the same
//! `request_id`. Responses may arrive out of order when requests block.

mod errors;
mod handler;
mod request;
mod response;
mod session;

pub use self::errors::DispatchError;
pub use self::handler::{SessionConnectionHandler, SessionSettings};
pub use self::session::{Collaborators, Session};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
