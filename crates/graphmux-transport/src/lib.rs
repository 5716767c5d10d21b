//! graphmux transports - HTTP, restartable WebSocket, and the link chain.
//!
//! The link chain composes, outermost first: error observation, auth header
//! attachment, then transport selection (HTTP, WebSocket, or an
//! operation-type split). Composition order is a hard invariant so the
//! error observer sees failures from every inner link.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod http;
mod link;
mod ws;

pub use http::HttpTransport;
pub use link::{LinkChain, Route};
pub use ws::{ConnectionParams, RestartableTransport, SubscriptionStream};
