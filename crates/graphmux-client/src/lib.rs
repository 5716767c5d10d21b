//! graphmux clients - one configured GraphQL client per name.
//!
//! This crate provides:
//! - The normalized query cache with snapshot extraction and restoration
//!   across the server/browser render boundary.
//! - The client registry owning every constructed client for the
//!   process/request lifetime.
//! - The session lifecycle controller (login, logout, token read).
//! - One-shot query accessors with in-flight deduplication.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod accessor;
mod cache;
mod client;
mod registry;
mod session;

pub use accessor::{AsyncQuery, AsyncQueryOptions};
pub use cache::{CacheSnapshot, QueryCache};
pub use client::{cache_key, GraphClient};
pub use registry::{ClientRegistry, RegistryEntry, RenderPayload};
pub use session::SessionController;
