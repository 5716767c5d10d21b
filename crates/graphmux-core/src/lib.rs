//! graphmux core - configuration and auth plumbing for multi-client GraphQL.
//!
//! This crate provides:
//! - The per-client configuration model and its normalizer.
//! - The explicit execution context (server render vs browser).
//! - Auth token resolution with hook overrides and storage branching.
//! - Typed GraphQL operations, requests, and responses.
//! - The error taxonomy shared by every transport.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

mod auth;
mod config;
mod context;
mod error;
mod hooks;
mod operation;

pub use auth::{
    format_auth_value, resolve_auth_header_value, resolve_token, stored_token, SessionStore,
};
pub use config::{
    normalize, ClientConfig, ClientConfigSource, ConfigLoader, CookieAttributes, FetchPolicy,
    HttpLinkOptions, InMemoryCacheOptions, JsonConfigLoader, ModuleConfig, ModuleOptions,
    ModuleOptionsInput, RawClientConfig, TokenStorage, WsLinkOptions,
};
pub use context::{ExecutionContext, ExecutionSide};
pub use error::{
    ClientError, GraphqlError, GraphqlErrorLocation, GraphqlPathSegment, HttpErrorInfo, SetupError,
};
pub use hooks::{AuthEvent, ErrorEvent, Hooks};
pub use operation::{
    GraphqlOperation, GraphqlQuery, GraphqlRequest, GraphqlResponse, OperationKind,
};
