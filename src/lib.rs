#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! wrp-gateway library: HTTP to WDMP/WRP translation for an XMiDT cluster.
//!
//! This library exposes the building blocks the binary wires together:
//! - `wdmp`: WDMP command deduction and validation
//! - `device_id` / `wrp` / `envelope`: WRP message construction and codec
//! - `transactor` / `acquire`: outbound cluster calls and credentials
//! - `response`: turning cluster answers into HTTP responses
//! - `pipeline`: stat and translation request pipelines
//! - `webhook`: webhook registrations and the legacy v2 shim
//! - `auth` / `tid`: inbound middleware
//! - `routes`: REST API route handlers
//! - `config`: configuration loading

pub mod acquire;
pub mod auth;
pub mod config;
pub mod device_id;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod response;
pub mod routes;
pub mod state;
pub mod tid;
pub mod transactor;
pub mod wdmp;
pub mod webhook;
pub mod wrp;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use error::GatewayError;
pub use routes::router;
pub use state::AppState;
