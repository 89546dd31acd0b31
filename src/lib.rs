//! Server side of the OCI Distribution Specification v1.0, compatible
//! with the Docker Registry HTTP API v2.
//!
//! Images are stored on the local filesystem in a content-addressed
//! layout rooted at a configurable base directory; there is no external
//! database. The crate exposes the router so the whole HTTP surface can
//! be driven in-process:
//!
//! ```no_run
//! use std::sync::Arc;
//! use oci_registry::config::Config;
//! use oci_registry::utils::state::AppState;
//!
//! let config = Config {
//!     host: "localhost".into(),
//!     port: 5080,
//!     storage_backend: "FILESYSTEM".into(),
//!     root_dir: "testdata".into(),
//! };
//! let app = oci_registry::api::create_router(Arc::new(AppState::new(config)));
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod grammar;
pub mod manifest;
pub mod service;
pub mod storage;
pub mod utils;
