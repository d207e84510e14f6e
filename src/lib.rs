//! # flair-api - Flair home-automation REST client
//!
//! A Rust client for the Flair API. Entities (structures, rooms, vents, ...)
//! are reached through the link table published at the API root, and every
//! data request is authenticated with an OAuth2 client-credentials token.
//!
//! ## Features
//!
//! - Bearer token acquisition with caching until expiry
//! - Root link discovery, cached for the session and refreshed on demand
//! - Collection reads kept as per-type snapshots
//! - Attribute updates addressed by id or by human-readable name
//! - Structured error taxonomy and `tracing` instrumentation
//! - Snapshot save/load as a single JSON file
//!
//! ## Basic Usage
//!
//! ```no_run
//! use flair_api::{json, Client, Credentials, Target};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(Credentials::new("client-id", "client-secret"))?;
//!
//!     if client.is_auto_mode_enabled()? {
//!         println!("structure is in auto mode, vent changes may be overridden");
//!     }
//!
//!     // Name-based control resolves against the latest fetched snapshot
//!     client.fetch("vents")?;
//!     client.set_attributes(
//!         "vents",
//!         json!({"percent-open": 50}),
//!         Target::name("Living Room"),
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```no_run
//! use flair_api::{Client, Config, Credentials};
//! use std::time::Duration;
//!
//! let config = Config::new("https://api.flair.co").with_timeout(Duration::from_secs(10));
//! let client = Client::with_config(Credentials::new("id", "secret"), config)?;
//! # Ok::<(), flair_api::FlairError>(())
//! ```

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod links;
pub mod reader;
pub mod response;
pub mod rest;
pub mod snapshot;
pub mod token;

// Re-export main types for convenience
pub use client::Client;
pub use config::{Config, DEFAULT_API_ROOT};
pub use controller::{ControlPhase, EntityController, Target};
pub use error::{FlairError, Result};
pub use links::{LinkEntry, LinkResolver, LinkTable};
pub use reader::EntityReader;
pub use response::{Document, Resource};
pub use rest::ApiContext;
pub use snapshot::{SnapshotEntry, SnapshotFile, SnapshotStore};
pub use token::{Credentials, Token, TokenProvider};

// Re-export serde_json for convenience
pub use serde_json::json;
