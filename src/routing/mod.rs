//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header)
//!     → host.rs (extract + normalize host)
//!     → registry.rs (host lookup in reconciled snapshot/store)
//!     → Return: matched Service or NoMatch
//!
//! Reconciliation (timer, invalidation hook, or per lookup):
//!     source.rs (env / file / inline JSON mapping)
//!     → upsert each host into the store
//!     → delete hosts missing from the source
//!     → swap snapshot
//! ```
//!
//! # Design Decisions
//! - Routing is by host only; paths are never rewritten
//! - The declarative source is authoritative for which hosts exist;
//!   the store owns everything else about a service
//! - Explicit NoMatch rather than silent default

pub mod host;
pub mod registry;
pub mod source;

pub use host::{parse_host, request_host};
pub use registry::{ReconcileReport, ServiceRegistry};
pub use source::{ServiceSource, SourceEntry, SourceError};
