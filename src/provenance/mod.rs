// src/provenance/mod.rs

//! Durable per-stage history under `<root>/<project>/`.
//!
//! - [`layout`]: deterministic path functions.
//! - [`record`]: what is stored per successful attempt.
//! - [`snapshot`]: version state of tracked source trees.
//! - [`store`]: reading/writing through the [`FileSystem`](crate::fs::FileSystem) seam.

pub mod layout;
pub mod record;
pub mod snapshot;
pub mod store;

pub use layout::ProjectLayout;
pub use record::{ProvenanceRecord, StageSnapshot};
pub use snapshot::{EnvSnapshot, GitProbe, TrackedVersion, VersionProbe};
pub use store::{COMPLETED_MARKER, ProvenanceStore};
