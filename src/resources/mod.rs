// src/resources/mod.rs

//! Resource hints, layout translation and batch script templates.
//!
//! - [`hint`] holds the validated `[stage.<name>.parallel]` request.
//! - [`layout`] turns a hint plus site hardware into a [`ResourceLayout`].
//! - [`template`] renders the backend job descriptor (a batch script).

pub mod hint;
pub mod layout;
pub mod template;

pub use hint::{DEFAULT_WALLTIME, ResourceHint, ThreadRequest};
pub use layout::{ResourceLayout, ThreadSource, threads_for_memory, translate};
pub use template::{BatchTemplate, ScriptValues};
