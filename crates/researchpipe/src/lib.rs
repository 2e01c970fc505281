//! Public facade crate for `researchpipe`.
//!
//! This crate intentionally contains no IO or provider-specific logic.
//! It re-exports the types/traits from `researchpipe-core` and exposes the
//! local implementations under `researchpipe::local`.

pub use researchpipe_core::*;

pub use researchpipe_local as local;
