//! Configuration types for the remote media sources mediagate can fetch from.
//!
//! A media file is identified by an [`ObjectKey`] and can be served out of any
//! of the configured [`SourceConfig`]s.

mod key;
mod sources;

pub use key::*;
pub use sources::*;
