//! Core types, normalization, and error taxonomy for the media analytics engine.

pub mod config;
pub mod error;
pub mod events;
pub mod normalize;

pub use config::*;
pub use error::{Error, NormalizationError, Result};
pub use events::*;
pub use normalize::*;
