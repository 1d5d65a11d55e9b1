//! Unified result type for mainline.
//!
//! Type alias for `color_eyre::eyre::Result<T>`: colorized error output,
//! chain-able context via `.wrap_err()`, and automatic conversion from any
//! `std::error::Error`, including the typed errors in [`crate::error`].

use color_eyre::eyre::Result as EyreResult;

/// Standard result type used throughout mainline.
pub type Result<T> = EyreResult<T>;
