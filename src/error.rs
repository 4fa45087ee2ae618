//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the stereo TGV crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pyramid scale factor {0} must lie strictly between 0 and 1")]
    InvalidScale(f32),

    #[error("Invalid solver dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Pyramid level {level} would be {width}x{height}, below the minimum of {min} pixels")]
    LevelTooSmall {
        level: usize,
        width: usize,
        height: usize,
        min: usize,
    },

    #[error("{what} is {width}x{height} but the solver expects {expected_width}x{expected_height}")]
    DimensionMismatch {
        what: &'static str,
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("The solver must be initialised before use")]
    NotInitialised,

    #[error("No images have been copied to the solver")]
    MissingImages,

    #[error("Could not parse solver parameters: {0}")]
    Params(#[from] toml::de::Error),

    #[error("Compute backend failure: {0}")]
    Backend(String),

    #[cfg(feature = "statistics")]
    #[error("Could not plot solver statistics: {0}")]
    Statistics(String),
}
