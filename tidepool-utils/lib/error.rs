use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a tidepool-utils operation.
pub type TidepoolUtilsResult<T> = Result<T, TidepoolUtilsError>;

/// An error that occurred in one of the shared utilities.
#[derive(pretty_error_debug::Debug, Error)]
pub enum TidepoolUtilsError {
    /// A duration string could not be parsed.
    #[error(transparent)]
    Duration(#[from] DurationError),
}

/// An error produced while parsing a duration string such as `1h30m`.
#[derive(pretty_error_debug::Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    /// The input was empty.
    #[error("empty duration string")]
    Empty,

    /// The input was negative.
    #[error("negative duration {0:?} is not allowed")]
    Negative(String),

    /// The input was not made of number/unit pairs.
    #[error("invalid duration {0:?}")]
    Invalid(String),

    /// A number was not followed by a unit.
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    /// A unit was not recognized.
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit {
        /// The offending unit.
        unit: String,

        /// The full input.
        input: String,
    },

    /// The value does not fit in 64 bits of nanoseconds.
    #[error("duration {0:?} is out of range")]
    Overflow(String),
}
