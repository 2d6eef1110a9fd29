use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WindowError>;

/// Coarse classification of a [`WindowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad values in the query itself (offsets, bucket counts).
    UserInput,
    /// The window specification cannot be executed.
    Configuration,
    /// Engine bug: an invariant did not hold.
    Internal,
    /// Spill file or decoding failures.
    Io,
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("incompatible frame bound types: {0}")]
    IncompatibleBoundTypes(String),

    #[error("invalid window frame: {0}")]
    InvalidFrame(String),

    #[error("window function {name} is not supported here: {reason}")]
    UnsupportedFunction { name: String, reason: String },

    #[error("unknown aggregate function: {0}")]
    UnknownFunction(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid engine config: {0}")]
    Config(String),

    #[error("internal window engine error: {0}")]
    Internal(String),

    #[error("buffer codec error: {0}")]
    Codec(String),

    #[error("spill io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    DataFusion(#[from] DataFusionError),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

impl WindowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WindowError::InvalidParameter(_) | WindowError::IncompatibleBoundTypes(_) => {
                ErrorKind::UserInput
            }
            WindowError::InvalidFrame(_)
            | WindowError::UnsupportedFunction { .. }
            | WindowError::UnknownFunction(_)
            | WindowError::InvalidArgument(_)
            | WindowError::Config(_) => ErrorKind::Configuration,
            WindowError::Internal(_) => ErrorKind::Internal,
            WindowError::Codec(_)
            | WindowError::Io(_)
            | WindowError::DataFusion(_)
            | WindowError::Arrow(_) => ErrorKind::Io,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        WindowError::Internal(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        WindowError::Codec(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            WindowError::InvalidParameter("LEAD offset cannot be NULL".into()).kind(),
            ErrorKind::UserInput
        );
        assert_eq!(WindowError::InvalidFrame("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(WindowError::internal("edge").kind(), ErrorKind::Internal);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(WindowError::from(io).kind(), ErrorKind::Io);
    }
}
