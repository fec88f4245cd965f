//! Error values propagated from commands up to the runner

use thiserror::Error;

use crate::config::ConfigError;
use crate::flags::FlagError;

/// Exit code for unclassified failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for usage errors, such as an unknown sub-command.
pub const EXIT_USAGE: i32 = 2;
/// Exit code used when a trapped signal terminated the run.
pub const EXIT_SIGNAL: i32 = 130;

/// Everything a command may return from `run`.
///
/// Dispatch never wraps or recovers these values; only the runner interprets them.
#[derive(Error, Debug)]
pub enum Error {
    /// Usage of the deepest command in the path should be printed.
    #[error("help requested")]
    Help,
    /// Terminate with the given code after printing the message.
    #[error("{message}")]
    Exit { code: i32, message: String },
    #[error(transparent)]
    Flag(#[from] FlagError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create an error which makes the runner exit with `code` after printing `message`.
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Error::Exit {
            code,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error returned by a command.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Other(err.into())
    }

    #[must_use]
    pub fn is_help(&self) -> bool {
        matches!(self, Error::Help)
    }

    /// Process exit code the runner uses for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Help => 0,
            Error::Exit { code, .. } => *code,
            Error::Flag(_) => EXIT_USAGE,
            Error::Config(_) | Error::Io(_) | Error::Other(_) => EXIT_FAILURE,
        }
    }
}

/// Build an [`Error::Exit`] from a code and a format string.
///
/// ```
/// let err = cmdtree::exitf!(2, "no hosts to ping were given");
/// assert_eq!(err.exit_code(), 2);
/// ```
#[macro_export]
macro_rules! exitf {
    ($code:expr, $($arg:tt)+) => {
        $crate::Error::exit($code, format!($($arg)+))
    };
}
