//! Error types for bundler operations.
//!
//! Provides contextual error chaining, filesystem-specific errors with the
//! offending path, and the disk-image failures raised by host tools.
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages
//!
//! # Example
//!
//! ```no_run
//! use cpu_limiter_bundler::bundler::{Context, ErrorExt, Result};
//! use std::path::Path;
//!
//! fn read_descriptor(path: &Path) -> Result<String> {
//!     let contents = std::fs::read_to_string(path)
//!         .fs_context("reading descriptor", path)?;
//!     Ok(contents)
//! }
//!
//! fn first_line(path: &Path) -> Result<String> {
//!     let contents = read_descriptor(path).context("loading Info.plist")?;
//!     contents
//!         .lines()
//!         .next()
//!         .map(str::to_owned)
//!         .context("descriptor is empty")
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
    time::Duration,
};
use thiserror::Error as DeriveError;

/// Errors returned by the bundler.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// The source executable does not exist or is not a regular file.
    ///
    /// Raised before any output directory is created.
    #[error("binary not found at {}", path.display())]
    MissingBinary {
        /// Path that was expected to hold the compiled executable
        path: PathBuf,
    },

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Context describing the operation (e.g., "creating bundle directory")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// A disk-image tool ran and reported failure.
    ///
    /// `stderr` is the tool's own output, kept verbatim.
    #[error("{operation} failed: {stderr}")]
    DiskImage {
        /// Operation that failed (e.g., "hdiutil create")
        operation: String,
        /// Exit code reported by the tool, if it exited normally
        code: Option<i32>,
        /// Raw standard error of the tool
        stderr: String,
    },

    /// The compiler invocation that produces the binary failed.
    #[error("cargo build failed: {stderr}")]
    BuildFailed {
        /// Exit code reported by cargo, if it exited normally
        code: Option<i32>,
        /// Raw standard error of cargo
        stderr: String,
    },

    /// The volume was attached but its mount point never appeared.
    #[error("mount point {} did not appear within {:?}", mount_point.display(), timeout)]
    MountTimeout {
        /// Mount point that was polled
        mount_point: PathBuf,
        /// How long the poll loop waited
        timeout: Duration,
    },

    /// Disk image operation invoked in the wrong lifecycle state.
    #[error("cannot {operation} while disk image is {state}")]
    InvalidState {
        /// Requested operation
        operation: &'static str,
        /// State the builder was in
        state: String,
    },

    /// Child process could not be started at all.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking directory (bundle copies and checksums).
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// Property list (plist) writing error.
    #[error("{0}")]
    Plist(#[from] plist::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Exit code to hand back to the shell for this error.
    ///
    /// Tool failures propagate the tool's own exit code; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Context(_, inner) => inner.exit_code(),
            Error::DiskImage {
                code: Some(code), ..
            }
            | Error::BuildFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Native error text of the failing host tool, if this is a tool failure.
    pub fn tool_stderr(&self) -> Option<&str> {
        match self {
            Error::Context(_, inner) => inner.tool_stderr(),
            Error::DiskImage { stderr, .. } | Error::BuildFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Whether this error happened inside the disk-image stage.
    pub fn is_disk_image_error(&self) -> bool {
        match self {
            Error::Context(_, inner) => inner.is_disk_image_error(),
            Error::DiskImage { .. } | Error::MountTimeout { .. } | Error::InvalidState { .. } => {
                true
            }
            _ => false,
        }
    }
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with bundler's Error type.
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
///
/// ```no_run
/// use cpu_limiter_bundler::bundler::{ErrorExt, Result};
/// use std::path::Path;
///
/// fn create_contents_dir(path: &Path) -> Result<()> {
///     std::fs::create_dir_all(path)
///         .fs_context("creating Contents directory", path)?;
///     Ok(())
/// }
/// ```
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
///
/// ```ignore
/// bail!("operation failed");
/// bail!("invalid value: {}", value);
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError($msg.into()))
    };
    ($err:expr $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::error::Error::GenericError(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_propagates_tool_code() {
        let err = Error::DiskImage {
            operation: "hdiutil attach".into(),
            code: Some(16),
            stderr: "hdiutil: attach failed - Resource busy".into(),
        };
        assert_eq!(err.exit_code(), 16);

        let wrapped: Result<()> = Err(err);
        let wrapped = wrapped.context("mounting writable image").unwrap_err();
        assert_eq!(wrapped.exit_code(), 16);
        assert!(wrapped.is_disk_image_error());
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
        let err = Error::MissingBinary {
            path: PathBuf::from("/nope/cpu-limiter"),
        };
        assert_eq!(err.exit_code(), 1);
        assert!(!err.is_disk_image_error());

        let killed = Error::DiskImage {
            operation: "hdiutil convert".into(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(killed.exit_code(), 1);
    }

    #[test]
    fn test_disk_image_message_keeps_stderr_verbatim() {
        let err = Error::DiskImage {
            operation: "hdiutil create".into(),
            code: Some(1),
            stderr: "hdiutil: create failed - No space left on device".into(),
        };
        assert_eq!(
            err.to_string(),
            "hdiutil create failed: hdiutil: create failed - No space left on device"
        );
    }

    #[test]
    fn test_fs_context_carries_path() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = res.fs_context("creating bundle directory", "/tmp/x.app").unwrap_err();
        assert!(matches!(err, Error::Fs { .. }));
        assert_eq!(err.to_string(), "creating bundle directory /tmp/x.app: denied");
    }
}
