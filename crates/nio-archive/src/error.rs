use std::fmt;

use thiserror::Error;

/// Broad failure category, independent of the message attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Acquiring a resource failed (context creation, sink open).
    Resource,
    /// Configuration rejected at construction.
    Config,
    /// The compression engine reported an error.
    Compression,
    /// The frame log or seek table could not be built or decoded.
    Codec,
    /// Reading or writing the sink failed.
    Io,
    /// The session lock is unusable.
    Sync,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Resource => "resource",
            ErrorKind::Config => "config",
            ErrorKind::Compression => "compression",
            ErrorKind::Codec => "codec",
            ErrorKind::Io => "io",
            ErrorKind::Sync => "sync",
        };
        f.write_str(s)
    }
}

/// Archive error types
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Resource acquisition failed
    #[error("resource error: {context}")]
    Resource {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid writer configuration
    #[error("invalid config: {0}")]
    Config(String),

    /// zstd error
    #[error("compression error: {context}: {name}")]
    Compression { context: String, name: &'static str },

    /// Frame log / seek table error
    #[error("seek table error: {0}")]
    Codec(String),

    /// IO error
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Poisoned lock
    #[error("sync error: {0}")]
    Sync(String),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Resource { .. } => ErrorKind::Resource,
            ArchiveError::Config(_) => ErrorKind::Config,
            ArchiveError::Compression { .. } => ErrorKind::Compression,
            ArchiveError::Codec(_) => ErrorKind::Codec,
            ArchiveError::Io { .. } => ErrorKind::Io,
            ArchiveError::Sync(_) => ErrorKind::Sync,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn zstd(context: impl Into<String>, code: zstd::zstd_safe::ErrorCode) -> Self {
        ArchiveError::Compression {
            context: context.into(),
            name: zstd::zstd_safe::get_error_name(code),
        }
    }
}

impl From<ArchiveError> for std::io::Error {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Io { source, .. } => source,
            other => std::io::Error::other(other),
        }
    }
}

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let e = ArchiveError::io("write", std::io::Error::other("disk full"));
        assert_eq!(e.kind(), ErrorKind::Io);
        assert_eq!(ArchiveError::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(ArchiveError::Sync("x".into()).kind(), ErrorKind::Sync);
    }

    #[test]
    fn io_error_passes_through_conversion() {
        let e = ArchiveError::io("write", std::io::Error::new(std::io::ErrorKind::WriteZero, "short"));
        let io: std::io::Error = e.into();
        assert_eq!(io.kind(), std::io::ErrorKind::WriteZero);
    }

    #[test]
    fn display_includes_context() {
        let e = ArchiveError::Codec("too many frames".into());
        assert_eq!(e.to_string(), "seek table error: too many frames");
        assert_eq!(ErrorKind::Compression.to_string(), "compression");
    }
}
