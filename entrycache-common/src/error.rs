// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// ErrorKind is all kinds of Error of the entry cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// I/O error.
    Io,
    /// Config error.
    Config,
    /// Parse error.
    ///
    /// Raised for malformed distinguished names, search filters and store properties.
    Parse,
    /// Decode error.
    ///
    /// Cached bytes cannot be turned back into an entry.
    Decode,
    /// Checksum mismatch.
    ChecksumMismatch,
    /// Magic mismatch.
    MagicMismatch,
    /// The persisted index snapshot is absent.
    IndexNotFound,
    /// The persisted index snapshot is empty or inconsistent.
    IndexImpaired,
    /// The cache is not running.
    NotRunning,
    /// Unsupported operation.
    Unsupported,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Io => "I/O error",
            ErrorKind::Config => "Config error",
            ErrorKind::Parse => "Parse error",
            ErrorKind::Decode => "Decode error",
            ErrorKind::ChecksumMismatch => "Checksum mismatch",
            ErrorKind::MagicMismatch => "Magic mismatch",
            ErrorKind::IndexNotFound => "Index not found",
            ErrorKind::IndexImpaired => "Index impaired",
            ErrorKind::NotRunning => "Not running",
            ErrorKind::Unsupported => "Unsupported operation",
        }
    }
}

/// Error is the error struct returned by all entry cache functions.
///
/// ## Display
///
/// - Via `Display`, the error is printed in a single line:
///
/// ```shell
/// Decode error, context: { key: cn=alice,dc=example,dc=com } => truncated attribute value, source: ...
/// ```
///
/// - Via `Debug`, the error is printed in multiple lines with context, source and backtrace (if captured).
///
/// - Via `{:#?}`, the conventional struct-style debug representation is used.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            de.field("backtrace", &self.backtrace);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {}: {}", k, v)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "  {source:#}")?;
        }

        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            let mut iter = self.context.iter().peekable();
            while let Some((k, v)) = iter.next() {
                write!(f, "{}: {}", k, v)?;
                if iter.peek().is_some() {
                    write!(f, ", ")?;
                }
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// If the error needs to carry a source error, please use `with_source` method.
    ///
    /// ```rust
    /// # use entrycache_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("disk full");
    /// Error::new(ErrorKind::Io, "cannot append record").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &Vec<(&'static str, String)> {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for the entry cache.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper methods for Error.
impl Error {
    /// Helper for creating an [`ErrorKind::Io`] error from [`std::io::Error`].
    pub fn io_error(source: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "").with_source(source)
    }

    /// Helper for creating an error from [`bincode::Error`].
    pub fn bincode_error(source: bincode::Error) -> Self {
        match *source {
            bincode::ErrorKind::Io(e) => Self::io_error(e),
            _ => Error::new(ErrorKind::Decode, "coding error").with_source(source),
        }
    }

    /// Helper for creating a [`ErrorKind::Decode`] error for a buffer that ends too early.
    pub fn truncated(what: &'static str, required: usize, remaining: usize) -> Self {
        Error::new(ErrorKind::Decode, format!("truncated {what}"))
            .with_context("required", required)
            .with_context("remaining", remaining)
    }

    /// Helper for creating a [`ErrorKind::NotRunning`] error.
    pub fn not_running() -> Self {
        Error::new(ErrorKind::NotRunning, "entry cache is not running")
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::bincode_error(e)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[test]
    fn test_kind_display() {
        let kinds = [
            ErrorKind::Io,
            ErrorKind::Config,
            ErrorKind::Parse,
            ErrorKind::Decode,
            ErrorKind::ChecksumMismatch,
            ErrorKind::MagicMismatch,
            ErrorKind::IndexNotFound,
            ErrorKind::IndexImpaired,
            ErrorKind::NotRunning,
            ErrorKind::Unsupported,
        ];
        let names = kinds.map(|kind| kind.to_string());
        assert_eq!(names[0], "I/O error");
        assert_eq!(names[8], "Not running");
        let unique = names.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(unique.len(), kinds.len());
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_error_display() {
        let io_error = std::io::Error::other("disk full");
        let err = Error::new(ErrorKind::Io, "cannot append record")
            .with_source(io_error)
            .with_context("store", "EntryCacheDB")
            .with_context("offset", 4096);

        assert_eq!(
            "I/O error, context: { store: EntryCacheDB, offset: 4096 } => cannot append record, source: disk full",
            err.to_string()
        );
    }

    #[test]
    fn test_error_downcast() {
        let inner = TestError("stale snapshot".to_string());
        let err = Error::new(ErrorKind::IndexImpaired, "").with_source(inner.clone());

        let downcasted = err.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcasted, &inner);
    }

    #[test]
    fn test_truncated_context() {
        let err = Error::truncated("attribute value", 12, 3);
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(
            err.context(),
            &vec![("required", "12".to_string()), ("remaining", "3".to_string())]
        );
    }

    #[test]
    fn test_bincode_error_kind() {
        let res: std::result::Result<u64, _> = bincode::deserialize(&[1u8, 2]);
        let err = Error::from(res.unwrap_err());
        assert!(matches!(err.kind(), ErrorKind::Decode | ErrorKind::Io));
    }
}
