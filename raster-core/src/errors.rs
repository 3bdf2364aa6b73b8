//! # Errors
//!
//! Every vault operation fails with a [`RasterError`] carrying one of a
//! closed set of [`ErrorKind`]s. Core goals:
//! - a stable name, class name and status code per kind
//! - the originating error kept as `source` for logs
//! - transport-agnostic (the HTTP layer decides how to serialize)

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for vault APIs.
pub type RasterResult<T> = std::result::Result<T, RasterError>;

/// Failure classes surfaced by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,      // 400
    NotFound,          // 404
    MissingBlob,       // 409
    IntegrityMismatch, // 422
    IoFailure,         // 500
    RenderFailure,     // 502
    Timeout,           // 504
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::MissingBlob => 409,
            ErrorKind::IntegrityMismatch => 422,
            ErrorKind::IoFailure => 500,
            ErrorKind::RenderFailure => 502,
            ErrorKind::Timeout => 504,
        }
    }

    /// Error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MissingBlob => "MissingBlob",
            ErrorKind::IntegrityMismatch => "IntegrityMismatch",
            ErrorKind::IoFailure => "IoFailure",
            ErrorKind::RenderFailure => "RenderFailure",
            ErrorKind::Timeout => "Timeout",
        }
    }

    /// Kebab-cased `className`
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::NotFound => "not-found",
            ErrorKind::MissingBlob => "missing-blob",
            ErrorKind::IntegrityMismatch => "integrity-mismatch",
            ErrorKind::IoFailure => "io-failure",
            ErrorKind::RenderFailure => "render-failure",
            ErrorKind::Timeout => "timeout",
        }
    }
}

/// A structured vault error.
///
/// Mirrors the envelope fields an HTTP layer needs:
/// - name
/// - message
/// - code
/// - class_name
/// - data (optional diagnostics, e.g. captured render output)
#[derive(Debug)]
pub struct RasterError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub source: Option<AnyError>,
}

impl RasterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Convert into `anyhow::Error`, e.g. for event listeners.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Recover a `RasterError` from an `anyhow::Error`:
    /// - if it already is one, keep it (lossless)
    /// - otherwise wrap as IoFailure
    pub fn normalize(err: AnyError) -> RasterError {
        match err.downcast::<RasterError>() {
            Ok(raster) => raster,
            Err(other) => RasterError::new(ErrorKind::IoFailure, other.to_string()).with_source(other),
        }
    }

    /// Client-safe copy without the source chain.
    pub fn sanitize_for_client(&self) -> RasterError {
        RasterError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    /// JSON payload for an error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }

    // ---- Constructors ----

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg)
    }
    pub fn integrity_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::IntegrityMismatch, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn missing_blob(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingBlob, msg)
    }
    pub fn io_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoFailure, msg)
    }
    pub fn render_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RenderFailure, msg)
    }
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }
}

impl fmt::Display for RasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for RasterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for RasterError {
    fn from(err: std::io::Error) -> Self {
        RasterError::io_failure(err.to_string()).with_source(err)
    }
}

/// Early-return with a `RasterError`.
#[macro_export]
macro_rules! bail_raster {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::RasterError::$ctor($msg))
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::RasterError::$ctor(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(id: i64) -> RasterResult<()> {
        if id < 0 {
            bail_raster!(invalid_input, "negative id {}", id);
        }
        bail_raster!(not_found, format!("asset {id}"));
    }

    #[test]
    fn bail_macro_carries_kind() {
        assert!(lookup(-1).unwrap_err().is(ErrorKind::InvalidInput));
        assert!(lookup(7).unwrap_err().is(ErrorKind::NotFound));
    }

    #[test]
    fn json_envelope_fields() {
        let err = RasterError::render_failure("tool exited with 1")
            .with_data(serde_json::json!({ "exitCode": 1 }));
        let body = err.to_json();
        assert_eq!(body["name"], "RenderFailure");
        assert_eq!(body["code"], 502);
        assert_eq!(body["className"], "render-failure");
        assert_eq!(body["data"]["exitCode"], 1);
    }

    #[test]
    fn normalize_keeps_raster_errors() {
        let any = RasterError::missing_blob("asset 3 has no blob").into_anyhow();
        assert_eq!(RasterError::normalize(any).kind, ErrorKind::MissingBlob);

        let other = RasterError::normalize(anyhow::anyhow!("disk on fire"));
        assert_eq!(other.kind, ErrorKind::IoFailure);
        assert!(other.source.is_some());
        assert!(other.sanitize_for_client().source.is_none());
    }
}
