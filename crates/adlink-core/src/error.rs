//! Directory client error types
//!
//! Every failure in adlink maps to exactly one [`ErrorCategory`] and carries
//! a retryability verdict. Protocol result codes are classified through a
//! fixed table; failures without a code fall back to substring matching
//! against known network-failure phrases.

use std::fmt;

use thiserror::Error;

/// Closed set of failure categories.
///
/// `Cancelled` sits outside the failure taxonomy proper: classifiers never
/// produce it, only cancellation paths do, and it bypasses retry
/// unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-level failure reaching the directory.
    Connection,
    /// Bind or credential failure.
    Authentication,
    /// Authenticated but not authorized.
    Permission,
    /// The addressed object does not exist.
    NotFound,
    /// The object already exists or the write conflicts.
    Conflict,
    /// Malformed input: bad DN syntax, bad identifier, bad configuration.
    Validation,
    /// Server-side failure (busy, unavailable, internal).
    Server,
    /// Anything the classifiers could not place.
    Unknown,
    /// The caller's cancellation token fired.
    Cancelled,
}

impl ErrorCategory {
    /// Stable lower-case label, used in log fields and error text.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Permission => "permission",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Server => "server",
            ErrorCategory::Unknown => "unknown",
            ErrorCategory::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error produced by any adlink operation.
///
/// Carries the operation name, the category, the underlying protocol result
/// code when one was available, and the distinguished name involved when
/// applicable.
#[derive(Debug, Error)]
#[error("{}", render(.operation, .category, .message, .result_code, .dn))]
pub struct DirectoryError {
    /// Failure category.
    pub category: ErrorCategory,
    /// Name of the operation that failed (may be empty until filled in).
    pub operation: String,
    /// Human-readable description.
    pub message: String,
    /// LDAP result code, when the failure came from the protocol.
    pub result_code: Option<u32>,
    /// Distinguished name involved, when applicable.
    pub dn: Option<String>,
    retryable: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

fn render(
    operation: &str,
    category: &ErrorCategory,
    message: &str,
    result_code: &Option<u32>,
    dn: &Option<String>,
) -> String {
    let mut out = String::new();
    if !operation.is_empty() {
        out.push_str(operation);
        out.push_str(": ");
    }
    out.push_str(category.as_str());
    out.push_str(" error: ");
    out.push_str(message);
    if let Some(rc) = result_code {
        out.push_str(&format!(" (result code {rc})"));
    }
    if let Some(dn) = dn {
        out.push_str(&format!(" [dn: {dn}]"));
    }
    out
}

impl DirectoryError {
    /// Create an error with an explicit category and retryability verdict.
    pub fn new(
        category: ErrorCategory,
        operation: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            category,
            operation: operation.into(),
            message: message.into(),
            result_code: None,
            dn: None,
            retryable,
            source: None,
        }
    }

    /// Create a retryable connection failure.
    pub fn connection_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Connection, operation, message, true)
    }

    /// Create a non-retryable authentication failure.
    pub fn authentication(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authentication, operation, message, false)
    }

    /// Create a non-retryable permission failure.
    pub fn permission(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Permission, operation, message, false)
    }

    /// Create a not-found failure for the given distinguished name or
    /// identifier.
    pub fn not_found(operation: impl Into<String>, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self::new(
            ErrorCategory::NotFound,
            operation,
            format!("no such object: {identifier}"),
            false,
        )
        .with_dn(identifier)
    }

    /// Create a conflict failure (entry already exists).
    pub fn conflict(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, operation, message, false)
    }

    /// Create a validation failure. The operation label is typically filled
    /// in later by the caller that knows it.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, "", message, false)
    }

    /// Create a server-category failure with an explicit verdict.
    pub fn server(
        operation: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::new(ErrorCategory::Server, operation, message, retryable)
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Cancelled,
            operation,
            "operation cancelled",
            false,
        )
    }

    /// Classify a protocol result code and build the corresponding error.
    pub fn from_result_code(
        operation: impl Into<String>,
        rc: u32,
        message: impl Into<String>,
    ) -> Self {
        let (category, retryable) = classify_result_code(rc);
        let mut err = Self::new(category, operation, message, retryable);
        err.result_code = Some(rc);
        err
    }

    /// Classify a codeless failure by its message text.
    pub fn from_message(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let (category, retryable) = classify_message(&message);
        Self::new(category, operation, message, retryable)
    }

    /// Terminal failure after the retry budget is spent. Keeps the last
    /// error's category, code and DN, wraps it as the source, and is itself
    /// non-retryable so a caller cannot accidentally double-retry.
    pub fn retries_exhausted(operation: impl Into<String>, attempts: u32, last: Self) -> Self {
        Self {
            category: last.category,
            operation: operation.into(),
            message: format!("retries exhausted after {attempts} attempts: {}", last.message),
            result_code: last.result_code,
            dn: last.dn.clone(),
            retryable: false,
            source: Some(Box::new(last)),
        }
    }

    /// Attach the distinguished name involved.
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    /// Fill in the operation label only if it is missing. An error already
    /// bearing a category and an operation is never re-classified.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        if self.operation.is_empty() {
            self.operation = operation.into();
        }
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether the retry engine may attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Whether this error came from a cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        self.category == ErrorCategory::Cancelled
    }
}

/// Result type for adlink operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Map an LDAP protocol result code to a category and retryability verdict.
///
/// Fixed table. Transient server conditions (busy, unavailable, server down,
/// time limit exceeded) retry; credential, rights, existence and syntax
/// failures do not.
pub fn classify_result_code(rc: u32) -> (ErrorCategory, bool) {
    match rc {
        // busy / unavailable / serverDown / timeLimitExceeded
        51 | 52 | 81 | 3 => (ErrorCategory::Server, true),
        // client-side connection loss and timeouts surface as API codes
        85 | 91 => (ErrorCategory::Connection, true),
        // inappropriateAuthentication / strongerAuthRequired / invalidCredentials
        48 | 8 | 49 => (ErrorCategory::Authentication, false),
        // insufficientAccessRights
        50 => (ErrorCategory::Permission, false),
        // noSuchObject
        32 => (ErrorCategory::NotFound, false),
        // entryAlreadyExists
        68 => (ErrorCategory::Conflict, false),
        // constraintViolation / invalidAttributeSyntax / invalidDNSyntax /
        // namingViolation / objectClassViolation
        19 | 21 | 34 | 64 | 65 => (ErrorCategory::Validation, false),
        // operationsError / protocolError / unwillingToPerform / other
        1 | 2 | 53 | 80 => (ErrorCategory::Server, false),
        _ => (ErrorCategory::Unknown, false),
    }
}

/// Known network-failure phrases for codeless errors.
const NETWORK_PHRASES: [&str; 5] = ["connection", "timeout", "broken pipe", "reset", "network"];

/// Classify a failure that carries no protocol result code by
/// case-insensitive substring match against known network-failure phrases.
pub fn classify_message(message: &str) -> (ErrorCategory, bool) {
    let lower = message.to_lowercase();
    if NETWORK_PHRASES.iter().any(|p| lower.contains(p)) {
        (ErrorCategory::Connection, true)
    } else {
        (ErrorCategory::Unknown, false)
    }
}
