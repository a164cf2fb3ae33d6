//! Error types for duplex-postgres.

use std::collections::HashMap;

use thiserror::Error;

/// Result type for duplex-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error/notice fields reported by the server, keyed by the protocol's
/// one-byte field codes.
#[derive(Debug, Clone, Default)]
pub struct ServerError {
    fields: HashMap<u8, String>,
}

impl ServerError {
    /// Set a field by its protocol code.
    pub fn set_field(&mut self, code: u8, value: &str) {
        self.fields.insert(code, value.to_string());
    }

    /// Look up a raw field by its protocol code (e.g. `b'M'` for message).
    pub fn field(&self, code: u8) -> Option<&str> {
        self.fields.get(&code).map(String::as_str)
    }

    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, ...
    pub fn severity(&self) -> Option<&str> {
        self.field(b'S')
    }

    /// SQLSTATE error code (5 characters).
    pub fn sqlstate(&self) -> Option<&str> {
        self.field(b'C')
    }

    /// Primary human-readable error message.
    pub fn message(&self) -> Option<&str> {
        self.field(b'M')
    }

    /// Detailed error explanation, if any.
    pub fn detail(&self) -> Option<&str> {
        self.field(b'D')
    }

    /// Returns true for FATAL and PANIC severities.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), Some("FATAL") | Some("PANIC"))
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = self.severity() {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = self.message() {
            write!(f, "{}", message)?;
        }
        if let Some(code) = self.sqlstate() {
            write!(f, " (SQLSTATE {})", code)?;
        }
        Ok(())
    }
}

/// Error type for duplex-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by the server during connection setup
    #[error("PostgreSQL error: {0}")]
    Server(ServerError),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The connection is closed or its run-loop has terminated
    #[error("connection lost")]
    ConnectionLost,

    /// A user-defined type has no registered OID
    #[error("unknown OID for type \"{0}\"")]
    UnknownOid(String),

    /// An encoded parameter exceeds the wire format's length limit
    #[error("parameter size overflows the wire format")]
    SizeOverflow,

    /// A result cell did not match the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid usage (e.g., exec before connect)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature or authentication method
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.sqlstate(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let mut error = ServerError::default();
        error.set_field(b'S', "ERROR");
        error.set_field(b'C', "42601");
        error.set_field(b'M', "syntax error");
        assert_eq!(error.to_string(), "ERROR: syntax error (SQLSTATE 42601)");
        assert!(!error.is_fatal());
    }
}
