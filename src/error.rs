use mongodb::error::{Error as DriverError, ErrorKind};
use thiserror::Error;

/// Server error code for unauthorized commands.
const UNAUTHORIZED: i32 = 13;

pub type Result<T> = std::result::Result<T, DataServiceError>;

#[derive(Debug, Error)]
pub enum DataServiceError {
    /// Returned by the store when an operation is invoked before `connect`.
    #[error("Data service is not yet initialized")]
    NotInitialized,
    /// A driver or server failure. The structure of the original error is
    /// preserved in `source`; only the user-facing message is rewritten.
    #[error("{message}")]
    Driver {
        message: String,
        #[source]
        source: DriverError,
    },
    #[error("SSH tunnel error: {0}")]
    Tunnel(String),
    #[error("{0}")]
    InvalidArgument(String),
}

impl DataServiceError {
    pub fn from_driver(source: DriverError) -> Self {
        let raw = source.to_string();
        let message = translate_message(&raw).map(str::to_string).unwrap_or(raw);
        Self::Driver { message, source }
    }
}

impl From<DriverError> for DataServiceError {
    fn from(source: DriverError) -> Self {
        Self::from_driver(source)
    }
}

struct Translation {
    patterns: &'static [&'static str],
    message: &'static str,
}

/// Ordered substring-to-message table, evaluated top to bottom against the
/// lowercased raw error text. Patterns cover both server-side wording and the
/// driver's own I/O error phrasing.
static TRANSLATIONS: &[Translation] = &[
    Translation {
        patterns: &["econnrefused", "connection refused"],
        message: "MongoDB not running on the provided host and port",
    },
    Translation {
        patterns: &["enotfound", "failed to lookup address", "name or service not known"],
        message: "MongoDB host not found",
    },
    Translation {
        patterns: &["etimedout", "timed out"],
        message: "Connection to MongoDB timed out",
    },
    Translation {
        patterns: &["authentication failed", "scram failure", "bad auth"],
        message: "Invalid MongoDB credentials",
    },
    Translation {
        patterns: &["not authorized", "unauthorized", "requires authentication"],
        message: "The user is not authorized to perform this operation",
    },
];

/// Looks up a replacement message for a raw error text. `None` means the
/// message passes through untouched.
pub fn translate_message(raw: &str) -> Option<&'static str> {
    let lowered = raw.to_lowercase();
    for translation in TRANSLATIONS {
        if translation.patterns.iter().any(|pattern| lowered.contains(pattern)) {
            return Some(translation.message);
        }
    }
    None
}

/// Whether a driver error is an authorization failure. Checks the command
/// error code first, then falls back to message substrings for errors that
/// reach us without a structured code.
pub(crate) fn is_not_authorized(error: &DriverError) -> bool {
    if let ErrorKind::Command(ref command_error) = *error.kind {
        if command_error.code == UNAUTHORIZED {
            return true;
        }
    }
    message_is_not_authorized(&error.to_string())
}

pub(crate) fn message_is_not_authorized(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("not authorized")
        || lowered.contains("unauthorized")
        || lowered.contains("requires authentication")
}

/// Whether an error is the routing-layer complaint raised when listing
/// collections of a local database through a mongos.
pub(crate) fn is_mongos_local_error(error: &DriverError) -> bool {
    error.to_string().contains("database through mongos")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_error(message: &str) -> DriverError {
        DriverError::from(std::io::Error::other(message.to_string()))
    }

    #[test]
    fn connection_refused_is_translated() {
        let message = translate_message("Kind: I/O error: Connection refused (os error 111)");
        assert_eq!(message, Some("MongoDB not running on the provided host and port"));
    }

    #[test]
    fn host_not_found_is_translated() {
        let message =
            translate_message("failed to lookup address information: Name or service not known");
        assert_eq!(message, Some("MongoDB host not found"));
    }

    #[test]
    fn authorization_failure_is_translated() {
        let message = translate_message("not authorized on admin to execute command");
        assert_eq!(message, Some("The user is not authorized to perform this operation"));
    }

    #[test]
    fn table_order_prefers_earlier_entries() {
        // A refused connection that also timed out reports the refusal.
        let message = translate_message("connection refused after request timed out");
        assert_eq!(message, Some("MongoDB not running on the provided host and port"));
    }

    #[test]
    fn unknown_messages_pass_through() {
        assert_eq!(translate_message("E11000 duplicate key error"), None);
    }

    #[test]
    fn driver_wrapping_keeps_unmatched_text() {
        let source = driver_error("E11000 duplicate key error");
        let wrapped = DataServiceError::from_driver(source);
        assert!(wrapped.to_string().contains("duplicate key"));
    }

    #[test]
    fn driver_wrapping_rewrites_known_text() {
        let source = driver_error("not authorized on config to execute command");
        let wrapped = DataServiceError::from_driver(source);
        assert_eq!(wrapped.to_string(), "The user is not authorized to perform this operation");
    }

    #[test]
    fn not_authorized_message_predicate() {
        assert!(message_is_not_authorized("not authorized on admin"));
        assert!(message_is_not_authorized("command listDatabases requires authentication"));
        assert!(!message_is_not_authorized("duplicate key error"));
    }

    #[test]
    fn mongos_local_predicate() {
        let error = driver_error("cannot perform operation on local database through mongos");
        assert!(is_mongos_local_error(&error));
        assert!(!is_mongos_local_error(&driver_error("other failure")));
    }
}
