//! Error types for ORM operations.

use crate::schema::SchemaError;
use esorm_gateway::GatewayError;
use std::fmt;
use thiserror::Error;

/// Result type for ORM operations.
pub type OrmResult<T> = Result<T, OrmError>;

/// Closed classification of every [`OrmError`].
///
/// Callers above the ORM usually turn [`ErrorKind::NoRows`] into an absent
/// result and surface every other kind as a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Nothing matched. Expected and recoverable.
    NoRows,
    /// The record's primary key is unset or could not be resolved.
    MissingPrimaryKey,
    /// The call was malformed (empty bulk input, unconditional update, ...).
    BadArguments,
    /// The record type was never registered.
    NotRegistered,
    /// Network failure or timeout.
    Transport,
    /// The backend rejected the request.
    Backend,
    /// A value could not be encoded or decoded.
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NoRows => "no rows",
            ErrorKind::MissingPrimaryKey => "missing primary key",
            ErrorKind::BadArguments => "bad arguments",
            ErrorKind::NotRegistered => "not registered",
            ErrorKind::Transport => "transport",
            ErrorKind::Backend => "backend",
            ErrorKind::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in ORM operations.
#[derive(Debug, Error)]
pub enum OrmError {
    /// No document matched.
    #[error("no rows in result set")]
    NoRows,

    /// The primary key of a record is unset.
    #[error("missing primary key `{field}` on {model}")]
    MissingPrimaryKey {
        /// Model type name.
        model: String,
        /// Primary key field.
        field: String,
    },

    /// The arguments of a call were rejected.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// The type was never registered with the model registry.
    #[error("model not registered: {0}")]
    NotRegistered(String),

    /// A field accessed as a key holds something other than bool, string
    /// or integer.
    #[error("field `{field}` of {model} has unsupported kind {kind}")]
    InvalidFieldKind {
        /// Model type name.
        model: String,
        /// Field name.
        field: String,
        /// Kind found in the record.
        kind: &'static str,
    },

    /// Invalid schema descriptor.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Backend gateway error.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Record encode/decode error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrmError {
    /// Creates a bad arguments error.
    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::BadArguments(message.into())
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::NoRows => ErrorKind::NoRows,
            OrmError::MissingPrimaryKey { .. } => ErrorKind::MissingPrimaryKey,
            OrmError::BadArguments(_) | OrmError::InvalidFieldKind { .. } | OrmError::Schema(_) => {
                ErrorKind::BadArguments
            }
            OrmError::NotRegistered(_) => ErrorKind::NotRegistered,
            OrmError::Serialization(_) => ErrorKind::Serialization,
            OrmError::Gateway(err) => match err {
                GatewayError::Transport(_) | GatewayError::Timeout(_) => ErrorKind::Transport,
                GatewayError::Backend(backend) if backend.status == 404 => ErrorKind::NoRows,
                GatewayError::Backend(_) => ErrorKind::Backend,
                GatewayError::Serialization(_) => ErrorKind::Serialization,
                GatewayError::InvalidRequest(_) => ErrorKind::BadArguments,
            },
        }
    }

    /// Returns true for [`ErrorKind::NoRows`].
    pub fn is_no_rows(&self) -> bool {
        self.kind() == ErrorKind::NoRows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esorm_gateway::BackendError;
    use std::time::Duration;

    #[test]
    fn gateway_errors_classify() {
        let timeout: OrmError = GatewayError::Timeout(Duration::from_secs(10)).into();
        assert_eq!(timeout.kind(), ErrorKind::Transport);

        let missing: OrmError = GatewayError::Backend(BackendError::new(
            404,
            "document_missing_exception",
            "[_doc][1]: document missing",
            "",
        ))
        .into();
        assert!(missing.is_no_rows());

        let rejected: OrmError =
            GatewayError::Backend(BackendError::new(400, "mapper_parsing_exception", "", ""))
                .into();
        assert_eq!(rejected.kind(), ErrorKind::Backend);
    }

    #[test]
    fn local_errors_classify() {
        assert_eq!(OrmError::NoRows.kind(), ErrorKind::NoRows);
        assert_eq!(
            OrmError::bad_arguments("empty input").kind(),
            ErrorKind::BadArguments
        );
        assert_eq!(
            OrmError::NotRegistered("Device".into()).kind(),
            ErrorKind::NotRegistered
        );
        let decode = serde_json::from_str::<u8>("x").unwrap_err();
        assert_eq!(OrmError::from(decode).kind(), ErrorKind::Serialization);
    }
}
