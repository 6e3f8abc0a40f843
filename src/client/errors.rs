//! Remote error classification
//!
//! Every failure that comes back from the appliance is classified exactly
//! once, here, at the transport boundary. Higher layers branch on
//! [`ErrorKind`] only, never on numeric codes or message text.

use crate::client::rpc::RawRpcError;
use std::error::Error as StdError;
use std::fmt;

/// Prefix used when rendering remote API errors
pub const API_NAMESPACE: &str = "TrueNAS";

// =============================================================================
// Protocol Error Codes
// =============================================================================

pub const ERR_CODE_NOT_AUTHENTICATED: i64 = 1;
pub const ERR_CODE_NOT_AUTHORIZED: i64 = 2;
pub const ERR_CODE_NOT_FOUND: i64 = 3;
pub const ERR_CODE_VALIDATION: i64 = 4;
/// JSON-RPC reserved internal error
pub const ERR_CODE_INTERNAL: i64 = -32603;

// =============================================================================
// Taxonomy
// =============================================================================

/// Closed set of error categories used for control-flow decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotAuthenticated,
    NotAuthorized,
    NotFound,
    Validation,
    Internal,
    Unclassified,
}

impl ErrorKind {
    /// Map a remote error code onto the taxonomy
    pub fn from_code(code: i64) -> Self {
        match code {
            ERR_CODE_NOT_AUTHENTICATED => ErrorKind::NotAuthenticated,
            ERR_CODE_NOT_AUTHORIZED => ErrorKind::NotAuthorized,
            ERR_CODE_NOT_FOUND => ErrorKind::NotFound,
            ERR_CODE_VALIDATION => ErrorKind::Validation,
            ERR_CODE_INTERNAL => ErrorKind::Internal,
            _ => ErrorKind::Unclassified,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ErrorKind::NotAuthenticated | ErrorKind::NotAuthorized)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotAuthenticated => write!(f, "not-authenticated"),
            ErrorKind::NotAuthorized => write!(f, "not-authorized"),
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Internal => write!(f, "internal"),
            ErrorKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

// =============================================================================
// API Error
// =============================================================================

/// A classified error returned by the appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
    /// Canonical JSON text of the remote `data` payload, empty if absent
    pub details: String,
}

impl ApiError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: String::new(),
        }
    }

    /// Build from the raw error object of a JSON-RPC response
    pub fn from_raw(raw: &RawRpcError) -> Self {
        let details = match &raw.data {
            None | Some(serde_json::Value::Null) => String::new(),
            // Serializing a Value cannot fail
            Some(data) => serde_json::to_string(data).unwrap_or_default(),
        };

        Self {
            code: raw.code,
            message: raw.message.clone(),
            details,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_auth_error(&self) -> bool {
        self.kind().is_auth()
    }

    pub fn is_validation_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} API error {}: {}", API_NAMESPACE, self.code, self.message)?;
        if !self.details.is_empty() {
            write!(f, " ({})", self.details)?;
        }
        Ok(())
    }
}

impl StdError for ApiError {}

// =============================================================================
// Connection Error
// =============================================================================

/// Failure to establish or keep a session with the appliance
#[derive(Debug)]
pub struct ConnectionError {
    pub host: String,
    pub source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ConnectionError {
    pub fn new(
        host: impl Into<String>,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            host: host.into(),
            source,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to TrueNAS at {}", self.host)?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        write!(
            f,
            "\n\nCheck that the host is reachable and the API key is valid. \
             A minimal provider configuration looks like:\n\n\
             provider \"trueform\" {{\n  \
               host    = \"{}\"\n  \
               api_key = \"1-abcdef...\"\n\
             }}",
            self.host
        )
    }
}

impl StdError for ConnectionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

// =============================================================================
// Taxonomy Queries
// =============================================================================

/// Find the first classified API error in an error's source chain
pub fn find_api_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ApiError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return Some(api);
        }
        if let Some(err) = e.downcast_ref::<crate::error::Error>() {
            return err.api_error();
        }
        if let Some(err) = e.downcast_ref::<Box<crate::error::Error>>() {
            return err.api_error();
        }
        current = e.source();
    }
    None
}

fn kind_of(err: Option<&(dyn StdError + 'static)>) -> Option<ErrorKind> {
    err.and_then(|e| find_api_error(e)).map(ApiError::kind)
}

/// True iff `err` is (or wraps) a not-found API error
pub fn is_not_found_error(err: Option<&(dyn StdError + 'static)>) -> bool {
    kind_of(err) == Some(ErrorKind::NotFound)
}

/// True iff `err` is (or wraps) a not-authenticated or not-authorized API error
pub fn is_auth_error(err: Option<&(dyn StdError + 'static)>) -> bool {
    kind_of(err).map(|k| k.is_auth()).unwrap_or(false)
}

/// True iff `err` is (or wraps) a validation API error
pub fn is_validation_error(err: Option<&(dyn StdError + 'static)>) -> bool {
    kind_of(err) == Some(ErrorKind::Validation)
}
