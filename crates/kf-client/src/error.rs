//! Error types for kf-client

use thiserror::Error;

/// Result type for kf-client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while operating on resources
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object does not exist in the store
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    /// An object with the same name already exists
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    /// The submitted version token is stale
    #[error(
        "operation cannot be fulfilled on {kind} {name:?}: the object has been modified; please apply your changes to the latest version and try again"
    )]
    Conflict { kind: String, name: String },

    /// An object with the name exists but fails the kind's membership check
    #[error("an object with the name {name} exists, but it doesn't appear to be a {kind}")]
    NotMember { kind: String, name: String },

    /// A mutator rejected the object
    #[error("validation failed: {0}")]
    Validation(String),

    /// The wait context finished before the condition succeeded
    #[error("waiting for {kind} timed out")]
    WaitTimeout { kind: String },

    /// Too many consecutive conflicts
    #[error(
        "gave up updating the {kind} with the name {name:?} after {attempts} conflicting attempts"
    )]
    RetriesExhausted {
        kind: String,
        name: String,
        attempts: u32,
    },

    /// A status condition reached a terminal state
    #[error("checking {condition} failed, status: {status} message: {message} reason: {reason}")]
    ConditionFailed {
        condition: String,
        status: String,
        message: String,
        reason: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Diff error
    #[error("diff error: {0}")]
    Diff(String),

    /// A store call failed for a named object
    #[error("couldn't {action} the {kind} with the name {name:?}: {source}")]
    Operation {
        action: &'static str,
        kind: String,
        name: String,
        source: Box<ClientError>,
    },

    /// A store list call failed
    #[error("couldn't list {kind}s: {source}")]
    List {
        kind: String,
        source: Box<ClientError>,
    },
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(e: serde_yaml::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl ClientError {
    /// Wrap a store error with the operation, kind and object name
    pub fn operation(
        action: &'static str,
        kind: impl Into<String>,
        name: impl Into<String>,
        source: ClientError,
    ) -> Self {
        ClientError::Operation {
            action,
            kind: kind.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through context wrappers
    pub fn root(&self) -> &ClientError {
        match self {
            ClientError::Operation { source, .. } | ClientError::List { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// Check if this is a not-found error (404)
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            ClientError::NotFound { .. } => true,
            ClientError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409 with a stale version)
    pub fn is_conflict(&self) -> bool {
        match self.root() {
            ClientError::Conflict { .. } => true,
            ClientError::Api(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "Conflict"
            }
            _ => false,
        }
    }

    /// Check if this is an already-exists error (409 on create)
    pub fn is_already_exists(&self) -> bool {
        match self.root() {
            ClientError::AlreadyExists { .. } => true,
            ClientError::Api(kube::Error::Api(resp)) => {
                resp.code == 409 && resp.reason == "AlreadyExists"
            }
            _ => false,
        }
    }
}
