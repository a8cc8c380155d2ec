//! Error types and handling for the communication-core library
//!
//! Errors fall into two tiers that are delivered very differently:
//!
//! - **Configuration Errors** - returned synchronously from constructors when a
//!   required structural field (`session`, `session.id`,
//!   `session.connection.connection_id`) is missing or empty. No object is
//!   produced; the caller must handle the `Err`.
//! - **Call Errors** - failures reported by the media transport while
//!   publishing or subscribing. These are never returned from
//!   [`start`](crate::CommunicationController::start); they are handed to
//!   [`CommunicationEventHandler::on_error`](crate::CommunicationEventHandler::on_error)
//!   and logged.
//!
//! # Error Handling Guide
//!
//! ```rust,no_run
//! # use accpack_communication_core::{CallOptions, CommunicationError, Session};
//! let options = CallOptions::default();
//! match options.validate() {
//!     Ok(validated) => println!("session {}", validated.session.id),
//!     Err(CommunicationError::NoSession) => eprintln!("a session is required"),
//!     Err(e) => eprintln!("configuration error in {}: {}", e.category(), e),
//! }
//! ```
//!
//! Runtime failures carry the transport error code. Code `1010` means the
//! transport lost connectivity and the message tells the user so:
//!
//! ```rust
//! # use accpack_communication_core::{CommunicationError, TransportError};
//! let error = CommunicationError::call_failed(TransportError::new(1010, "socket closed"));
//! assert_eq!(error.to_string(), "Error starting a call. Check your network connection.");
//! assert!(error.is_recoverable());
//! ```

use thiserror::Error;

use crate::session::TransportError;

/// Result type alias for communication-core operations
pub type CommunicationResult<T> = Result<T, CommunicationError>;

/// Message attached to every publish/subscribe failure
pub const CALL_FAILED_MESSAGE: &str = "Error starting a call";

/// Hint appended to the message of connectivity failures
pub const NETWORK_HINT: &str = ". Check your network connection.";

/// Error types for call coordination
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommunicationError {
    /// Controller options did not carry a session
    #[error("No session provided")]
    NoSession,

    /// Annotation accessory constructed or started without a session
    #[error("Annotation accessory requires a session")]
    SessionRequired,

    #[error("The session id cannot be empty")]
    EmptySessionId,

    #[error("The connection id cannot be empty")]
    EmptyConnectionId,

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Publishing or subscribing failed in the transport
    #[error("{message}")]
    CallFailed {
        /// Transport error code, preserved as reported
        code: i32,
        /// User facing message
        message: String,
        /// Message originally reported by the transport
        detail: String,
    },

    /// The publisher's camera failed while in a call
    #[error("Camera error {code}: {message}")]
    CameraFailed { code: i32, message: String },

    #[error("Annotation error: {reason}")]
    AnnotationFailed { reason: String },
}

impl CommunicationError {
    /// Map a transport publish/subscribe failure to a call error.
    ///
    /// The message is replaced with [`CALL_FAILED_MESSAGE`]; connectivity
    /// failures additionally get [`NETWORK_HINT`]. The code is kept.
    pub fn call_failed(error: TransportError) -> Self {
        let mut message = CALL_FAILED_MESSAGE.to_string();
        if error.is_network_error() {
            message.push_str(NETWORK_HINT);
        }
        Self::CallFailed {
            code: error.code,
            message,
            detail: error.message,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Map a camera failure reported by the transport
    pub fn camera_failed(error: TransportError) -> Self {
        Self::CameraFailed {
            code: error.code,
            message: error.message,
        }
    }

    /// Create an annotation error
    pub fn annotation_failed(reason: impl Into<String>) -> Self {
        Self::AnnotationFailed { reason: reason.into() }
    }

    /// Transport error code, when the error came from the transport
    pub fn code(&self) -> Option<i32> {
        match self {
            CommunicationError::CallFailed { code, .. }
            | CommunicationError::CameraFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if the error was caused by lost connectivity
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            CommunicationError::CallFailed { code, .. } if *code == TransportError::NETWORK_ERROR_CODE
        )
    }

    /// Check if retrying the operation can succeed without changing configuration
    pub fn is_recoverable(&self) -> bool {
        match self {
            CommunicationError::CallFailed { .. } => self.is_network_error(),
            CommunicationError::CameraFailed { .. } | CommunicationError::AnnotationFailed { .. } => {
                true
            }

            CommunicationError::NoSession
            | CommunicationError::SessionRequired
            | CommunicationError::EmptySessionId
            | CommunicationError::EmptyConnectionId
            | CommunicationError::InvalidConfiguration { .. } => false,
        }
    }

    /// Check if error was raised while validating configuration
    pub fn is_configuration_error(&self) -> bool {
        self.category() == "configuration"
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CommunicationError::NoSession
            | CommunicationError::SessionRequired
            | CommunicationError::EmptySessionId
            | CommunicationError::EmptyConnectionId
            | CommunicationError::InvalidConfiguration { .. } => "configuration",

            CommunicationError::CallFailed { .. } => "call",

            CommunicationError::CameraFailed { .. } => "media",

            CommunicationError::AnnotationFailed { .. } => "annotation",
        }
    }
}
