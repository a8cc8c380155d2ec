//! Call state tracking
//!
//! A controller is either idle or inside exactly one call. Every call gets a
//! fresh [`CallId`]; asynchronous completions compare the id they were started
//! with against the current state before touching anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Current state of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CallState {
    /// No call in progress
    #[default]
    Idle,
    /// A call was started and has not ended yet
    InCall {
        call_id: CallId,
        started_at: DateTime<Utc>,
    },
}

impl CallState {
    pub fn is_in_call(&self) -> bool {
        matches!(self, CallState::InCall { .. })
    }

    pub fn call_id(&self) -> Option<CallId> {
        match self {
            CallState::InCall { call_id, .. } => Some(*call_id),
            CallState::Idle => None,
        }
    }

    /// Check that the call identified by `call_id` is still the active one
    pub fn is_current(&self, call_id: &CallId) -> bool {
        self.call_id().as_ref() == Some(call_id)
    }

    /// Idle -> InCall. Returns the new call id, or `None` if a call is already active.
    pub fn begin(&mut self) -> Option<CallId> {
        match self {
            CallState::InCall { .. } => None,
            CallState::Idle => {
                let call_id = Uuid::new_v4();
                *self = CallState::InCall {
                    call_id,
                    started_at: Utc::now(),
                };
                Some(call_id)
            }
        }
    }

    /// InCall -> Idle. Returns the id of the call that ended, or `None` if idle.
    pub fn finish(&mut self) -> Option<CallId> {
        let call_id = self.call_id();
        *self = CallState::Idle;
        call_id
    }
}

/// Media flags of the call, kept across calls like a user preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    pub local_audio: bool,
    pub local_video: bool,
    pub remote_audio: bool,
    pub remote_video: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            local_audio: true,
            local_video: true,
            remote_audio: true,
            remote_video: true,
        }
    }
}
