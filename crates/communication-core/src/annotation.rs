//! Annotation overlay entry point
//!
//! The drawing surface and toolbar live outside this crate. What lives here is
//! the accessory's validated entry point and the [`AnnotationBinding`] seam the
//! controller uses to attach the overlay to a screen-share subscription and
//! tear it down again.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{CommunicationError, CommunicationResult};
use crate::session::{Session, Subscriber, SubscriberId};

/// Binding between a screen-share subscription and the annotation overlay
#[async_trait]
pub trait AnnotationBinding: Send + Sync {
    /// Attach the overlay to the subscriber's render target
    async fn link(&self, subscriber: &Subscriber) -> CommunicationResult<()>;

    /// Detach the overlay. Must be safe to call when nothing is linked.
    async fn unlink(&self);
}

/// Construction and start options of the accessory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationOptions {
    #[serde(default)]
    pub session: Option<Session>,
    /// Screen-share browser extension the overlay cooperates with
    #[serde(default)]
    pub extension_id: Option<String>,
    /// Container the canvas is drawn into when linked by the controller
    #[serde(default)]
    pub canvas_container: Option<String>,
}

impl AnnotationOptions {
    pub fn new(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Default::default()
        }
    }

    pub fn with_extension_id(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = Some(extension_id.into());
        self
    }

    pub fn with_canvas_container(mut self, container: impl Into<String>) -> Self {
        self.canvas_container = Some(container.into());
        self
    }
}

/// Lifecycle of the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationState {
    Idle,
    Started { session_id: String },
    Linked {
        session_id: String,
        subscriber: SubscriberId,
        container: String,
    },
}

/// Check the session fields the accessory depends on.
///
/// Credentials (`api_key`, `token`) may be empty.
pub fn validate_session(session: Option<&Session>) -> CommunicationResult<&Session> {
    let session = session.ok_or(CommunicationError::SessionRequired)?;
    if session.id.is_empty() {
        return Err(CommunicationError::EmptySessionId);
    }
    if session.connection.connection_id.is_empty() {
        return Err(CommunicationError::EmptyConnectionId);
    }
    Ok(session)
}

/// The annotation accessory component
#[derive(Debug)]
pub struct AnnotationAccessory {
    session: Session,
    extension_id: Option<String>,
    canvas_container: String,
    state: RwLock<AnnotationState>,
}

impl AnnotationAccessory {
    /// Default canvas container, shared with the remote camera target
    pub const DEFAULT_CANVAS_CONTAINER: &'static str = "videoHolderBig";

    pub fn new(options: AnnotationOptions) -> CommunicationResult<Self> {
        let session = validate_session(options.session.as_ref())?.clone();
        Ok(Self {
            session,
            extension_id: options.extension_id,
            canvas_container: options
                .canvas_container
                .unwrap_or_else(|| Self::DEFAULT_CANVAS_CONTAINER.to_string()),
            state: RwLock::new(AnnotationState::Idle),
        })
    }

    /// Convenience for sharing the accessory with a controller
    pub fn shared(options: AnnotationOptions) -> CommunicationResult<Arc<Self>> {
        Self::new(options).map(Arc::new)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn extension_id(&self) -> Option<&str> {
        self.extension_id.as_deref()
    }

    pub async fn state(&self) -> AnnotationState {
        self.state.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        !matches!(*self.state.read().await, AnnotationState::Idle)
    }

    /// Subscriber the overlay is currently linked to
    pub async fn linked_subscriber(&self) -> Option<SubscriberId> {
        match &*self.state.read().await {
            AnnotationState::Linked { subscriber, .. } => Some(subscriber.clone()),
            _ => None,
        }
    }

    /// Start the overlay for `session`.
    ///
    /// A missing session is rejected before any state changes. Options are
    /// optional; when present they only contribute the canvas container.
    pub async fn start(
        &self,
        session: Option<&Session>,
        options: Option<&AnnotationOptions>,
    ) -> CommunicationResult<()> {
        let session = session.ok_or(CommunicationError::SessionRequired)?;
        if let Some(container) = options.and_then(|o| o.canvas_container.as_ref()) {
            debug!(container = %container, "Annotation start with explicit canvas container");
        }

        let mut state = self.state.write().await;
        if let AnnotationState::Idle = *state {
            *state = AnnotationState::Started {
                session_id: session.id.clone(),
            };
            info!(session_id = %session.id, "Annotation started");
        }
        Ok(())
    }

    /// Link the overlay canvas to a subscriber, starting the overlay if needed
    pub async fn link_canvas(
        &self,
        subscriber: &Subscriber,
        container: &str,
        options: Option<&AnnotationOptions>,
    ) -> CommunicationResult<()> {
        let session = options
            .and_then(|o| o.session.as_ref())
            .unwrap_or(&self.session);

        let mut state = self.state.write().await;
        let session_id = match &*state {
            AnnotationState::Idle => session.id.clone(),
            AnnotationState::Started { session_id } | AnnotationState::Linked { session_id, .. } => {
                session_id.clone()
            }
        };
        *state = AnnotationState::Linked {
            session_id,
            subscriber: subscriber.id.clone(),
            container: container.to_string(),
        };
        info!(subscriber = %subscriber.id, container = %container, "Annotation canvas linked");
        Ok(())
    }

    /// Stop the overlay. Calling it again is a no-op.
    pub async fn end(&self) {
        let mut state = self.state.write().await;
        if *state != AnnotationState::Idle {
            *state = AnnotationState::Idle;
            info!("Annotation ended");
        }
    }
}

#[async_trait]
impl AnnotationBinding for AnnotationAccessory {
    async fn link(&self, subscriber: &Subscriber) -> CommunicationResult<()> {
        self.start(Some(&self.session), None).await?;
        let container = self.canvas_container.clone();
        self.link_canvas(subscriber, &container, None).await
    }

    async fn unlink(&self) {
        self.end().await;
    }
}
