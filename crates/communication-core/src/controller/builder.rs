//! Builder for creating communication controllers

use std::sync::Arc;

use crate::annotation::AnnotationBinding;
use crate::config::{CallOptions, MediaProperties, RenderTargets};
use crate::error::{CommunicationError, CommunicationResult};
use crate::events::{ChannelRegistrar, CommunicationEventHandler, EventRegistrar};
use crate::session::{MediaTransport, Session, Stream};

use super::CommunicationController;

/// Builder for creating a communication controller
pub struct CommunicationBuilder {
    options: CallOptions,
    transport: Option<Arc<dyn MediaTransport>>,
    registrar: Option<Arc<dyn EventRegistrar>>,
    handler: Option<Arc<dyn CommunicationEventHandler>>,
    annotation: Option<Arc<dyn AnnotationBinding>>,
}

impl CommunicationBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            options: CallOptions::default(),
            transport: None,
            registrar: None,
            handler: None,
            annotation: None,
        }
    }

    /// Replace all options at once
    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the session the call runs in
    pub fn session(mut self, session: Session) -> Self {
        self.options.session = Some(session);
        self
    }

    /// Set the media transport
    pub fn transport(mut self, transport: Arc<dyn MediaTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the registrar broadcast events are registered with
    pub fn registrar(mut self, registrar: Arc<dyn EventRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Set the callback handler
    pub fn event_handler(mut self, handler: Arc<dyn CommunicationEventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Enable annotation and bind the overlay to incoming screen shares
    pub fn annotation_binding(mut self, binding: Arc<dyn AnnotationBinding>) -> Self {
        self.options.annotation = true;
        self.annotation = Some(binding);
        self
    }

    pub fn annotation(mut self, enabled: bool) -> Self {
        self.options.annotation = enabled;
        self
    }

    /// Set the display name of the local publisher
    pub fn user(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.with_user(name);
        self
    }

    pub fn call_properties(mut self, properties: MediaProperties) -> Self {
        self.options.local_call_properties = properties;
        self
    }

    pub fn screen_properties(mut self, properties: MediaProperties) -> Self {
        self.options.local_screen_properties = properties;
        self
    }

    pub fn render_targets(mut self, targets: RenderTargets) -> Self {
        self.options.render_targets = targets;
        self
    }

    /// Seed streams already present in the session
    pub fn known_streams(mut self, streams: Vec<Stream>) -> Self {
        self.options.subscribers = streams;
        self
    }

    /// Build the controller.
    ///
    /// Without a registrar, events go to a fresh [`ChannelRegistrar`] that
    /// nobody listens to.
    pub async fn build(self) -> CommunicationResult<Arc<CommunicationController>> {
        let transport = self.transport.ok_or_else(|| {
            CommunicationError::invalid_configuration("transport", "a media transport is required")
        })?;
        let registrar: Arc<dyn EventRegistrar> = match self.registrar {
            Some(registrar) => registrar,
            None => Arc::new(ChannelRegistrar::default()),
        };

        let controller = CommunicationController::new(self.options, registrar.as_ref(), transport)?;
        if let Some(handler) = self.handler {
            controller.set_event_handler(handler).await;
        }
        if let Some(binding) = self.annotation {
            controller.set_annotation_binding(binding).await;
        }
        Ok(controller)
    }
}

impl Default for CommunicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
