//! One-to-one communication controller
//!
//! The controller turns transport stream events into a call lifecycle:
//!
//! ```text
//!            start()                         end()
//!   Idle ─────────────► InCall { call_id } ─────────► Idle
//!    ▲  ╲ end(): endCall only ╲ start(): no-op          │
//!    └───────────────────────────────────────────────────┘
//! ```
//!
//! - **`publisher`** - the local outgoing stream (publish/unpublish)
//! - **`subscriber`** - remote subscriptions and screen-share annotation binding
//! - **`builder`** - fluent construction
//!
//! Transport completions are awaited without holding any lock. Each one
//! re-checks that the call it belongs to is still the active call before
//! storing its result; stale results are released back to the transport.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use accpack_communication_core::*;
//! # async fn example(transport: Arc<dyn MediaTransport>) -> CommunicationResult<()> {
//! let registrar = ChannelRegistrar::default();
//! let mut events = registrar.subscribe();
//!
//! let controller = CommunicationController::new(
//!     CallOptions::new(Session::new("session-id", "connection-id")).with_annotation(true),
//!     &registrar,
//!     transport,
//! )?;
//!
//! // Feed transport events in emission order
//! let (event_tx, event_rx) = tokio::sync::mpsc::channel(32);
//! controller.spawn_event_loop(event_rx);
//!
//! controller.start(None).await;
//! # drop(event_tx);
//! while let Ok(event) = events.recv().await {
//!     if event.event == CallEvent::EndViewingSharedScreen {
//!         break;
//!     }
//! }
//! controller.end().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod publisher;
mod subscriber;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::annotation::AnnotationBinding;
use crate::call::{CallId, CallState, MediaState};
use crate::config::{CallOptions, CallSettings};
use crate::error::{CommunicationError, CommunicationResult};
use crate::events::{
    CallEvent, CommunicationEventHandler, EventBroadcaster, EventPayload, EventRegistrar,
    LocalMediaEvent, MediaType, NoopEventHandler, RemoteMediaEvent,
};
use crate::registry::{classify, StreamClass, StreamRegistry};
use crate::session::{
    ConnectionId, MediaTransport, Publisher, PublisherId, Session, Stream, StreamId, Subscriber,
    SubscriberId, TransportEvent,
};

pub use builder::CommunicationBuilder;

/// Property name the transport uses for audio changes
const HAS_AUDIO_PROPERTY: &str = "hasAudio";

/// Reason the transport gives when it disables video for bad network quality
const QUALITY_REASON: &str = "quality";

/// Mutable per-call state
#[derive(Debug, Default)]
struct ControllerState {
    call: CallState,
    publisher: Option<Publisher>,
    /// Stream of the local publisher once the transport reports it live
    publisher_stream: Option<Stream>,
    known_streams: StreamRegistry,
    /// Remote camera subscription targeted by the remote media toggles
    camera_subscriber: Option<Subscriber>,
    remote_participant: Option<ConnectionId>,
    /// Screen stream the annotation overlay is bound to
    annotation_stream: Option<StreamId>,
    media: MediaState,
    /// The transport disabled the remote camera video
    remote_audio_only: bool,
    camera_id: Option<i32>,
}

/// Call coordination over an external media transport
pub struct CommunicationController {
    session: Session,
    settings: CallSettings,
    transport: Arc<dyn MediaTransport>,
    broadcaster: EventBroadcaster,
    handler: RwLock<Arc<dyn CommunicationEventHandler>>,
    annotation: RwLock<Option<Arc<dyn AnnotationBinding>>>,
    state: RwLock<ControllerState>,
    subscriptions: DashMap<StreamId, Subscriber>,
}

impl std::fmt::Debug for CommunicationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationController")
            .field("session", &self.session.id)
            .field("settings", &self.settings)
            .field("broadcaster", &self.broadcaster)
            .field("handler", &"<event handler>")
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl CommunicationController {
    /// Validate `options`, register the broadcast events and create the controller.
    ///
    /// Fails with [`CommunicationError::NoSession`](crate::CommunicationError::NoSession)
    /// when no session is provided.
    pub fn new(
        options: CallOptions,
        registrar: &dyn EventRegistrar,
        transport: Arc<dyn MediaTransport>,
    ) -> CommunicationResult<Arc<Self>> {
        let validated = options.validate()?;

        let known_streams: StreamRegistry = validated
            .subscribers
            .into_iter()
            .chain(validated.streams)
            .collect();

        let broadcaster = EventBroadcaster::register(registrar, &CallEvent::ALL);

        info!(
            session_id = %validated.session.id,
            connection_id = %validated.session.connection_id(),
            known_streams = known_streams.len(),
            annotation = validated.settings.annotation,
            "Communication controller created"
        );

        Ok(Arc::new(Self {
            session: validated.session,
            settings: validated.settings,
            transport,
            broadcaster,
            handler: RwLock::new(Arc::new(NoopEventHandler)),
            annotation: RwLock::new(None),
            state: RwLock::new(ControllerState {
                known_streams,
                ..Default::default()
            }),
            subscriptions: DashMap::new(),
        }))
    }

    /// Install the callback handler
    pub async fn set_event_handler(&self, handler: Arc<dyn CommunicationEventHandler>) {
        *self.handler.write().await = handler;
    }

    /// Install the annotation overlay driven by screen shares
    pub async fn set_annotation_binding(&self, binding: Arc<dyn AnnotationBinding>) {
        *self.annotation.write().await = Some(binding);
    }

    async fn handler(&self) -> Arc<dyn CommunicationEventHandler> {
        self.handler.read().await.clone()
    }

    // ===== CALL CONTROL =====

    /// Start a call.
    ///
    /// Publishes the local camera, subscribes to every stream already known
    /// and broadcasts `startCall`. While a call is active this does nothing
    /// and returns the active call's id. Publish/subscribe failures are
    /// reported through [`CommunicationEventHandler::on_error`].
    pub async fn start(&self, recipient: Option<&str>) -> CallId {
        let call_id = {
            let mut state = self.state.write().await;
            match state.call.begin() {
                Some(call_id) => call_id,
                None => {
                    let active = state.call.call_id().unwrap_or_default();
                    debug!(call_id = %active, "start() while a call is active, ignoring");
                    return active;
                }
            }
        };
        info!(call_id = %call_id, recipient = ?recipient, "Starting call");

        self.publish(call_id).await;

        let known = {
            let state = self.state.read().await;
            if !state.call.is_current(&call_id) {
                debug!(call_id = %call_id, "Call ended while publishing, skipping start");
                return call_id;
            }
            state.known_streams.snapshot()
        };
        for stream in known {
            self.subscribe_to_stream(call_id, stream).await;
        }

        if self.state.read().await.call.is_current(&call_id) {
            self.broadcaster.trigger(CallEvent::StartCall, EventPayload::None);
        }
        call_id
    }

    /// End the active call.
    ///
    /// Unpublishes, unsubscribes everything, releases the annotation overlay
    /// and broadcasts `endCall`. On an idle controller the same sequence runs
    /// against empty state.
    pub async fn end(&self) {
        let ended = self.state.write().await.call.finish();

        self.unpublish().await;
        self.unsubscribe_all().await;
        self.release_annotation().await;

        self.broadcaster.trigger(CallEvent::EndCall, EventPayload::None);
        match ended {
            Some(call_id) => info!(call_id = %call_id, "Call ended"),
            None => debug!("end() on an idle controller"),
        }
    }

    /// End the call and forget everything learned from the session
    pub async fn destroy(&self) {
        self.end().await;
        {
            let mut state = self.state.write().await;
            state.known_streams.clear();
            state.remote_participant = None;
        }
        *self.annotation.write().await = None;
        *self.handler.write().await = Arc::new(NoopEventHandler);
        info!(session_id = %self.session.id, "Communication controller destroyed");
    }

    // ===== MEDIA CONTROL =====

    pub async fn enable_local_audio(&self, enabled: bool) {
        let publisher = {
            let mut state = self.state.write().await;
            state.media.local_audio = enabled;
            state.publisher.clone()
        };
        if let Some(publisher) = publisher {
            self.transport.publish_audio(&publisher, enabled).await;
        }
    }

    pub async fn enable_local_video(&self, enabled: bool) {
        let publisher = {
            let mut state = self.state.write().await;
            state.media.local_video = enabled;
            state.publisher.clone()
        };
        if let Some(publisher) = publisher {
            self.transport.publish_video(&publisher, enabled).await;
        }
    }

    pub async fn enable_remote_audio(&self, enabled: bool) {
        let subscriber = {
            let mut state = self.state.write().await;
            state.media.remote_audio = enabled;
            state.camera_subscriber.clone()
        };
        if let Some(subscriber) = subscriber {
            self.transport.subscribe_to_audio(&subscriber, enabled).await;
        }
        self.handler()
            .await
            .on_enable_remote_media(RemoteMediaEvent {
                media: MediaType::Audio,
                enabled,
            })
            .await;
    }

    pub async fn enable_remote_video(&self, enabled: bool) {
        let subscriber = {
            let mut state = self.state.write().await;
            state.media.remote_video = enabled;
            state.camera_subscriber.clone()
        };
        if let Some(subscriber) = subscriber {
            self.transport.subscribe_to_video(&subscriber, enabled).await;
        }
        self.handler()
            .await
            .on_enable_remote_media(RemoteMediaEvent {
                media: MediaType::Video,
                enabled,
            })
            .await;
    }

    /// Cycle to the next camera, if publishing
    pub async fn swap_camera(&self) {
        let publisher = self.state.read().await.publisher.clone();
        match publisher {
            Some(publisher) => self.transport.cycle_camera(&publisher).await,
            None => debug!("swap_camera() without a publisher"),
        }
    }

    // ===== TRANSPORT EVENTS =====

    /// Drive the controller from a channel of transport events.
    ///
    /// Events are handled one at a time in the order they were sent. The task
    /// finishes when every sender is dropped.
    pub fn spawn_event_loop(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                controller.handle_transport_event(event).await;
            }
            debug!("Transport event channel closed");
        })
    }

    /// Handle one transport event to completion
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        trace!(?event, "Transport event");
        match event {
            TransportEvent::StreamCreated { stream } => self.handle_stream_created(stream).await,
            TransportEvent::StreamDestroyed { stream } => self.handle_stream_destroyed(stream).await,
            TransportEvent::StreamPropertyChanged {
                stream,
                changed_property,
                new_value,
            } => {
                self.handle_stream_property_changed(stream, &changed_property, new_value)
                    .await
            }
            TransportEvent::PublisherStreamCreated { publisher, stream } => {
                self.handle_publisher_stream_created(publisher, stream).await
            }
            TransportEvent::PublisherStreamDestroyed { publisher, stream } => {
                self.handle_publisher_stream_destroyed(publisher, stream).await
            }
            TransportEvent::RemoteVideoDisabled { subscriber, reason } => {
                self.handle_remote_video_changed(subscriber, false, &reason).await
            }
            TransportEvent::RemoteVideoEnabled { subscriber, reason } => {
                self.handle_remote_video_changed(subscriber, true, &reason).await
            }
            TransportEvent::RemoteVideoDisableWarning { subscriber } => {
                if self.is_camera_subscriber(&subscriber).await {
                    warn!(subscriber = %subscriber, "Remote video may be disabled soon");
                    self.handler().await.on_quality_warning(true).await;
                }
            }
            TransportEvent::RemoteVideoDisableWarningLifted { subscriber } => {
                debug!(subscriber = %subscriber, "Remote video quality recovered");
            }
            TransportEvent::CameraChanged { publisher, camera_id } => {
                self.handle_camera_changed(publisher, camera_id).await
            }
            TransportEvent::CameraError { publisher, error } => {
                let error = CommunicationError::camera_failed(error);
                error!(publisher = %publisher, error = %error, "Camera error");
                self.handler().await.on_error(error).await;
            }
            TransportEvent::Reconnecting => {
                warn!(session_id = %self.session.id, "Session reconnecting");
                self.handler().await.on_reconnecting().await;
            }
            TransportEvent::Reconnected => {
                info!(session_id = %self.session.id, "Session reconnected");
                self.handler().await.on_reconnected().await;
            }
        }
    }

    async fn is_camera_subscriber(&self, subscriber: &SubscriberId) -> bool {
        let state = self.state.read().await;
        let current = state
            .camera_subscriber
            .as_ref()
            .map(|s| &s.id == subscriber)
            .unwrap_or(false);
        if !current {
            debug!(subscriber = %subscriber, "Video event for a subscriber that is not the remote camera");
        }
        current
    }

    async fn handle_remote_video_changed(&self, subscriber: SubscriberId, enabled: bool, reason: &str) {
        {
            let mut state = self.state.write().await;
            let current = state
                .camera_subscriber
                .as_ref()
                .map(|s| s.id == subscriber)
                .unwrap_or(false);
            if !current {
                debug!(subscriber = %subscriber, "Video event for a subscriber that is not the remote camera");
                return;
            }
            state.remote_audio_only = !enabled;
        }
        info!(subscriber = %subscriber, enabled, reason, "Remote video changed");

        let handler = self.handler().await;
        handler.on_audio_only(!enabled).await;
        if !enabled && reason == QUALITY_REASON {
            handler.on_quality_warning(false).await;
        }
    }

    async fn handle_camera_changed(&self, publisher: PublisherId, camera_id: i32) {
        {
            let mut state = self.state.write().await;
            let ours = state.publisher.as_ref().map(|p| p.id == publisher).unwrap_or(false);
            if !ours {
                debug!(publisher = %publisher, "Camera change for a publisher we no longer own");
                return;
            }
            state.camera_id = Some(camera_id);
        }
        info!(camera_id, "Camera changed");
        self.handler().await.on_camera_changed(camera_id).await;
    }

    async fn handle_stream_created(&self, stream: Stream) {
        let call_id = {
            let mut state = self.state.write().await;
            if !state.known_streams.add(stream.clone()) {
                drop(state);
                warn!(stream_id = %stream.id, "Duplicate stream announcement, not subscribing again");
                self.broadcaster
                    .trigger(CallEvent::StreamCreated, EventPayload::Stream(stream));
                return;
            }
            let call_id = state.call.call_id();
            if call_id.is_some() {
                state.remote_participant = Some(stream.connection_id.clone());
            }
            call_id
        };
        info!(stream_id = %stream.id, video_type = %stream.video_type, "Remote stream created");

        if let Some(call_id) = call_id {
            self.subscribe_to_stream(call_id, stream.clone()).await;
        }

        self.broadcaster
            .trigger(CallEvent::StreamCreated, EventPayload::Stream(stream.clone()));
        self.handler().await.on_stream_created(stream).await;
    }

    async fn handle_stream_destroyed(&self, stream: Stream) {
        let removed = self.state.write().await.known_streams.remove(&stream.id);
        if removed.is_none() {
            debug!(stream_id = %stream.id, "Destroyed stream was not known");
        }
        self.forget_subscription(&stream.id).await;
        info!(stream_id = %stream.id, video_type = %stream.video_type, "Remote stream destroyed");

        match classify(&stream) {
            StreamClass::Camera => {
                self.broadcaster
                    .trigger(CallEvent::StreamDestroyed, EventPayload::Stream(stream.clone()));
                self.state.write().await.remote_participant = None;
                self.handler().await.on_stream_destroyed(stream).await;
            }
            StreamClass::Screen => {
                self.broadcaster
                    .trigger(CallEvent::EndViewingSharedScreen, EventPayload::None);
                self.handler().await.on_screen_sharing_ended().await;
                self.teardown_annotation(&stream.id).await;
            }
            StreamClass::Other => {
                warn!(
                    stream_id = %stream.id,
                    video_type = %stream.video_type,
                    "Unrecognised video type destroyed, re-subscribing known streams"
                );
                self.resubscribe_known_streams().await;
            }
        }
    }

    async fn handle_stream_property_changed(&self, stream: Stream, property: &str, enabled: bool) {
        let media = if property == HAS_AUDIO_PROPERTY {
            MediaType::Audio
        } else {
            MediaType::Video
        };

        {
            let mut state = self.state.write().await;
            let is_local = state
                .publisher_stream
                .as_ref()
                .map(|own| own.id == stream.id)
                .unwrap_or(false);
            if !is_local {
                trace!(stream_id = %stream.id, property, "Remote stream property changed");
                return;
            }
            match media {
                MediaType::Audio => state.media.local_audio = enabled,
                MediaType::Video => state.media.local_video = enabled,
            }
        }

        debug!(property, enabled, "Local media property changed");
        self.handler()
            .await
            .on_enable_local_media(LocalMediaEvent {
                property: media,
                enabled,
            })
            .await;
    }

    async fn handle_publisher_stream_created(&self, publisher: PublisherId, stream: Stream) {
        {
            let mut state = self.state.write().await;
            let ours = state.publisher.as_ref().map(|p| p.id == publisher).unwrap_or(false);
            if !ours {
                debug!(publisher = %publisher, "Stream created for a publisher we no longer own");
                return;
            }
            state.publisher_stream = Some(stream.clone());
        }
        info!(publisher = %publisher, stream_id = %stream.id, "Local stream live");
        self.handler().await.on_started().await;
    }

    async fn handle_publisher_stream_destroyed(&self, publisher: PublisherId, stream: Stream) {
        {
            let mut state = self.state.write().await;
            let ours = state
                .publisher_stream
                .as_ref()
                .map(|own| own.id == stream.id)
                .unwrap_or(false);
            if ours {
                state.publisher_stream = None;
            }
        }
        info!(publisher = %publisher, stream_id = %stream.id, "Local stream ended");
        self.handler().await.on_ended().await;
    }

    // ===== QUERIES =====

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    pub async fn state(&self) -> CallState {
        self.state.read().await.call.clone()
    }

    pub async fn is_started(&self) -> bool {
        self.state.read().await.call.is_in_call()
    }

    pub async fn call_id(&self) -> Option<CallId> {
        self.state.read().await.call.call_id()
    }

    pub async fn publisher(&self) -> Option<Publisher> {
        self.state.read().await.publisher.clone()
    }

    pub async fn media_state(&self) -> MediaState {
        self.state.read().await.media
    }

    pub async fn local_audio(&self) -> bool {
        self.media_state().await.local_audio
    }

    pub async fn local_video(&self) -> bool {
        self.media_state().await.local_video
    }

    pub async fn remote_audio(&self) -> bool {
        self.media_state().await.remote_audio
    }

    pub async fn remote_video(&self) -> bool {
        self.media_state().await.remote_video
    }

    /// Whether a remote participant joined the active call
    pub async fn is_remote(&self) -> bool {
        self.state.read().await.remote_participant.is_some()
    }

    pub async fn remote_participant(&self) -> Option<ConnectionId> {
        self.state.read().await.remote_participant.clone()
    }

    /// Whether a remote screen share is currently subscribed
    pub fn is_screensharing(&self) -> bool {
        self.subscriptions.iter().any(|entry| entry.value().stream.is_screen())
    }

    /// Remote streams announced by the transport, in arrival order
    pub async fn known_streams(&self) -> Vec<Stream> {
        self.state.read().await.known_streams.snapshot()
    }

    /// Whether the transport disabled the remote camera video
    pub async fn is_remote_audio_only(&self) -> bool {
        self.state.read().await.remote_audio_only
    }

    /// Camera last reported by the transport for the local publisher
    pub async fn camera_id(&self) -> Option<i32> {
        self.state.read().await.camera_id
    }

    /// Streams with a live subscription
    pub fn subscribed_streams(&self) -> Vec<StreamId> {
        self.subscriptions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Screen stream the annotation overlay is bound to
    pub async fn annotated_stream(&self) -> Option<StreamId> {
        self.state.read().await.annotation_stream.clone()
    }
}
