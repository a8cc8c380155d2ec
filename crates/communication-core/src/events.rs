//! Event handling for communication-core
//!
//! Two independent channels leave the controller:
//!
//! - **Broadcast events** ([`CallEvent`]) go through an [`EventRegistrar`] owned by
//!   the hosting application. The controller registers the fixed event set once
//!   and keeps the returned dispatch function in an [`EventBroadcaster`]; fan-out
//!   to listeners is the registrar's job.
//! - **Callbacks** go to a single [`CommunicationEventHandler`]. Every method has
//!   a no-op default, so consumers override only what they care about.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::CommunicationError;
use crate::session::{Stream, Subscriber};

/// Named events broadcast to external consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallEvent {
    StartCall,
    EndCall,
    StreamCreated,
    StreamDestroyed,
    StartViewingSharedScreen,
    EndViewingSharedScreen,
}

impl CallEvent {
    /// The complete set registered by the controller
    pub const ALL: [CallEvent; 6] = [
        CallEvent::StartCall,
        CallEvent::EndCall,
        CallEvent::StreamCreated,
        CallEvent::StreamDestroyed,
        CallEvent::StartViewingSharedScreen,
        CallEvent::EndViewingSharedScreen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallEvent::StartCall => "startCall",
            CallEvent::EndCall => "endCall",
            CallEvent::StreamCreated => "streamCreated",
            CallEvent::StreamDestroyed => "streamDestroyed",
            CallEvent::StartViewingSharedScreen => "startViewingSharedScreen",
            CallEvent::EndViewingSharedScreen => "endViewingSharedScreen",
        }
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data attached to a broadcast event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    None,
    Stream(Stream),
    /// The subscription a screen share is rendered through
    Subscriber(Subscriber),
}

/// Event as delivered by [`ChannelRegistrar`]
#[derive(Debug, Clone)]
pub struct BroadcastEvent {
    pub event: CallEvent,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

/// Dispatch function handed back by a registrar
pub type TriggerFn = Arc<dyn Fn(CallEvent, EventPayload) + Send + Sync>;

/// External registry that owns event fan-out
pub trait EventRegistrar: Send + Sync {
    /// Register `events` and return the function that dispatches them
    fn register_events(&self, events: &[CallEvent]) -> TriggerFn;
}

/// Broadcasts the registered events through the registrar's dispatch function
#[derive(Clone)]
pub struct EventBroadcaster {
    registered: HashSet<CallEvent>,
    dispatch: TriggerFn,
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("registered", &self.registered)
            .field("dispatch", &"<trigger fn>")
            .finish()
    }
}

impl EventBroadcaster {
    pub fn register(registrar: &dyn EventRegistrar, events: &[CallEvent]) -> Self {
        let dispatch = registrar.register_events(events);
        Self {
            registered: events.iter().copied().collect(),
            dispatch,
        }
    }

    pub fn is_registered(&self, event: CallEvent) -> bool {
        self.registered.contains(&event)
    }

    /// Dispatch `event`. Events that were not registered are dropped here.
    pub fn trigger(&self, event: CallEvent, payload: EventPayload) {
        if !self.is_registered(event) {
            debug!(event = %event, "Dropping unregistered event");
            return;
        }
        debug!(event = %event, "Broadcasting event");
        (self.dispatch)(event, payload);
    }
}

/// Registrar backed by a `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct ChannelRegistrar {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl ChannelRegistrar {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event dispatched after this call
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChannelRegistrar {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventRegistrar for ChannelRegistrar {
    fn register_events(&self, events: &[CallEvent]) -> TriggerFn {
        debug!(count = events.len(), "Registering call events on broadcast channel");
        let tx = self.tx.clone();
        Arc::new(move |event, payload| {
            // No receivers is not an error for a broadcaster
            let _ = tx.send(BroadcastEvent {
                event,
                payload,
                timestamp: Utc::now(),
            });
        })
    }
}

/// Kind of media a toggle applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Audio,
    Video,
}

/// Local publisher media changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMediaEvent {
    pub property: MediaType,
    pub enabled: bool,
}

/// Remote media was toggled through the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMediaEvent {
    pub media: MediaType,
    pub enabled: bool,
}

/// Callbacks for call lifecycle notifications.
///
/// All methods are optional.
#[async_trait]
pub trait CommunicationEventHandler: Send + Sync {
    /// The local publisher's stream is live
    async fn on_started(&self) {}

    /// The local publisher's stream ended
    async fn on_ended(&self) {}

    /// A remote stream was subscribed successfully
    async fn on_subscribe(&self, _stream: Stream) {}

    async fn on_stream_created(&self, _stream: Stream) {}

    /// A remote camera stream went away
    async fn on_stream_destroyed(&self, _stream: Stream) {}

    async fn on_enable_local_media(&self, _event: LocalMediaEvent) {}

    async fn on_enable_remote_media(&self, _event: RemoteMediaEvent) {}

    /// Runtime failure (publish/subscribe/camera/annotation). Never raised as an `Err`.
    async fn on_error(&self, _error: CommunicationError) {}

    async fn on_screen_sharing_ended(&self) {}

    /// Remote video quality changed. `true` is a warning (video may be
    /// disabled soon), `false` an alert (video was disabled for quality).
    async fn on_quality_warning(&self, _warning: bool) {}

    /// The remote camera video was disabled (`true`) or restored (`false`)
    async fn on_audio_only(&self, _enabled: bool) {}

    async fn on_camera_changed(&self, _camera_id: i32) {}

    async fn on_reconnecting(&self) {}

    async fn on_reconnected(&self) {}
}

/// Handler used until the application installs its own
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

impl CommunicationEventHandler for NoopEventHandler {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingRegistrar {
        seen: Arc<Mutex<Vec<CallEvent>>>,
        registered: Mutex<Vec<CallEvent>>,
    }

    impl EventRegistrar for RecordingRegistrar {
        fn register_events(&self, events: &[CallEvent]) -> TriggerFn {
            self.registered.lock().unwrap().extend_from_slice(events);
            let seen = self.seen.clone();
            Arc::new(move |event, _payload| seen.lock().unwrap().push(event))
        }
    }

    #[test]
    fn test_event_names() {
        let names: Vec<&str> = CallEvent::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "startCall",
                "endCall",
                "streamCreated",
                "streamDestroyed",
                "startViewingSharedScreen",
                "endViewingSharedScreen"
            ]
        );
        assert_eq!(
            serde_json::to_string(&CallEvent::EndViewingSharedScreen).unwrap(),
            "\"endViewingSharedScreen\""
        );
    }

    #[test]
    fn test_unregistered_event_is_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registrar = RecordingRegistrar {
            seen: seen.clone(),
            registered: Mutex::new(Vec::new()),
        };

        let broadcaster =
            EventBroadcaster::register(&registrar, &[CallEvent::StartCall, CallEvent::EndCall]);
        broadcaster.trigger(CallEvent::StartCall, EventPayload::None);
        broadcaster.trigger(CallEvent::StreamCreated, EventPayload::None);
        broadcaster.trigger(CallEvent::EndCall, EventPayload::None);

        assert_eq!(*seen.lock().unwrap(), vec![CallEvent::StartCall, CallEvent::EndCall]);
        assert_eq!(registrar.registered.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_channel_registrar_delivers_to_every_receiver() {
        let registrar = ChannelRegistrar::new(8);
        let mut first = registrar.subscribe();
        let mut second = registrar.subscribe();

        let broadcaster = EventBroadcaster::register(&registrar, &CallEvent::ALL);
        broadcaster.trigger(
            CallEvent::StreamCreated,
            EventPayload::Stream(Stream::camera("s1", "c1")),
        );

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event, CallEvent::StreamCreated);
            assert_eq!(event.payload, EventPayload::Stream(Stream::camera("s1", "c1")));
        }
    }

    #[test]
    fn test_channel_registrar_without_receivers() {
        let registrar = ChannelRegistrar::default();
        let broadcaster = EventBroadcaster::register(&registrar, &CallEvent::ALL);
        // Must not panic when nobody listens
        broadcaster.trigger(CallEvent::EndCall, EventPayload::None);
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let registrar = ChannelRegistrar::default();
        let broadcaster = EventBroadcaster::register(&registrar, &CallEvent::ALL);
        broadcaster.trigger(CallEvent::StartCall, EventPayload::None);

        let mut rx = registrar.subscribe();
        tokio_test::assert_err!(rx.try_recv());

        broadcaster.trigger(CallEvent::EndCall, EventPayload::None);
        let event = tokio_test::assert_ok!(rx.try_recv());
        assert_eq!(event.event, CallEvent::EndCall);
        assert_eq!(event.payload, EventPayload::None);
    }
}
