//! Shared fixtures for communication-core integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};

use accpack_communication_core::{
    AnnotationBinding, BroadcastEvent, CallEvent, CallOptions, ChannelRegistrar,
    CommunicationController, CommunicationError, CommunicationEventHandler, CommunicationResult,
    LocalMediaEvent, MediaProperties, MediaTransport, Publisher, PublisherId, RemoteMediaEvent,
    Session, Stream, StreamId, Subscriber, SubscriberId, TransportError, VideoType,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("accpack_communication_core=debug")
        .with_test_writer()
        .try_init();
}

/// A call made against the mock transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    InitPublisher { target: String, name: Option<String> },
    Publish(PublisherId),
    Unpublish(PublisherId),
    Subscribe { stream: StreamId, target: String },
    Unsubscribe(SubscriberId),
    PublishAudio(PublisherId, bool),
    PublishVideo(PublisherId, bool),
    SubscribeToAudio(SubscriberId, bool),
    SubscribeToVideo(SubscriberId, bool),
    CycleCamera(PublisherId),
}

/// In-memory transport that records every call
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_id: AtomicUsize,
    publish_error: Mutex<Option<TransportError>>,
    subscribe_errors: Mutex<Vec<(StreamId, TransportError)>>,
    publish_gate: Mutex<Option<Arc<Semaphore>>>,
    subscribe_gate: Mutex<Option<Arc<Semaphore>>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn publishes(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Publish(_)))
    }

    pub fn unpublishes(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Unpublish(_)))
    }

    pub fn subscribes_to(&self, stream: &str) -> usize {
        self.count(|c| matches!(c, TransportCall::Subscribe { stream: s, .. } if s.as_str() == stream))
    }

    pub fn unsubscribes(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Unsubscribe(_)))
    }

    /// Most recent subscriber minted for `stream`
    pub fn subscriber_for(&self, stream: &str) -> Option<SubscriberId> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.stream.id.as_str() == stream)
            .map(|s| s.id.clone())
    }

    /// Fail every publish with `error`
    pub fn fail_publish(&self, error: TransportError) {
        *self.publish_error.lock().unwrap() = Some(error);
    }

    /// Fail the next subscribe to `stream` with `error`
    pub fn fail_next_subscribe(&self, stream: &str, error: TransportError) {
        self.subscribe_errors
            .lock()
            .unwrap()
            .push((StreamId::from(stream), error));
    }

    /// Hold publish completions until permits are added to the returned gate
    pub fn hold_publish(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.publish_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold subscribe completions until permits are added to the returned gate
    pub fn hold_subscribe(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.subscribe_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn mint(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

async fn pass_gate(gate: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn init_publisher(
        &self,
        target: &str,
        properties: &MediaProperties,
    ) -> Result<Publisher, TransportError> {
        self.record(TransportCall::InitPublisher {
            target: target.to_string(),
            name: properties.name.clone(),
        });
        Ok(Publisher {
            id: PublisherId::new(self.mint("publisher")),
            video_type: VideoType::Camera,
            target: target.to_string(),
        })
    }

    async fn publish(&self, publisher: &Publisher) -> Result<(), TransportError> {
        self.record(TransportCall::Publish(publisher.id.clone()));
        pass_gate(&self.publish_gate).await;
        let error = self.publish_error.lock().unwrap().clone();
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn unpublish(&self, publisher: &Publisher) {
        self.record(TransportCall::Unpublish(publisher.id.clone()));
    }

    async fn subscribe(
        &self,
        stream: &Stream,
        target: &str,
        _properties: &MediaProperties,
    ) -> Result<Subscriber, TransportError> {
        self.record(TransportCall::Subscribe {
            stream: stream.id.clone(),
            target: target.to_string(),
        });
        pass_gate(&self.subscribe_gate).await;

        let failure = {
            let mut errors = self.subscribe_errors.lock().unwrap();
            errors
                .iter()
                .position(|(id, _)| id == &stream.id)
                .map(|index| errors.remove(index).1)
        };
        if let Some(error) = failure {
            return Err(error);
        }

        let subscriber = Subscriber {
            id: SubscriberId::new(self.mint("subscriber")),
            stream: stream.clone(),
            target: target.to_string(),
        };
        self.subscribers.lock().unwrap().push(subscriber.clone());
        Ok(subscriber)
    }

    async fn unsubscribe(&self, subscriber: &Subscriber) {
        self.record(TransportCall::Unsubscribe(subscriber.id.clone()));
    }

    async fn publish_audio(&self, publisher: &Publisher, enabled: bool) {
        self.record(TransportCall::PublishAudio(publisher.id.clone(), enabled));
    }

    async fn publish_video(&self, publisher: &Publisher, enabled: bool) {
        self.record(TransportCall::PublishVideo(publisher.id.clone(), enabled));
    }

    async fn subscribe_to_audio(&self, subscriber: &Subscriber, enabled: bool) {
        self.record(TransportCall::SubscribeToAudio(subscriber.id.clone(), enabled));
    }

    async fn subscribe_to_video(&self, subscriber: &Subscriber, enabled: bool) {
        self.record(TransportCall::SubscribeToVideo(subscriber.id.clone(), enabled));
    }

    async fn cycle_camera(&self, publisher: &Publisher) {
        self.record(TransportCall::CycleCamera(publisher.id.clone()));
    }
}

/// Callback received by [`RecordingHandler`]
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerCall {
    Started,
    Ended,
    Subscribe(StreamId),
    StreamCreated(StreamId),
    StreamDestroyed(StreamId),
    LocalMedia(LocalMediaEvent),
    RemoteMedia(RemoteMediaEvent),
    Error(CommunicationError),
    ScreenSharingEnded,
    QualityWarning(bool),
    AudioOnly(bool),
    CameraChanged(i32),
    Reconnecting,
    Reconnected,
}

#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerCall>>,
    subscribe_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingHandler {
    /// Block inside `on_subscribe` until permits are added to the returned gate
    pub fn hold_on_subscribe(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.subscribe_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<CommunicationError> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HandlerCall::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &HandlerCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: HandlerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CommunicationEventHandler for RecordingHandler {
    async fn on_started(&self) {
        self.push(HandlerCall::Started);
    }

    async fn on_ended(&self) {
        self.push(HandlerCall::Ended);
    }

    async fn on_subscribe(&self, stream: Stream) {
        self.push(HandlerCall::Subscribe(stream.id));
        pass_gate(&self.subscribe_gate).await;
    }

    async fn on_stream_created(&self, stream: Stream) {
        self.push(HandlerCall::StreamCreated(stream.id));
    }

    async fn on_stream_destroyed(&self, stream: Stream) {
        self.push(HandlerCall::StreamDestroyed(stream.id));
    }

    async fn on_enable_local_media(&self, event: LocalMediaEvent) {
        self.push(HandlerCall::LocalMedia(event));
    }

    async fn on_enable_remote_media(&self, event: RemoteMediaEvent) {
        self.push(HandlerCall::RemoteMedia(event));
    }

    async fn on_error(&self, error: CommunicationError) {
        self.push(HandlerCall::Error(error));
    }

    async fn on_screen_sharing_ended(&self) {
        self.push(HandlerCall::ScreenSharingEnded);
    }

    async fn on_quality_warning(&self, warning: bool) {
        self.push(HandlerCall::QualityWarning(warning));
    }

    async fn on_audio_only(&self, enabled: bool) {
        self.push(HandlerCall::AudioOnly(enabled));
    }

    async fn on_camera_changed(&self, camera_id: i32) {
        self.push(HandlerCall::CameraChanged(camera_id));
    }

    async fn on_reconnecting(&self) {
        self.push(HandlerCall::Reconnecting);
    }

    async fn on_reconnected(&self) {
        self.push(HandlerCall::Reconnected);
    }
}

/// Operation received by [`RecordingBinding`]
#[derive(Debug, Clone, PartialEq)]
pub enum BindingOp {
    Link(StreamId),
    Unlink,
}

#[derive(Default)]
pub struct RecordingBinding {
    ops: Mutex<Vec<BindingOp>>,
    fail_link: Mutex<bool>,
    link_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingBinding {
    /// Block inside `link` until permits are added to the returned gate
    pub fn hold_link(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.link_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn ops(&self) -> Vec<BindingOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn links(&self) -> usize {
        self.ops().iter().filter(|op| matches!(op, BindingOp::Link(_))).count()
    }

    pub fn unlinks(&self) -> usize {
        self.ops().iter().filter(|op| **op == BindingOp::Unlink).count()
    }

    pub fn fail_links(&self) {
        *self.fail_link.lock().unwrap() = true;
    }
}

#[async_trait]
impl AnnotationBinding for RecordingBinding {
    async fn link(&self, subscriber: &Subscriber) -> CommunicationResult<()> {
        self.ops
            .lock()
            .unwrap()
            .push(BindingOp::Link(subscriber.stream.id.clone()));
        pass_gate(&self.link_gate).await;
        let fail = *self.fail_link.lock().unwrap();
        if fail {
            return Err(CommunicationError::annotation_failed("canvas unavailable"));
        }
        Ok(())
    }

    async fn unlink(&self) {
        self.ops.lock().unwrap().push(BindingOp::Unlink);
    }
}

/// Controller wired to recording collaborators
pub struct Harness {
    pub controller: Arc<CommunicationController>,
    pub transport: Arc<MockTransport>,
    pub handler: Arc<RecordingHandler>,
    pub binding: Arc<RecordingBinding>,
    pub events: broadcast::Receiver<BroadcastEvent>,
}

impl Harness {
    pub async fn new(options: CallOptions) -> Self {
        init_tracing();
        let transport = MockTransport::new();
        let handler = Arc::new(RecordingHandler::default());
        let binding = Arc::new(RecordingBinding::default());
        let registrar = ChannelRegistrar::default();
        let events = registrar.subscribe();

        let controller = CommunicationController::new(options, &registrar, transport.clone())
            .expect("Failed to create controller");
        controller.set_event_handler(handler.clone()).await;
        controller.set_annotation_binding(binding.clone()).await;

        Self {
            controller,
            transport,
            handler,
            binding,
            events,
        }
    }

    pub async fn with_session() -> Self {
        Self::new(CallOptions::new(session())).await
    }

    /// Broadcast events received since the last drain
    pub fn drain_events(&mut self) -> Vec<BroadcastEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn drain_names(&mut self) -> Vec<CallEvent> {
        self.drain_events().into_iter().map(|e| e.event).collect()
    }
}

pub fn session() -> Session {
    Session::new("session-1", "local-connection")
}

/// Poll `condition` until it holds, failing the test after a second
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
