//! Remote subscriptions and screen-share annotation binding

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::CommunicationController;
use crate::call::CallId;
use crate::config::MediaProperties;
use crate::events::{CallEvent, EventPayload};
use crate::registry::{classify, StreamClass};
use crate::session::{Stream, StreamId, Subscriber};

impl CommunicationController {
    fn subscription_target(&self, stream: &Stream) -> (&str, &MediaProperties) {
        let targets = &self.settings.render_targets;
        match classify(stream) {
            StreamClass::Screen => (targets.screen.as_str(), &self.settings.local_screen_properties),
            StreamClass::Camera | StreamClass::Other => {
                (targets.camera.as_str(), &self.settings.local_call_properties)
            }
        }
    }

    /// Subscribe to `stream` on behalf of `call_id`.
    ///
    /// Streams with a live subscription are skipped. A subscription that
    /// completes after its call ended is released immediately.
    pub(super) async fn subscribe_to_stream(&self, call_id: CallId, stream: Stream) {
        if self.subscriptions.contains_key(&stream.id) {
            debug!(stream_id = %stream.id, "Already subscribed");
            return;
        }

        let (target, properties) = self.subscription_target(&stream);
        let subscriber = match self.transport.subscribe(&stream, target, properties).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                self.report_call_failure("subscribe", e).await;
                return;
            }
        };

        let class = classify(&stream);
        let (kept, media) = {
            let mut state = self.state.write().await;
            let wanted = state.call.is_current(&call_id)
                && state.known_streams.contains(&stream.id)
                && !self.subscriptions.contains_key(&stream.id);
            if wanted {
                self.subscriptions.insert(stream.id.clone(), subscriber.clone());
                if class == StreamClass::Camera {
                    state.camera_subscriber = Some(subscriber.clone());
                    state.remote_participant = Some(stream.connection_id.clone());
                }
            }
            (wanted, state.media)
        };

        if !kept {
            warn!(
                call_id = %call_id,
                stream_id = %stream.id,
                subscriber = %subscriber.id,
                "Subscription no longer wanted, releasing"
            );
            self.transport.unsubscribe(&subscriber).await;
            return;
        }
        info!(
            call_id = %call_id,
            stream_id = %stream.id,
            subscriber = %subscriber.id,
            target = %subscriber.target,
            "Subscribed to remote stream"
        );

        if class == StreamClass::Camera {
            if !media.remote_audio {
                self.transport.subscribe_to_audio(&subscriber, false).await;
            }
            if !media.remote_video {
                self.transport.subscribe_to_video(&subscriber, false).await;
            }
        }

        if !self.is_live(call_id, &subscriber).await {
            debug!(stream_id = %stream.id, "Subscription ended before it was reported");
            return;
        }
        self.handler().await.on_subscribe(stream.clone()).await;

        if class == StreamClass::Screen && self.settings.annotation {
            if !self.is_live(call_id, &subscriber).await {
                debug!(stream_id = %stream.id, "Screen share ended before viewing started");
                return;
            }
            self.broadcaster.trigger(
                CallEvent::StartViewingSharedScreen,
                EventPayload::Subscriber(subscriber.clone()),
            );
            self.bind_annotation(call_id, subscriber).await;
        }
    }

    /// Check that `subscriber` is still the live subscription of its stream within `call_id`
    async fn is_live(&self, call_id: CallId, subscriber: &Subscriber) -> bool {
        let state = self.state.read().await;
        state.call.is_current(&call_id) && self.is_tracked(subscriber)
    }

    fn is_tracked(&self, subscriber: &Subscriber) -> bool {
        self.subscriptions
            .get(&subscriber.stream.id)
            .map(|live| live.id == subscriber.id)
            .unwrap_or(false)
    }

    /// Unsubscribe every live subscription. Safe when there are none.
    pub(super) async fn unsubscribe_all(&self) {
        let stream_ids: Vec<StreamId> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let subscribers: Vec<Subscriber> = stream_ids
            .iter()
            .filter_map(|id| self.subscriptions.remove(id).map(|(_, subscriber)| subscriber))
            .collect();

        {
            let mut state = self.state.write().await;
            state.camera_subscriber = None;
            state.remote_participant = None;
            state.remote_audio_only = false;
        }

        if subscribers.is_empty() {
            debug!("No subscriptions to release");
            return;
        }
        join_all(subscribers.iter().map(|s| self.transport.unsubscribe(s))).await;
        info!(count = subscribers.len(), "Unsubscribed from remote streams");
    }

    /// Drop the subscription of a stream the transport destroyed
    pub(super) async fn forget_subscription(&self, stream_id: &StreamId) {
        if self.subscriptions.remove(stream_id).is_none() {
            return;
        }
        let mut state = self.state.write().await;
        let is_camera = state
            .camera_subscriber
            .as_ref()
            .map(|s| &s.stream.id == stream_id)
            .unwrap_or(false);
        if is_camera {
            state.camera_subscriber = None;
            state.remote_audio_only = false;
        }
    }

    /// Subscribe to every known stream without a live subscription
    pub(super) async fn resubscribe_known_streams(&self) {
        let (call_id, streams) = {
            let state = self.state.read().await;
            (state.call.call_id(), state.known_streams.snapshot())
        };
        let Some(call_id) = call_id else {
            debug!("Not in a call, nothing to re-subscribe");
            return;
        };
        for stream in streams {
            self.subscribe_to_stream(call_id, stream).await;
        }
    }

    /// Attach the annotation overlay to a screen share, tearing down any previous binding first
    async fn bind_annotation(&self, call_id: CallId, subscriber: Subscriber) {
        let Some(binding) = self.annotation.read().await.clone() else {
            debug!(stream_id = %subscriber.stream.id, "No annotation binding installed");
            return;
        };

        let previous = {
            let mut state = self.state.write().await;
            if !state.call.is_current(&call_id) || !self.is_tracked(&subscriber) {
                debug!(stream_id = %subscriber.stream.id, "Screen share ended before binding");
                return;
            }
            state.annotation_stream.replace(subscriber.stream.id.clone())
        };
        if let Some(previous) = previous {
            info!(previous = %previous, next = %subscriber.stream.id, "Replacing annotation binding");
            binding.unlink().await;
        }

        if let Err(e) = binding.link(&subscriber).await {
            error!(stream_id = %subscriber.stream.id, error = %e, "Failed to link annotation overlay");
            {
                let mut state = self.state.write().await;
                if state.annotation_stream.as_ref() == Some(&subscriber.stream.id) {
                    state.annotation_stream = None;
                }
            }
            self.handler().await.on_error(e).await;
            return;
        }

        // The call or the share may have ended while linking
        let stale = {
            let mut state = self.state.write().await;
            if state.call.is_current(&call_id) && self.is_tracked(&subscriber) {
                false
            } else {
                let ours = state.annotation_stream.as_ref() == Some(&subscriber.stream.id);
                if ours {
                    state.annotation_stream = None;
                }
                // Another share took the overlay over; leave it linked
                ours || state.annotation_stream.is_none()
            }
        };
        if stale {
            warn!(stream_id = %subscriber.stream.id, "Annotation linked after the share ended, unlinking");
            binding.unlink().await;
        }
    }

    /// Tear down the annotation binding of `stream_id`, if it has one
    pub(super) async fn teardown_annotation(&self, stream_id: &StreamId) {
        let bound = {
            let mut state = self.state.write().await;
            if state.annotation_stream.as_ref() == Some(stream_id) {
                state.annotation_stream.take()
            } else {
                None
            }
        };
        if bound.is_none() {
            return;
        }
        let binding = self.annotation.read().await.clone();
        if let Some(binding) = binding {
            binding.unlink().await;
            info!(stream_id = %stream_id, "Annotation overlay unlinked");
        }
    }

    /// Tear down whatever binding is active
    pub(super) async fn release_annotation(&self) {
        let bound = self.state.write().await.annotation_stream.take();
        let Some(stream_id) = bound else {
            return;
        };
        let binding = self.annotation.read().await.clone();
        if let Some(binding) = binding {
            binding.unlink().await;
            info!(stream_id = %stream_id, "Annotation overlay released");
        }
    }
}
