//! Local publisher lifecycle

use tracing::{debug, error, info, warn};

use super::CommunicationController;
use crate::call::CallId;
use crate::error::CommunicationError;
use crate::session::{Publisher, TransportError, VideoType};

impl CommunicationController {
    /// Create and publish the local camera for `call_id`.
    ///
    /// Failures go to `on_error`. A publisher that completes after its call
    /// ended, or while another publisher is already live, is unpublished again.
    pub(super) async fn publish(&self, call_id: CallId) {
        let properties = self.settings.publisher_properties();
        let target = self.settings.render_targets.publisher.clone();

        let publisher = match self.transport.init_publisher(&target, &properties).await {
            Ok(publisher) => publisher,
            Err(e) => {
                self.report_call_failure("init_publisher", e).await;
                return;
            }
        };
        if publisher.video_type != VideoType::Camera {
            debug!(publisher = %publisher.id, video_type = %publisher.video_type, "Publisher created with non-camera source");
        }

        let media = self.state.read().await.media;
        if !media.local_audio {
            self.transport.publish_audio(&publisher, false).await;
        }
        if !media.local_video {
            self.transport.publish_video(&publisher, false).await;
        }

        if let Err(e) = self.transport.publish(&publisher).await {
            self.transport.unpublish(&publisher).await;
            self.report_call_failure("publish", e).await;
            return;
        }

        let stale = {
            let mut state = self.state.write().await;
            if !state.call.is_current(&call_id) {
                Some("call ended while publishing")
            } else if state.publisher.is_some() {
                Some("a publisher is already live")
            } else {
                state.publisher = Some(publisher.clone());
                None
            }
        };

        match stale {
            None => info!(call_id = %call_id, publisher = %publisher.id, "Publishing local camera"),
            Some(reason) => {
                warn!(call_id = %call_id, publisher = %publisher.id, reason, "Releasing stale publisher");
                self.transport.unpublish(&publisher).await;
            }
        }
    }

    /// Unpublish the local publisher. No-op without one.
    pub(super) async fn unpublish(&self) {
        let publisher: Option<Publisher> = {
            let mut state = self.state.write().await;
            state.publisher_stream = None;
            state.camera_id = None;
            state.publisher.take()
        };
        match publisher {
            Some(publisher) => {
                self.transport.unpublish(&publisher).await;
                info!(publisher = %publisher.id, "Local publisher unpublished");
            }
            None => debug!("No publisher to unpublish"),
        }
    }

    /// Map a transport failure and hand it to `on_error`
    pub(super) async fn report_call_failure(&self, operation: &str, e: TransportError) {
        let error = CommunicationError::call_failed(e);
        error!(
            operation,
            code = ?error.code(),
            network = error.is_network_error(),
            error = %error,
            "Transport operation failed"
        );
        self.handler().await.on_error(error).await;
    }
}
