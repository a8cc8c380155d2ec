//! Contract with the external media transport
//!
//! The transport owns the real session, the media engine and the network. This
//! crate never talks to the wire itself; it consumes the narrow surface below:
//!
//! ```text
//! host app ──TransportEvent──► CommunicationController ──MediaTransport──► transport
//!                                        │
//!                                        └──EventRegistrar──► other consumers
//! ```
//!
//! Identifiers are opaque strings minted by the transport.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MediaProperties;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identity of a remote or local media stream
    StreamId
);
string_id!(
    /// Identity of a participant connection within a session
    ConnectionId
);
string_id!(
    /// Transport handle of the local publisher
    PublisherId
);
string_id!(
    /// Transport handle of a remote subscription
    SubscriberId
);

/// Connection of the local participant
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub connection_id: String,
}

/// Transport session the call runs in
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub connection: Connection,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection: Connection {
                connection_id: connection_id.into(),
            },
            api_key: None,
            token: None,
        }
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, token: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.token = Some(token.into());
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.connection.connection_id
    }
}

/// Video source of a stream as reported by the transport.
///
/// Anything other than `camera` or `screen` is preserved verbatim in
/// [`VideoType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoType {
    Camera,
    Screen,
    Other(String),
}

impl VideoType {
    pub fn as_str(&self) -> &str {
        match self {
            VideoType::Camera => "camera",
            VideoType::Screen => "screen",
            VideoType::Other(other) => other,
        }
    }
}

impl From<&str> for VideoType {
    fn from(value: &str) -> Self {
        match value {
            "camera" => VideoType::Camera,
            "screen" => VideoType::Screen,
            other => VideoType::Other(other.to_string()),
        }
    }
}

impl From<String> for VideoType {
    fn from(value: String) -> Self {
        VideoType::from(value.as_str())
    }
}

impl From<VideoType> for String {
    fn from(value: VideoType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for VideoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flow of media produced by the transport. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: StreamId,
    pub video_type: VideoType,
    pub connection_id: ConnectionId,
}

impl Stream {
    pub fn new(
        id: impl Into<StreamId>,
        video_type: impl Into<VideoType>,
        connection_id: impl Into<ConnectionId>,
    ) -> Self {
        Self {
            id: id.into(),
            video_type: video_type.into(),
            connection_id: connection_id.into(),
        }
    }

    pub fn camera(id: impl Into<StreamId>, connection_id: impl Into<ConnectionId>) -> Self {
        Self::new(id, VideoType::Camera, connection_id)
    }

    pub fn screen(id: impl Into<StreamId>, connection_id: impl Into<ConnectionId>) -> Self {
        Self::new(id, VideoType::Screen, connection_id)
    }

    pub fn is_screen(&self) -> bool {
        self.video_type == VideoType::Screen
    }
}

/// Handle to the local outgoing stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publisher {
    pub id: PublisherId,
    pub video_type: VideoType,
    /// Render target the preview is attached to
    pub target: String,
}

/// Handle to a remote incoming stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub stream: Stream,
    /// Render target the remote video is attached to
    pub target: String,
}

/// Error reported by a publish/subscribe completion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    pub code: i32,
    pub message: String,
}

impl TransportError {
    /// Code the transport uses for connectivity loss
    pub const NETWORK_ERROR_CODE: i32 = 1010;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_network_error(&self) -> bool {
        self.code == Self::NETWORK_ERROR_CODE
    }
}

/// Events raised by the transport session, delivered in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A remote participant started publishing
    StreamCreated { stream: Stream },
    /// A remote stream went away
    StreamDestroyed { stream: Stream },
    /// A property of a stream changed (`hasAudio`, `hasVideo`, ...)
    StreamPropertyChanged {
        stream: Stream,
        changed_property: String,
        new_value: bool,
    },
    /// The local publisher's stream is live
    PublisherStreamCreated { publisher: PublisherId, stream: Stream },
    /// The local publisher's stream ended
    PublisherStreamDestroyed { publisher: PublisherId, stream: Stream },
    /// The transport stopped delivering a subscriber's video (`reason` is
    /// `quality`, `publishVideo`, `subscribeToVideo`, ...)
    RemoteVideoDisabled { subscriber: SubscriberId, reason: String },
    RemoteVideoEnabled { subscriber: SubscriberId, reason: String },
    /// Network quality is degrading and video may be disabled soon
    RemoteVideoDisableWarning { subscriber: SubscriberId },
    RemoteVideoDisableWarningLifted { subscriber: SubscriberId },
    /// The publisher switched to another camera
    CameraChanged { publisher: PublisherId, camera_id: i32 },
    /// The publisher's camera failed
    CameraError { publisher: PublisherId, error: TransportError },
    /// The session lost its connection and is retrying
    Reconnecting,
    /// The session connection was restored
    Reconnected,
}

/// Operations the controller needs from the media transport.
///
/// Completion of `publish`/`subscribe` is the resolution of the returned
/// future; failures come back as [`TransportError`].
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create the local publisher and attach its preview to `target`
    async fn init_publisher(
        &self,
        target: &str,
        properties: &MediaProperties,
    ) -> Result<Publisher, TransportError>;

    /// Start sending the publisher's media into the session
    async fn publish(&self, publisher: &Publisher) -> Result<(), TransportError>;

    async fn unpublish(&self, publisher: &Publisher);

    /// Subscribe to a remote stream, rendering into `target`
    async fn subscribe(
        &self,
        stream: &Stream,
        target: &str,
        properties: &MediaProperties,
    ) -> Result<Subscriber, TransportError>;

    async fn unsubscribe(&self, subscriber: &Subscriber);

    async fn publish_audio(&self, publisher: &Publisher, enabled: bool);

    async fn publish_video(&self, publisher: &Publisher, enabled: bool);

    async fn subscribe_to_audio(&self, subscriber: &Subscriber, enabled: bool);

    async fn subscribe_to_video(&self, subscriber: &Subscriber, enabled: bool);

    /// Switch to the next camera (optional - transports without several cameras ignore it)
    async fn cycle_camera(&self, _publisher: &Publisher) {}
}
