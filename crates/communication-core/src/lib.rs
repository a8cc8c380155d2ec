//! Communication-core: one-to-one call coordination layer
//!
//! This crate turns the stream events of an external real-time media transport
//! into a coherent call: publish the local camera on `start()`, subscribe to
//! remote camera and screen-share streams, bind the annotation overlay to the
//! shared screen and broadcast a fixed set of named events to whoever listens.
//!
//! ## Layering
//! ```text
//! host application
//!   ├── CommunicationEventHandler  (callbacks)
//!   ├── EventRegistrar             (broadcast fan-out)
//!   └── CommunicationController
//!         ├── StreamRegistry       (known remote streams)
//!         ├── publisher lifecycle  ─┐
//!         ├── subscriber lifecycle ─┼──► MediaTransport (external)
//!         └── AnnotationBinding   ──┘
//! ```
//!
//! The transport itself, the annotation drawing surface and any UI are not
//! part of this crate. They are reached through the [`MediaTransport`],
//! [`AnnotationBinding`] and [`EventRegistrar`] seams.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use accpack_communication_core::*;
//! # async fn example(transport: Arc<dyn MediaTransport>) -> CommunicationResult<()> {
//! let controller = CommunicationBuilder::new()
//!     .session(Session::new("session-id", "connection-id"))
//!     .user("Ada")
//!     .transport(transport)
//!     .build()
//!     .await?;
//!
//! let call_id = controller.start(None).await;
//! controller.enable_local_audio(false).await;
//! controller.end().await;
//! # let _ = call_id;
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod call;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod registry;
pub mod session;

pub use annotation::{
    validate_session, AnnotationAccessory, AnnotationBinding, AnnotationOptions, AnnotationState,
};
pub use call::{CallId, CallState, MediaState};
pub use config::{
    validate_options, CallOptions, CallSettings, MediaProperties, RenderTargets, UserInfo,
    ValidatedOptions,
};
pub use controller::{CommunicationBuilder, CommunicationController};
pub use error::{CommunicationError, CommunicationResult};
pub use events::{
    BroadcastEvent, CallEvent, ChannelRegistrar, CommunicationEventHandler, EventBroadcaster,
    EventPayload, EventRegistrar, LocalMediaEvent, MediaType, NoopEventHandler, RemoteMediaEvent,
    TriggerFn,
};
pub use registry::{classify, StreamClass, StreamRegistry};
pub use session::{
    Connection, ConnectionId, MediaTransport, Publisher, PublisherId, Session, Stream, StreamId,
    Subscriber, SubscriberId, TransportError, TransportEvent, VideoType,
};

/// Communication-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
