//! Call options and their validation
//!
//! [`CallOptions`] is the constructor input of the controller. Validation splits
//! it into the structural fields the controller keeps as direct fields
//! (`session`, `subscribers`, `streams`) and the configurable remainder,
//! [`CallSettings`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CommunicationError, CommunicationResult};
use crate::session::{Session, Stream};

/// Publisher/subscriber properties handed to the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProperties {
    /// Display name shown to the other participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_controls: Option<bool>,
    /// Transport specific properties passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaProperties {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_insert_mode(mut self, insert_mode: impl Into<String>) -> Self {
        self.insert_mode = Some(insert_mode.into());
        self
    }

    pub fn with_size(mut self, width: impl Into<String>, height: impl Into<String>) -> Self {
        self.width = Some(width.into());
        self.height = Some(height.into());
        self
    }
}

/// Local user, used to label the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Render targets (container ids) for local and remote video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTargets {
    /// Local preview
    pub publisher: String,
    /// Remote camera video
    pub camera: String,
    /// Remote shared screen
    pub screen: String,
}

impl Default for RenderTargets {
    fn default() -> Self {
        Self {
            publisher: "videoHolderSmall".to_string(),
            camera: "videoHolderBig".to_string(),
            screen: "videoHolderSharedScreen".to_string(),
        }
    }
}

/// Constructor input of the communication controller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOptions {
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Remote streams already known when the controller is created
    #[serde(default)]
    pub subscribers: Vec<Stream>,
    /// Additional known streams, merged after `subscribers`
    #[serde(default)]
    pub streams: Vec<Stream>,
    /// Bind the annotation overlay to incoming screen shares
    #[serde(default)]
    pub annotation: bool,
    #[serde(default)]
    pub local_call_properties: MediaProperties,
    #[serde(default)]
    pub local_screen_properties: MediaProperties,
    #[serde(default)]
    pub user: Option<UserInfo>,
    /// Ignored on input; the controller's call state is the only authority
    #[serde(default)]
    pub in_session: bool,
    #[serde(default)]
    pub render_targets: RenderTargets,
}

impl CallOptions {
    /// Create options for the given session with defaults everywhere else
    pub fn new(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Default::default()
        }
    }

    /// Parse options from their JSON representation
    pub fn from_json(json: &str) -> CommunicationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CommunicationError::invalid_configuration("options", e.to_string()))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_annotation(mut self, annotation: bool) -> Self {
        self.annotation = annotation;
        self
    }

    pub fn with_user(mut self, name: impl Into<String>) -> Self {
        self.user = Some(UserInfo {
            name: name.into(),
            id: None,
        });
        self
    }

    pub fn with_call_properties(mut self, properties: MediaProperties) -> Self {
        self.local_call_properties = properties;
        self
    }

    pub fn with_screen_properties(mut self, properties: MediaProperties) -> Self {
        self.local_screen_properties = properties;
        self
    }

    /// Seed the streams already present in the session
    pub fn with_known_streams(mut self, streams: Vec<Stream>) -> Self {
        self.subscribers = streams;
        self
    }

    pub fn with_render_targets(mut self, targets: RenderTargets) -> Self {
        self.render_targets = targets;
        self
    }

    /// Validate these options (see [`validate_options`])
    pub fn validate(self) -> CommunicationResult<ValidatedOptions> {
        validate_options(Some(self))
    }
}

/// The configurable part of [`CallOptions`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallSettings {
    pub api_key: Option<String>,
    pub annotation: bool,
    pub local_call_properties: MediaProperties,
    pub local_screen_properties: MediaProperties,
    pub user: Option<UserInfo>,
    pub render_targets: RenderTargets,
}

impl CallSettings {
    /// Properties for the local publisher, labelled with the user name if one is set
    pub fn publisher_properties(&self) -> MediaProperties {
        let mut properties = self.local_call_properties.clone();
        if let Some(user) = &self.user {
            properties.name = Some(user.name.clone());
        }
        properties
    }
}

/// Result of a successful validation
#[derive(Debug, Clone)]
pub struct ValidatedOptions {
    pub session: Session,
    pub subscribers: Vec<Stream>,
    pub streams: Vec<Stream>,
    pub settings: CallSettings,
}

/// Validate controller options.
///
/// Fails with [`CommunicationError::NoSession`] when the options or their
/// session are absent. The session, `subscribers` and `streams` are split
/// off; everything else becomes [`CallSettings`].
pub fn validate_options(options: Option<CallOptions>) -> CommunicationResult<ValidatedOptions> {
    let options = options.ok_or(CommunicationError::NoSession)?;
    let session = options.session.ok_or(CommunicationError::NoSession)?;

    if options.in_session {
        warn!("in_session was set on construction options; a call only starts through start()");
    }

    Ok(ValidatedOptions {
        session,
        subscribers: options.subscribers,
        streams: options.streams,
        settings: CallSettings {
            api_key: options.api_key,
            annotation: options.annotation,
            local_call_properties: options.local_call_properties,
            local_screen_properties: options.local_screen_properties,
            user: options.user,
            render_targets: options.render_targets,
        },
    })
}
