use serde::{Deserialize, Serialize};

// ──────────────────── Delivery Targets ────────────────────

/// A delivery destination on some messaging platform.
///
/// Each variant carries only the fields its platform shape needs. The
/// serialized form (`target_id`) is the stable key used by the schedule
/// store; it must survive a round-trip so a fired trigger can rebuild the
/// target from its stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTarget {
    /// A group chat.
    Group { platform: String, group_id: String },
    /// A channel inside a guild.
    Channel {
        platform: String,
        guild_id: String,
        channel_id: String,
    },
    /// A direct conversation with a single user.
    Private { platform: String, user_id: String },
}

#[derive(Debug, thiserror::Error)]
#[error("Malformed target id: {0}")]
pub struct TargetIdError(String);

impl DeliveryTarget {
    /// Stable, opaque identifier for this target.
    pub fn target_id(&self) -> String {
        match self {
            Self::Group { platform, group_id } => format!("group:{platform}:{group_id}"),
            Self::Channel {
                platform,
                guild_id,
                channel_id,
            } => format!("channel:{platform}:{guild_id}:{channel_id}"),
            Self::Private { platform, user_id } => format!("private:{platform}:{user_id}"),
        }
    }

    /// Rebuild a target from its stored identifier.
    pub fn from_target_id(id: &str) -> Result<Self, TargetIdError> {
        let parts: Vec<&str> = id.split(':').collect();
        match parts.as_slice() {
            ["group", platform, group_id] => Ok(Self::Group {
                platform: (*platform).to_string(),
                group_id: (*group_id).to_string(),
            }),
            ["channel", platform, guild_id, channel_id] => Ok(Self::Channel {
                platform: (*platform).to_string(),
                guild_id: (*guild_id).to_string(),
                channel_id: (*channel_id).to_string(),
            }),
            ["private", platform, user_id] => Ok(Self::Private {
                platform: (*platform).to_string(),
                user_id: (*user_id).to_string(),
            }),
            _ => Err(TargetIdError(id.to_string())),
        }
    }
}

// ──────────────────── Message Scope ────────────────────

/// The conversational context a word cloud is generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageScope {
    /// Target whose history is queried.
    pub target_id: String,
    /// When set, narrow the scope to messages from this author ("mine").
    pub author_id: Option<String>,
}

impl MessageScope {
    pub fn group(target: &DeliveryTarget) -> Self {
        Self {
            target_id: target.target_id(),
            author_id: None,
        }
    }

    pub fn personal(target: &DeliveryTarget, author_id: impl Into<String>) -> Self {
        Self {
            target_id: target.target_id(),
            author_id: Some(author_id.into()),
        }
    }
}

// ──────────────────── Artifacts & Payloads ────────────────────

/// A rendered word-cloud image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl Artifact {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "wordcloud.png".to_string(),
        }
    }
}

/// Payload handed to a transport for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Image(Artifact),
}

/// Trait for platform transports that deliver payloads to targets.
///
/// Use `&self` for all methods — implementations should use interior
/// mutability for any connection state. Delivery success/failure is opaque
/// to callers beyond the returned result.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, target: &DeliveryTarget, payload: OutboundPayload) -> anyhow::Result<()>;
}
