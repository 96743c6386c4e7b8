pub mod discord;
#[cfg(test)]
pub mod fake;

use serde::Deserialize;

use crate::error::Result;

// --- Wire types ---

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl User {
    /// `name#1234` for legacy accounts, plain username otherwise.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if d != "0" => format!("{}#{d}", self.username),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

impl ChannelInfo {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Image to attach to an outgoing message; the platform fetches `url` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub image: Option<ImageUpload>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(content: impl Into<String>, image: ImageUpload) -> Self {
        Self {
            content: content.into(),
            image: Some(image),
        }
    }
}

// --- Platform trait ---

/// Session with the messaging platform.
///
/// `resolve_channel` fails with `Error::ChannelNotFound` when the id does not
/// resolve to a channel the bot can see.
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    async fn current_user(&self) -> Result<User>;
    async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelInfo>;
    async fn fetch_recent_messages(&self, channel_id: &str, limit: u8) -> Result<Vec<Message>>;
    async fn send_message(&self, channel_id: &str, message: &OutgoingMessage) -> Result<()>;
    async fn visible_channels(&self) -> Result<Vec<ChannelInfo>>;
}

/// Log the channels the bot can see, to diagnose a bad channel id.
pub async fn log_available_channels(platform: &dyn Platform) {
    match platform.visible_channels().await {
        Ok(channels) => {
            let listing: Vec<String> = channels
                .iter()
                .map(|ch| format!("{} ({})", ch.display_name(), ch.id))
                .collect();
            tracing::error!("Available channels: [{}]", listing.join(", "));
        }
        Err(e) => tracing::warn!("Could not list available channels: {e}"),
    }
}
