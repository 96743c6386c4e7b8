use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::MessageConfig;
use crate::error::{Error, Result};
use crate::images::ImageCandidate;
use crate::platform::{self, OutgoingMessage, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    SentWithImage,
    SentWithoutImage,
    SkippedNoChannel,
    Failed,
}

impl PostOutcome {
    pub fn is_sent(self) -> bool {
        matches!(self, PostOutcome::SentWithImage | PostOutcome::SentWithoutImage)
    }
}

/// Composes and sends the reminder message.
pub struct Poster {
    text: String,
    fallback_suffix: String,
    display_tz: Tz,
}

impl Poster {
    pub fn new(text: impl Into<String>, fallback_suffix: impl Into<String>, display_tz: Tz) -> Self {
        Self {
            text: text.into(),
            fallback_suffix: fallback_suffix.into(),
            display_tz,
        }
    }

    pub fn from_config(config: &MessageConfig) -> Result<Self> {
        let tz = parse_timezone(&config.display_timezone)?;
        Ok(Self::new(&config.text, &config.fallback_suffix, tz))
    }

    pub fn compose(&self, candidate: Option<&ImageCandidate>) -> OutgoingMessage {
        match candidate {
            Some(c) => OutgoingMessage::with_image(&self.text, c.to_upload()),
            None => OutgoingMessage::text(format!("{}{}", self.text, self.fallback_suffix)),
        }
    }

    /// Send the reminder to `channel_id`. Errors are logged and folded into
    /// the returned outcome.
    pub async fn post(
        &self,
        platform: &dyn Platform,
        channel_id: &str,
        candidate: Option<&ImageCandidate>,
    ) -> PostOutcome {
        tracing::info!("Looking for channel ID: {channel_id}");
        match platform.resolve_channel(channel_id).await {
            Ok(channel) => tracing::debug!("Posting to channel: {}", channel.display_name()),
            Err(Error::ChannelNotFound { .. }) => {
                tracing::error!("Channel not found: {channel_id}");
                platform::log_available_channels(platform).await;
                return PostOutcome::SkippedNoChannel;
            }
            Err(e) => {
                tracing::error!("Error resolving channel {channel_id}: {e:?}");
                return PostOutcome::Failed;
            }
        }

        let message = self.compose(candidate);
        if let Err(e) = platform.send_message(channel_id, &message).await {
            tracing::error!("Error sending message: {e}");
            tracing::error!("{e:?}");
            return PostOutcome::Failed;
        }

        let at = display_time(Utc::now(), self.display_tz);
        if let Some(c) = candidate {
            tracing::info!("Message sent successfully with image {} at {at}", c.url);
            PostOutcome::SentWithImage
        } else {
            tracing::info!("Message sent without image at {at}");
            PostOutcome::SentWithoutImage
        }
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse().map_err(|_| Error::unknown_timezone(name))
}

/// Operator-facing timestamp, e.g. `2024/2/5 8:45:00`.
pub fn display_time(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y/%-m/%-d %-H:%M:%S").to_string()
}
