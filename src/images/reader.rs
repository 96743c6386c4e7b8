use std::sync::LazyLock;

use regex::Regex;

use super::{ImageCandidate, SourceKind, dedupe_by_url};
use crate::error::Error;
use crate::platform::{self, Message, Platform};

static IMAGE_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S+\.(?:jpg|jpeg|png|gif|webp|bmp|tiff)(?:\?\S*)?")
        .expect("image URL pattern is valid")
});

/// Image URLs written into message text.
pub fn extract_inline_urls(text: &str) -> Vec<&str> {
    IMAGE_URL_PATTERN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Pull candidates out of a message window. Pure; no platform access.
pub fn extract_candidates(messages: &[Message], include_inline_links: bool) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();
    for message in messages {
        for attachment in message.attachments.iter().filter(|a| a.is_image()) {
            candidates.push(ImageCandidate {
                url: attachment.url.clone(),
                filename: Some(attachment.filename.clone()),
                size_bytes: attachment.size,
                source: SourceKind::Attachment,
            });
        }
        if include_inline_links {
            for (i, url) in extract_inline_urls(&message.content).into_iter().enumerate() {
                candidates.push(ImageCandidate {
                    url: url.to_string(),
                    filename: Some(format!("url-image-{}", i + 1)),
                    size_bytes: None,
                    source: SourceKind::InlineLink,
                });
            }
        }
    }
    dedupe_by_url(candidates)
}

/// Read the most recent `window_size` messages of `channel_id` and collect
/// image candidates. Never fails: a missing channel or a platform error
/// yields an empty list.
pub async fn read(
    platform: &dyn Platform,
    channel_id: &str,
    window_size: u8,
    include_inline_links: bool,
) -> Vec<ImageCandidate> {
    tracing::info!("Fetching images from channel ID: {channel_id}");

    let channel = match platform.resolve_channel(channel_id).await {
        Ok(channel) => channel,
        Err(Error::ChannelNotFound { .. }) => {
            tracing::error!("Image channel not found: {channel_id}");
            platform::log_available_channels(platform).await;
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("Error resolving image channel {channel_id}: {e}");
            return Vec::new();
        }
    };

    tracing::info!("Fetching messages from channel: {}", channel.display_name());
    let messages = match platform.fetch_recent_messages(channel_id, window_size).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!("Error fetching images from channel {channel_id}: {e}");
            return Vec::new();
        }
    };
    tracing::debug!("Total messages fetched: {}", messages.len());

    let candidates = extract_candidates(&messages, include_inline_links);
    tracing::info!("Found {} images in the channel", candidates.len());
    candidates
}
