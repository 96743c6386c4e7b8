//! In-memory platform for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Attachment, ChannelInfo, Message, OutgoingMessage, Platform, User};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct FakePlatform {
    channels: HashMap<String, Vec<Message>>,
    pub fail_fetch: bool,
    pub fail_send: bool,
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, id: &str, messages: Vec<Message>) -> Self {
        self.channels.insert(id.to_string(), messages);
        self
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn message(id: &str, content: &str, attachments: Vec<Attachment>) -> Message {
    Message {
        id: id.to_string(),
        content: content.to_string(),
        author: None,
        attachments,
    }
}

pub fn attachment(filename: &str, content_type: Option<&str>) -> Attachment {
    Attachment {
        filename: filename.to_string(),
        size: Some(1024),
        url: format!("https://cdn.example.com/{filename}"),
        content_type: content_type.map(String::from),
    }
}

#[async_trait::async_trait]
impl Platform for FakePlatform {
    async fn current_user(&self) -> Result<User> {
        Ok(User {
            id: "0".into(),
            username: "kidsly-bot".into(),
            discriminator: None,
        })
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelInfo> {
        if self.channels.contains_key(channel_id) {
            Ok(ChannelInfo {
                id: channel_id.to_string(),
                name: Some(format!("channel-{channel_id}")),
                kind: 0,
            })
        } else {
            Err(Error::channel_not_found(channel_id))
        }
    }

    async fn fetch_recent_messages(&self, channel_id: &str, limit: u8) -> Result<Vec<Message>> {
        if self.fail_fetch {
            return Err(Error::Api {
                status: 403,
                body: "Missing Access".into(),
            });
        }
        let messages = self
            .channels
            .get(channel_id)
            .ok_or_else(|| Error::channel_not_found(channel_id))?;
        Ok(messages.iter().take(limit as usize).cloned().collect())
    }

    async fn send_message(&self, channel_id: &str, message: &OutgoingMessage) -> Result<()> {
        if self.fail_send {
            return Err(Error::Api {
                status: 500,
                body: "Internal Server Error".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), message.clone()));
        Ok(())
    }

    async fn visible_channels(&self) -> Result<Vec<ChannelInfo>> {
        let mut ids: Vec<&String> = self.channels.keys().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| ChannelInfo {
                id: id.clone(),
                name: Some(format!("channel-{id}")),
                kind: 0,
            })
            .collect())
    }
}
