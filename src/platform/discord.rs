use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{ChannelInfo, Message, OutgoingMessage, Platform, User};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/guide-inc-org/kidsly-bot, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Largest page the messages endpoint will return.
pub const MAX_PAGE_SIZE: u8 = 100;

pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct Guild {
    id: String,
    #[serde(default)]
    name: String,
}

impl DiscordClient {
    pub fn new(token: &str, api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.request(reqwest::Method::GET, path).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Fetch an image for re-upload. CDN URLs take no bot credentials.
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl Platform for DiscordClient {
    async fn current_user(&self) -> Result<User> {
        self.get_json("/users/@me").await
    }

    async fn resolve_channel(&self, channel_id: &str) -> Result<ChannelInfo> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/channels/{channel_id}"))
            .send()
            .await?;
        // Discord answers 403 for channels in guilds the bot cannot see.
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Err(Error::channel_not_found(channel_id));
        }
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn fetch_recent_messages(&self, channel_id: &str, limit: u8) -> Result<Vec<Message>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.get_json(&format!("/channels/{channel_id}/messages?limit={limit}"))
            .await
    }

    async fn send_message(&self, channel_id: &str, message: &OutgoingMessage) -> Result<()> {
        let path = format!("/channels/{channel_id}/messages");
        let req = self.request(reqwest::Method::POST, &path);
        let req = match &message.image {
            None => req.json(&serde_json::json!({ "content": message.content })),
            Some(image) => {
                let bytes = self.download(&image.url).await?;
                tracing::debug!("Downloaded {} ({} bytes)", image.url, bytes.len());
                let payload = serde_json::json!({
                    "content": message.content,
                    "attachments": [{ "id": 0, "filename": image.filename }],
                });
                let form = Form::new()
                    .text("payload_json", serde_json::to_string(&payload)?)
                    .part(
                        "files[0]",
                        Part::bytes(bytes).file_name(image.filename.clone()),
                    );
                req.multipart(form)
            }
        };
        let resp = req.send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn visible_channels(&self) -> Result<Vec<ChannelInfo>> {
        let guilds: Vec<Guild> = self.get_json("/users/@me/guilds").await?;
        let mut channels = Vec::new();
        for guild in guilds {
            match self
                .get_json::<Vec<ChannelInfo>>(&format!("/guilds/{}/channels", guild.id))
                .await
            {
                Ok(list) => channels.extend(list),
                Err(e) => tracing::debug!("Skipping guild {} ({}): {e}", guild.name, guild.id),
            }
        }
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ImageUpload;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> DiscordClient {
        DiscordClient::new("tkn", &server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_current_user_sends_bot_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/@me")
            .match_header("authorization", "Bot tkn")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"42","username":"kidsly","discriminator":"0"}"#)
            .create_async()
            .await;

        let user = client(&server).current_user().await.unwrap();
        assert_eq!(user.tag(), "kidsly");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_channel_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/channels/999")
            .with_status(404)
            .with_body(r#"{"message":"Unknown Channel","code":10003}"#)
            .create_async()
            .await;

        let err = client(&server).resolve_channel("999").await.unwrap_err();
        assert!(matches!(err, Error::ChannelNotFound { ref channel_id } if channel_id == "999"));
    }

    #[tokio::test]
    async fn test_fetch_recent_messages_clamps_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/channels/7/messages")
            .match_query(Matcher::UrlEncoded("limit".into(), "100".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!([
                    {
                        "id": "1",
                        "content": "",
                        "attachments": [{
                            "id": "a",
                            "filename": "cat.png",
                            "size": 2048,
                            "url": "https://cdn.example.com/cat.png",
                            "content_type": "image/png"
                        }]
                    },
                    { "id": "2", "content": "hello" }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let messages = client(&server)
            .fetch_recent_messages("7", 250)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].attachments[0].size, Some(2048));
        assert!(messages[1].attachments.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_text_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/7/messages")
            .match_body(Matcher::PartialJson(serde_json::json!({"content": "hello"})))
            .with_status(200)
            .with_body(r#"{"id":"100"}"#)
            .create_async()
            .await;

        client(&server)
            .send_message("7", &OutgoingMessage::text("hello"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_with_image_uploads_file() {
        let mut server = mockito::Server::new_async().await;
        let download = server
            .mock("GET", "/cdn/cat.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("PNGDATA")
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/channels/7/messages")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="payload_json""#.into()),
                Matcher::Regex(r#"filename="cat.png""#.into()),
                Matcher::Regex("PNGDATA".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"101"}"#)
            .create_async()
            .await;

        let image = ImageUpload {
            url: format!("{}/cdn/cat.png", server.url()),
            filename: "cat.png".into(),
        };
        client(&server)
            .send_message("7", &OutgoingMessage::with_image("hello", image))
            .await
            .unwrap();
        download.assert_async().await;
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_failure_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/channels/7/messages")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = client(&server)
            .send_message("7", &OutgoingMessage::text("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_visible_channels_skips_unreadable_guilds() {
        let mut server = mockito::Server::new_async().await;
        let _guilds = server
            .mock("GET", "/users/@me/guilds")
            .with_status(200)
            .with_body(r#"[{"id":"g1","name":"home"},{"id":"g2","name":"locked"}]"#)
            .create_async()
            .await;
        let _g1 = server
            .mock("GET", "/guilds/g1/channels")
            .with_status(200)
            .with_body(r#"[{"id":"c1","name":"general","type":0}]"#)
            .create_async()
            .await;
        let _g2 = server
            .mock("GET", "/guilds/g2/channels")
            .with_status(403)
            .create_async()
            .await;

        let channels = client(&server).visible_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name(), "general");
    }
}
