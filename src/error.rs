use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{name} is not defined (set it in .env, the environment or config.toml)")]
    ConfigMissing { name: &'static str },

    #[error("channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("Discord API error: {status} {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid cron expression '{expr}': {source}")]
    InvalidCron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("trigger {name} stopped: no future runs")]
    TriggerStopped { name: String },

    #[error("trigger task failed: {0}")]
    TriggerFailed(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn channel_not_found(channel_id: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel_id: channel_id.into(),
        }
    }

    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
