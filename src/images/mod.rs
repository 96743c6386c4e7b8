pub mod reader;
pub mod selector;

use std::collections::HashSet;
use std::fmt;

use crate::config::ImageSource;
use crate::platform::{ImageUpload, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Attachment,
    InlineLink,
    Configured,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Attachment => "attachment",
            SourceKind::InlineLink => "content",
            SourceKind::Configured => "configured",
        })
    }
}

/// One image reference found during a read pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub filename: Option<String>,
    pub size_bytes: Option<u64>,
    pub source: SourceKind,
}

impl ImageCandidate {
    /// Candidates from a literal URL list. Blank entries are dropped.
    pub fn from_urls(urls: &[String]) -> Vec<Self> {
        let candidates = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(|url| Self {
                url: url.to_string(),
                filename: None,
                size_bytes: None,
                source: SourceKind::Configured,
            })
            .collect();
        dedupe_by_url(candidates)
    }

    /// File name used for re-upload: explicit name, else last URL path segment.
    pub fn upload_name(&self) -> String {
        if let Some(name) = self.filename.as_deref().filter(|n| n.contains('.')) {
            return name.to_string();
        }
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('/').next() {
            Some(segment) if segment.contains('.') => segment.to_string(),
            _ => "image.png".to_string(),
        }
    }

    pub fn to_upload(&self) -> ImageUpload {
        ImageUpload {
            url: self.url.clone(),
            filename: self.upload_name(),
        }
    }
}

/// Candidates from whichever source is configured.
pub async fn collect(
    platform: &dyn Platform,
    source: &ImageSource,
    window_size: u8,
    include_inline_links: bool,
) -> Vec<ImageCandidate> {
    match source {
        ImageSource::Channel(id) => {
            reader::read(platform, id, window_size, include_inline_links).await
        }
        ImageSource::Urls(urls) => ImageCandidate::from_urls(urls),
    }
}

/// Keep the first occurrence of every URL.
pub fn dedupe_by_url(candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}
