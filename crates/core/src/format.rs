//! Link representations returned by the image host

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output format for a shareable link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFormat {
    #[default]
    Url,
    Markdown,
    Html,
    Bbcode,
    Thumbnail,
}

impl LinkFormat {
    pub const ALL: [LinkFormat; 5] = [
        LinkFormat::Url,
        LinkFormat::Markdown,
        LinkFormat::Html,
        LinkFormat::Bbcode,
        LinkFormat::Thumbnail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkFormat::Url => "url",
            LinkFormat::Markdown => "markdown",
            LinkFormat::Html => "html",
            LinkFormat::Bbcode => "bbcode",
            LinkFormat::Thumbnail => "thumbnail",
        }
    }
}

impl std::fmt::Display for LinkFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(LinkFormat::Url),
            "markdown" | "md" => Ok(LinkFormat::Markdown),
            "html" => Ok(LinkFormat::Html),
            "bbcode" => Ok(LinkFormat::Bbcode),
            "thumbnail" | "thumb" => Ok(LinkFormat::Thumbnail),
            other => Err(Error::InvalidInput(format!(
                "Unknown link format '{}' (expected url, markdown, html, bbcode, thumbnail)",
                other
            ))),
        }
    }
}

/// Every link representation the server returned for one image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Links {
    /// The link in the requested format, falling back to the plain URL.
    pub fn get(&self, format: LinkFormat) -> &str {
        let preferred = match format {
            LinkFormat::Url => None,
            LinkFormat::Markdown => self.markdown.as_deref(),
            LinkFormat::Html => self.html.as_deref(),
            LinkFormat::Bbcode => self.bbcode.as_deref(),
            LinkFormat::Thumbnail => self.thumbnail_url.as_deref(),
        };
        preferred
            .filter(|s| !s.is_empty())
            .or(self.url.as_deref())
            .unwrap_or("")
    }

    /// All present link values
    pub fn values(&self) -> impl Iterator<Item = &str> {
        [
            &self.url,
            &self.markdown,
            &self.html,
            &self.bbcode,
            &self.thumbnail_url,
        ]
        .into_iter()
        .filter_map(|v| v.as_deref())
    }
}
