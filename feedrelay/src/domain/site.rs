//! Supported external services.

use serde::{Deserialize, Serialize};

use super::cursor::CursorMode;

/// External services a feed can be tracked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Site {
    YouTube,
    Twitch,
    Twitter,
    Bluesky,
    AniList,
    MyAnimeList,
}

impl Site {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Twitch => "twitch",
            Self::Twitter => "twitter",
            Self::Bluesky => "bluesky",
            Self::AniList => "anilist",
            Self::MyAnimeList => "myanimelist",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(Self::YouTube),
            "twitch" => Some(Self::Twitch),
            "twitter" => Some(Self::Twitter),
            "bluesky" => Some(Self::Bluesky),
            "anilist" => Some(Self::AniList),
            "myanimelist" => Some(Self::MyAnimeList),
            _ => None,
        }
    }

    /// How this service's cursor markers are compared.
    ///
    /// Services with ordinal item ids (snowflakes, numeric stream ids)
    /// compare numerically; list services diff against a snapshot of the
    /// whole list.
    pub fn cursor_mode(&self) -> CursorMode {
        match self {
            Self::Twitter | Self::Bluesky | Self::Twitch => CursorMode::Ordinal,
            Self::YouTube | Self::AniList | Self::MyAnimeList => CursorMode::Snapshot,
        }
    }

    /// All supported sites.
    pub fn all() -> &'static [Site] {
        &[
            Self::YouTube,
            Self::Twitch,
            Self::Twitter,
            Self::Bluesky,
            Self::AniList,
            Self::MyAnimeList,
        ]
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
