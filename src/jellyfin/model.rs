//! Wire types for the Jellyfin REST API.
//!
//! Every field is optional. Older and newer servers populate different
//! subsets of the session payload, and a field that is missing or `null`
//! decodes to "absent" instead of failing the whole snapshot.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One client session as reported by `GET /Sessions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRecord {
    /// Owning user. Several devices of one user share the same name.
    #[serde(default)]
    pub user_name: Option<String>,

    /// Server-reported liveness (newer API shape only).
    #[serde(default)]
    pub is_active: Option<bool>,

    #[serde(default)]
    pub play_state: Option<PlayState>,

    #[serde(default)]
    pub last_activity_date: Option<DateTime<Utc>>,

    /// Last time the client reported playback progress.
    #[serde(default)]
    pub last_playback_check_in: Option<DateTime<Utc>>,

    /// Media selected for playback, if any.
    #[serde(default)]
    pub now_playing_item: Option<NowPlayingItem>,
}

/// Playback state of a session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayState {
    #[serde(default)]
    pub is_paused: Option<bool>,

    /// DirectPlay, DirectStream or Transcode. Empty when nothing plays.
    #[serde(default)]
    pub play_method: Option<String>,
}

/// Reference to the item a session is playing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NowPlayingItem {
    #[serde(rename = "Id", default)]
    pub id: Option<String>,
}

impl SessionRecord {
    /// User name, if the session is attributed to one.
    pub fn user(&self) -> Option<&str> {
        self.user_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Whether playback is paused. Absent state reads as not paused.
    pub fn is_paused(&self) -> bool {
        self.play_state
            .as_ref()
            .and_then(|s| s.is_paused)
            .unwrap_or(false)
    }

    /// Playback method, or `None` when absent.
    pub fn play_method(&self) -> Option<&str> {
        self.play_state
            .as_ref()
            .and_then(|s| s.play_method.as_deref())
    }
}

/// Library item counts as reported by `GET /Items/Counts`.
///
/// Counters are signed so a bogus negative value drops only its own
/// bucket instead of failing the whole decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LibraryCounts {
    pub album_count: i64,
    pub artist_count: i64,
    pub book_count: i64,
    pub box_set_count: i64,
    pub episode_count: i64,
    pub item_count: i64,
    pub movie_count: i64,
    pub music_video_count: i64,
    pub program_count: i64,
    pub series_count: i64,
    pub song_count: i64,
    pub trailer_count: i64,
}

/// Server identity as reported by `GET /System/Info`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServerInfo {
    pub server_name: String,
    pub version: String,
    pub id: String,
}
