//! Folds from a raw snapshot into label → count maps.
//!
//! Every fold is pure and deterministic: the same input always yields the
//! same [`CountMap`], regardless of session order. Zero counts are never
//! stored, to keep metric cardinality down.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::activity::{self, Activity, Thresholds};
use crate::jellyfin::{LibraryCounts, SessionRecord};

/// Sparse, ordered mapping from a label to a positive count.
pub type CountMap = BTreeMap<String, u64>;

/// Per-user session counts derived from one session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounts {
    /// Sessions actively streaming, by user.
    pub streams: CountMap,
    /// Sessions connected or streaming, by user.
    pub connected: CountMap,
}

/// Count, per user, the sessions whose activity satisfies `predicate`.
///
/// Sessions without a user name are skipped.
pub fn count_per_user<P>(
    sessions: &[SessionRecord],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
    predicate: P,
) -> CountMap
where
    P: Fn(Activity) -> bool,
{
    let mut counts = CountMap::new();

    for session in sessions {
        let Some(user) = session.user() else {
            continue;
        };

        if predicate(activity::classify(session, now, thresholds)) {
            *counts.entry(user.to_string()).or_insert(0) += 1;
        }
    }

    counts
}

/// Classify every session once and build both per-user maps.
pub fn summarize_sessions(
    sessions: &[SessionRecord],
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> SessionCounts {
    let mut summary = SessionCounts::default();

    for session in sessions {
        let Some(user) = session.user() else {
            continue;
        };

        let tier = activity::classify(session, now, thresholds);
        if tier.is_streaming() {
            *summary.streams.entry(user.to_string()).or_insert(0) += 1;
        }
        if tier.is_connected() {
            *summary.connected.entry(user.to_string()).or_insert(0) += 1;
        }
    }

    summary
}

/// Map library counters onto their canonical bucket names, omitting
/// buckets that are zero or negative.
pub fn media_counts(counts: &LibraryCounts) -> CountMap {
    let buckets = [
        ("albums", counts.album_count),
        ("artists", counts.artist_count),
        ("books", counts.book_count),
        ("boxSets", counts.box_set_count),
        ("episodes", counts.episode_count),
        ("items", counts.item_count),
        ("movies", counts.movie_count),
        ("music_videos", counts.music_video_count),
        ("programs", counts.program_count),
        ("series", counts.series_count),
        ("songs", counts.song_count),
        ("trailers", counts.trailer_count),
    ];

    buckets
        .into_iter()
        .filter_map(|(name, count)| {
            u64::try_from(count)
                .ok()
                .filter(|count| *count > 0)
                .map(|count| (name.to_string(), count))
        })
        .collect()
}
