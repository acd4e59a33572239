//! Session activity classification.
//!
//! Every session falls into exactly one [`Activity`] tier. Two payload
//! shapes exist across Jellyfin versions and are detected per record by
//! [`SessionShape`]; they differ only in how "a playback target is
//! selected" is decided; the staleness rules are shared.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::jellyfin::SessionRecord;

/// Activity tier of a session, ordered from least to most active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Activity {
    Disconnected,
    Connected,
    Streaming,
}

impl Activity {
    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }

    /// Streaming sessions are connected too.
    pub fn is_connected(self) -> bool {
        self >= Self::Connected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Streaming => "streaming",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staleness windows applied during classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Maximum age of the last playback check-in for a stream to count.
    pub playback_check_in: Duration,
    /// Maximum age of the last activity for a session to count as connected.
    pub last_activity: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            playback_check_in: Duration::from_secs(2 * 60),
            last_activity: Duration::from_secs(5 * 60),
        }
    }
}

/// API shape a session record was decoded from.
#[derive(Debug, Clone, Copy)]
pub enum SessionShape<'a> {
    /// Older servers: playback is signalled by `NowPlayingItem`.
    Legacy(&'a SessionRecord),
    /// Newer servers: playback is signalled by `IsActive` plus a
    /// non-empty `PlayState.PlayMethod`.
    Current(&'a SessionRecord),
}

impl<'a> SessionShape<'a> {
    /// Detect the shape from the fields the payload actually populated.
    pub fn detect(session: &'a SessionRecord) -> Self {
        if session.is_active.is_some() || session.play_method().is_some() {
            Self::Current(session)
        } else {
            Self::Legacy(session)
        }
    }

    fn session(&self) -> &'a SessionRecord {
        match self {
            Self::Legacy(s) | Self::Current(s) => s,
        }
    }

    /// Whether the session has media chosen for playback.
    pub fn has_playback_target(&self) -> bool {
        match self {
            Self::Legacy(s) => s.now_playing_item.is_some(),
            Self::Current(s) => {
                s.is_active == Some(true) && s.play_method().is_some_and(|m| !m.is_empty())
            }
        }
    }

    /// Whether the session is actively streaming at `now`.
    pub fn is_streaming(&self, now: DateTime<Utc>, thresholds: &Thresholds) -> bool {
        let session = self.session();

        self.has_playback_target()
            && !session.is_paused()
            && is_fresh(
                session.last_playback_check_in,
                now,
                thresholds.playback_check_in,
            )
    }

    /// Classify the session at `now`.
    pub fn classify(&self, now: DateTime<Utc>, thresholds: &Thresholds) -> Activity {
        if self.is_streaming(now, thresholds) {
            return Activity::Streaming;
        }

        if is_fresh(
            self.session().last_activity_date,
            now,
            thresholds.last_activity,
        ) {
            return Activity::Connected;
        }

        Activity::Disconnected
    }
}

/// Classify one session record at `now`.
pub fn classify(session: &SessionRecord, now: DateTime<Utc>, thresholds: &Thresholds) -> Activity {
    SessionShape::detect(session).classify(now, thresholds)
}

/// A timestamp is fresh unless strictly more than `window` has elapsed.
/// Absent timestamps are never fresh; timestamps ahead of `now` are.
pub fn is_fresh(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(timestamp) = timestamp else {
        return false;
    };

    match now.signed_duration_since(timestamp).to_std() {
        Ok(elapsed) => elapsed <= window,
        // Negative elapsed time: the server clock is ahead of ours.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::jellyfin::model::{NowPlayingItem, PlayState};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .expect("valid time")
    }

    fn ago(d: Duration) -> Option<DateTime<Utc>> {
        Some(now() - chrono::Duration::from_std(d).expect("in range"))
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn legacy_playing(check_in: Duration, paused: bool) -> SessionRecord {
        SessionRecord {
            user_name: Some("bob".to_string()),
            play_state: Some(PlayState {
                is_paused: Some(paused),
                play_method: None,
            }),
            last_activity_date: ago(secs(1)),
            last_playback_check_in: ago(check_in),
            now_playing_item: Some(NowPlayingItem {
                id: Some("item".to_string()),
            }),
            ..Default::default()
        }
    }

    fn current_playing(is_active: bool, method: &str, paused: bool) -> SessionRecord {
        SessionRecord {
            user_name: Some("alice".to_string()),
            is_active: Some(is_active),
            play_state: Some(PlayState {
                is_paused: Some(paused),
                play_method: Some(method.to_string()),
            }),
            last_activity_date: ago(secs(1)),
            last_playback_check_in: ago(secs(10)),
            ..Default::default()
        }
    }

    #[test]
    fn test_activity_ordering() {
        assert!(Activity::Streaming.is_connected());
        assert!(Activity::Connected.is_connected());
        assert!(!Activity::Disconnected.is_connected());
        assert!(Activity::Streaming.is_streaming());
        assert!(!Activity::Connected.is_streaming());
        assert_eq!(Activity::Streaming.to_string(), "streaming");
    }

    #[test]
    fn test_detect_shape() {
        let legacy = legacy_playing(secs(10), false);
        assert!(matches!(
            SessionShape::detect(&legacy),
            SessionShape::Legacy(_)
        ));

        let current = current_playing(true, "DirectPlay", false);
        assert!(matches!(
            SessionShape::detect(&current),
            SessionShape::Current(_)
        ));

        let only_flag = SessionRecord {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            SessionShape::detect(&only_flag),
            SessionShape::Current(_)
        ));
    }

    #[test]
    fn test_legacy_streaming() {
        let t = Thresholds::default();
        assert_eq!(
            classify(&legacy_playing(secs(10), false), now(), &t),
            Activity::Streaming
        );
    }

    #[test]
    fn test_paused_is_connected_not_streaming() {
        let t = Thresholds::default();
        assert_eq!(
            classify(&legacy_playing(secs(10), true), now(), &t),
            Activity::Connected
        );
        assert_eq!(
            classify(&current_playing(true, "Transcode", true), now(), &t),
            Activity::Connected
        );
    }

    #[test]
    fn test_no_media_never_streaming() {
        let t = Thresholds::default();
        let mut session = legacy_playing(secs(10), false);
        session.now_playing_item = None;
        assert_eq!(classify(&session, now(), &t), Activity::Connected);

        session.last_activity_date = ago(secs(301));
        assert_eq!(classify(&session, now(), &t), Activity::Disconnected);
    }

    #[test]
    fn test_no_play_state_never_streaming() {
        let t = Thresholds::default();
        let session = SessionRecord {
            user_name: Some("carol".to_string()),
            last_activity_date: ago(secs(30)),
            last_playback_check_in: ago(secs(1)),
            ..Default::default()
        };
        assert_eq!(classify(&session, now(), &t), Activity::Connected);
    }

    #[test]
    fn test_playback_check_in_boundary() {
        let t = Thresholds::default();

        let at_boundary = legacy_playing(secs(120), false);
        assert_eq!(classify(&at_boundary, now(), &t), Activity::Streaming);

        let past_boundary = legacy_playing(secs(120) + Duration::from_millis(1), false);
        assert_eq!(classify(&past_boundary, now(), &t), Activity::Connected);
    }

    #[test]
    fn test_last_activity_boundary() {
        let t = Thresholds::default();
        let mut session = SessionRecord {
            user_name: Some("dave".to_string()),
            last_activity_date: ago(secs(300)),
            ..Default::default()
        };
        assert_eq!(classify(&session, now(), &t), Activity::Connected);

        session.last_activity_date = ago(secs(300) + Duration::from_millis(1));
        assert_eq!(classify(&session, now(), &t), Activity::Disconnected);
    }

    #[test]
    fn test_missing_check_in_is_not_streaming() {
        let t = Thresholds::default();
        let mut session = legacy_playing(secs(10), false);
        session.last_playback_check_in = None;
        assert_eq!(classify(&session, now(), &t), Activity::Connected);

        let mut current = current_playing(true, "DirectPlay", false);
        current.last_playback_check_in = None;
        assert_eq!(classify(&current, now(), &t), Activity::Connected);
    }

    #[test]
    fn test_streaming_with_stale_activity_is_still_streaming() {
        let t = Thresholds::default();
        let mut session = legacy_playing(secs(10), false);
        session.last_activity_date = ago(secs(3600));
        assert_eq!(classify(&session, now(), &t), Activity::Streaming);
    }

    #[test]
    fn test_current_shape_requires_active_and_play_method() {
        let t = Thresholds::default();
        assert_eq!(
            classify(&current_playing(true, "DirectPlay", false), now(), &t),
            Activity::Streaming
        );
        assert_eq!(
            classify(&current_playing(false, "DirectPlay", false), now(), &t),
            Activity::Connected
        );
        assert_eq!(
            classify(&current_playing(true, "", false), now(), &t),
            Activity::Connected
        );
    }

    #[test]
    fn test_current_shape_ignores_now_playing_item() {
        let t = Thresholds::default();
        let mut session = current_playing(false, "", false);
        session.now_playing_item = Some(NowPlayingItem { id: None });
        assert!(!SessionShape::detect(&session).has_playback_target());
        assert_eq!(classify(&session, now(), &t), Activity::Connected);
    }

    #[test]
    fn test_empty_record_is_disconnected() {
        let t = Thresholds::default();
        assert_eq!(
            classify(&SessionRecord::default(), now(), &t),
            Activity::Disconnected
        );
    }

    #[test]
    fn test_future_timestamps_are_fresh() {
        let later = Some(now() + chrono::Duration::seconds(30));
        assert!(is_fresh(later, now(), secs(120)));
        assert!(!is_fresh(None, now(), secs(120)));
    }

    #[test]
    fn test_custom_thresholds() {
        let t = Thresholds {
            playback_check_in: secs(5),
            last_activity: secs(5),
        };
        assert_eq!(
            classify(&legacy_playing(secs(10), false), now(), &t),
            Activity::Connected
        );
    }

    #[test]
    fn test_streaming_implies_connected_across_inputs() {
        let t = Thresholds::default();
        let check_ins = [0u64, 60, 120, 121, 600];
        let activities = [0u64, 299, 300, 301, 3600];

        for &check_in in &check_ins {
            for &activity in &activities {
                for paused in [false, true] {
                    let mut session = legacy_playing(secs(check_in), paused);
                    session.last_activity_date = ago(secs(activity));
                    let tier = classify(&session, now(), &t);
                    if tier.is_streaming() {
                        assert!(tier.is_connected());
                        assert!(!paused);
                        assert!(check_in <= 120);
                    }
                }
            }
        }
    }
}
