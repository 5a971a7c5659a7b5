//! Playback events
//!
//! Change notifications for notification/widget bridges and remote
//! clients. The engine queues them while it mutates state; whoever holds
//! the engine drains and forwards them. Delivery is fire-and-forget.

use crate::types::{RepeatMode, ShuffleMode, TrackId};
use serde::{Deserialize, Serialize};

/// Events emitted by the playback engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Queue changed (tracks added/removed/reordered/replaced)
    QueueChanged {
        /// New queue length
        length: usize,
    },

    /// A different track is now current
    MetaChanged {
        /// Track now open, `None` when nothing is
        track: Option<TrackId>,
    },

    /// Playing flag flipped
    PlayStateChanged { playing: bool },

    ShuffleChanged { mode: ShuffleMode },

    RepeatChanged { mode: RepeatMode },

    /// Explicit seek landed
    PositionChanged { position_ms: u64 },

    /// Active lyric line changed
    LyricLineChanged {
        /// Index into the current track's lines, `None` before the first
        index: Option<usize>,
        text: Option<String>,
    },

    /// Opening tracks kept failing; reported once per failure streak
    PlaybackFailed { track: Option<TrackId> },

    /// Nothing was happening for the idle timeout; state saved, player released
    ServiceIdle,
}

impl PlaybackEvent {
    /// Short name used on the wire and in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueueChanged { .. } => "queue_changed",
            Self::MetaChanged { .. } => "meta_changed",
            Self::PlayStateChanged { .. } => "play_state_changed",
            Self::ShuffleChanged { .. } => "shuffle_changed",
            Self::RepeatChanged { .. } => "repeat_changed",
            Self::PositionChanged { .. } => "position_changed",
            Self::LyricLineChanged { .. } => "lyric_line_changed",
            Self::PlaybackFailed { .. } => "playback_failed",
            Self::ServiceIdle => "service_idle",
        }
    }
}
