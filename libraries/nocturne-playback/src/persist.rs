//! Saving and restoring the queue through a [`StateStore`]
//!
//! Stored keys:
//!
//! | key           | value                                           |
//! |---------------|-------------------------------------------------|
//! | `queue`       | track ids, reverse-hex (see [`crate::codec`])   |
//! | `history`     | history positions, reverse-hex (Normal shuffle) |
//! | `cardid`      | storage volume the queue belongs to             |
//! | `curpos`      | current position                                |
//! | `seekpos`     | playback offset in ms                           |
//! | `repeatmode`  | [`RepeatMode::code`]                            |
//! | `shufflemode` | [`ShuffleMode::code`]                           |
//!
//! Restoring never trusts a field partially: a field that does not
//! validate is replaced by its default.

use crate::codec;
use crate::error::StoreError;
use crate::queue::QueueStore;
use crate::source::StateStore;
use crate::types::{RepeatMode, ShuffleMode, TrackId};
use std::time::Duration;

pub const KEY_QUEUE: &str = "queue";
pub const KEY_HISTORY: &str = "history";
pub const KEY_CARD_ID: &str = "cardid";
pub const KEY_POSITION: &str = "curpos";
pub const KEY_SEEK: &str = "seekpos";
pub const KEY_REPEAT: &str = "repeatmode";
pub const KEY_SHUFFLE: &str = "shufflemode";

/// State captured for a save
#[derive(Debug, Clone, Copy)]
pub struct SaveRequest<'a> {
    pub queue: &'a QueueStore,
    pub card_id: i64,
    pub seek: Duration,
    pub repeat: RepeatMode,
    pub shuffle: ShuffleMode,
}

/// Write state to `store` and commit
///
/// A full save also writes the queue contents and history; otherwise only
/// the cheap scalar fields are refreshed.
pub fn save(store: &mut dyn StateStore, request: &SaveRequest<'_>, full: bool) -> Result<(), StoreError> {
    if full {
        store.put_string(KEY_QUEUE, codec::encode_ids(request.queue.items()));
        if request.shuffle == ShuffleMode::Normal {
            store.put_string(KEY_HISTORY, codec::encode_positions(request.queue.history()));
        }
        store.put_i64(KEY_CARD_ID, request.card_id);
    }

    let position = request
        .queue
        .position()
        .and_then(|pos| i64::try_from(pos).ok())
        .unwrap_or(-1);
    store.put_i64(KEY_POSITION, position);
    store.put_i64(
        KEY_SEEK,
        i64::try_from(request.seek.as_millis()).unwrap_or(i64::MAX),
    );
    store.put_i64(KEY_REPEAT, request.repeat.code());
    store.put_i64(KEY_SHUFFLE, request.shuffle.code());

    store.commit()
}

/// Validated state read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredState {
    pub items: Vec<TrackId>,
    pub position: usize,
    pub history: Vec<usize>,
    /// Offset to resume at; still to be checked against the track duration
    pub seek: Duration,
    pub repeat: RepeatMode,
    pub shuffle: ShuffleMode,
}

/// Read state saved against `card_id`
///
/// Returns `None` when nothing usable was saved: no queue, a corrupt queue,
/// or a queue saved against another storage volume.
pub fn load(store: &dyn StateStore, card_id: i64) -> Option<RestoredState> {
    let saved_card = store.get_i64(KEY_CARD_ID);
    if saved_card != Some(card_id) {
        tracing::debug!(?saved_card, card_id, "Saved queue belongs to another volume");
        return None;
    }

    let items = codec::decode_ids(&store.get_string(KEY_QUEUE)?);
    if items.is_empty() {
        return None;
    }

    let position = match store.get_i64(KEY_POSITION).map(usize::try_from) {
        Some(Ok(pos)) if pos < items.len() => pos,
        other => {
            tracing::warn!(?other, len = items.len(), "Saved position out of range, starting at 0");
            0
        }
    };

    let mut repeat = store
        .get_i64(KEY_REPEAT)
        .and_then(RepeatMode::from_code)
        .unwrap_or_default();
    let shuffle = store
        .get_i64(KEY_SHUFFLE)
        .and_then(ShuffleMode::from_code)
        .unwrap_or_default();
    if repeat == RepeatMode::Current && shuffle != ShuffleMode::Off {
        repeat = RepeatMode::Off;
    }

    let history = if shuffle == ShuffleMode::Normal {
        store
            .get_string(KEY_HISTORY)
            .map(|text| codec::decode_positions(&text, items.len()))
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let seek = store
        .get_i64(KEY_SEEK)
        .and_then(|ms| u64::try_from(ms).ok())
        .map(Duration::from_millis)
        .unwrap_or_default();

    Some(RestoredState {
        items,
        position,
        history,
        seek,
        repeat,
        shuffle,
    })
}
