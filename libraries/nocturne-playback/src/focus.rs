//! Audio focus arbitration
//!
//! Translates focus notifications from the host audio stack into transport
//! actions. The arbiter only decides; the engine carries the action out.

use crate::types::FocusState;
use crate::volume::db_to_gain;
use serde::{Deserialize, Serialize};

/// Focus notification delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusChange {
    Gained,
    Lost,
    LostTransient,
    LostTransientCanDuck,
}

/// What the engine must do in response to a focus change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusAction {
    /// Pause as if the user asked
    Pause,

    /// Ramp the volume down to the duck floor
    FadeDown,

    /// Set this gain immediately, keep playing
    Attenuate(f32),

    /// Zero the volume and call `play()`
    Resume,

    /// Ramp the volume back up without resuming
    FadeUp,

    Nothing,
}

/// Focus state machine
#[derive(Debug, Clone)]
pub struct AudioFocusArbiter {
    state: FocusState,
    paused_by_transient_loss: bool,
    transient_gain: f32,
}

impl AudioFocusArbiter {
    /// `transient_attenuation_db` is applied on a non-duckable transient loss
    pub fn new(transient_attenuation_db: f32) -> Self {
        Self {
            state: FocusState::Unfocused,
            paused_by_transient_loss: false,
            transient_gain: db_to_gain(transient_attenuation_db),
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn paused_by_transient_loss(&self) -> bool {
        self.paused_by_transient_loss
    }

    /// Record that focus was requested and granted
    pub fn granted(&mut self) {
        self.state = FocusState::Gained;
    }

    /// Record that focus was given back
    pub fn abandoned(&mut self) {
        self.state = FocusState::Unfocused;
    }

    /// Mark playback as paused by a temporary interruption
    pub fn mark_transient_pause(&mut self) {
        self.paused_by_transient_loss = true;
    }

    /// Clear the transient flag, returning whether it was set
    pub fn take_transient_pause(&mut self) -> bool {
        std::mem::take(&mut self.paused_by_transient_loss)
    }

    /// Apply a focus change; `is_playing` is the transport state before it
    pub fn on_change(&mut self, change: FocusChange, is_playing: bool) -> FocusAction {
        match change {
            FocusChange::Lost => {
                self.state = FocusState::LostPermanent;
                self.paused_by_transient_loss = false;
                if is_playing {
                    FocusAction::Pause
                } else {
                    FocusAction::Nothing
                }
            }
            FocusChange::LostTransientCanDuck => {
                self.state = FocusState::LostTransientDuckable;
                FocusAction::FadeDown
            }
            FocusChange::LostTransient => {
                // Keeps playing quietly; the transient flag stays untouched
                self.state = FocusState::LostTransient;
                if is_playing {
                    FocusAction::Attenuate(self.transient_gain)
                } else {
                    FocusAction::Nothing
                }
            }
            FocusChange::Gained => {
                self.state = FocusState::Gained;
                if is_playing || self.paused_by_transient_loss {
                    self.paused_by_transient_loss = false;
                    FocusAction::Resume
                } else {
                    FocusAction::FadeUp
                }
            }
        }
    }
}

impl Default for AudioFocusArbiter {
    fn default() -> Self {
        Self::new(-8.0)
    }
}
