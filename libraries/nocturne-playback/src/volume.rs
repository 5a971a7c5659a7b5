//! Volume ramps
//!
//! The engine never sets the output volume directly when playback starts
//! or another app ducks it. Instead it ramps: one step per fade tick until
//! the target (1.0 up, the duck floor down) is reached.

/// Ramp state for the player volume (linear gain, 0.0 to 1.0)
#[derive(Debug, Clone)]
pub struct Fader {
    /// Current linear gain
    level: f32,

    /// Gain added per fade-up tick
    up_step: f32,

    /// Gain removed per fade-down tick
    down_step: f32,

    /// Lowest gain a fade-down reaches
    floor: f32,
}

impl Fader {
    /// Create a fader at full volume
    pub fn new(up_step: f32, down_step: f32, floor: f32) -> Self {
        Self {
            level: 1.0,
            up_step,
            down_step,
            floor: floor.clamp(0.0, 1.0),
        }
    }

    /// Current linear gain
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Jump to `level` without ramping
    pub fn set_level(&mut self, level: f32) {
        self.level = level.clamp(0.0, 1.0);
    }

    /// Advance the fade-up ramp by one tick
    ///
    /// Returns `true` while another tick is needed.
    pub fn step_up(&mut self) -> bool {
        self.level += self.up_step;
        if self.level < 1.0 {
            true
        } else {
            self.level = 1.0;
            false
        }
    }

    /// Advance the fade-down ramp by one tick
    ///
    /// Returns `true` while another tick is needed.
    pub fn step_down(&mut self) -> bool {
        // Already quieter than the floor, e.g. silenced before a resume
        if self.level <= self.floor {
            return false;
        }
        self.level -= self.down_step;
        if self.level > self.floor {
            true
        } else {
            self.level = self.floor;
            false
        }
    }
}

impl Default for Fader {
    fn default() -> Self {
        Self::new(0.01, 0.05, 0.2)
    }
}

/// Convert a level in dB to linear gain
///
/// Formula: gain = 10^(dB/20)
/// - `0 dB`  → 1.0 (unity)
/// - `-8 dB` → 0.398
/// - `-20 dB` → 0.1
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_unity() {
        assert_eq!(Fader::default().level(), 1.0);
    }

    #[test]
    fn fade_up_reaches_unity() {
        let mut fader = Fader::default();
        fader.set_level(0.0);

        let mut ticks = 0;
        while fader.step_up() {
            ticks += 1;
            assert!(ticks < 200, "fade-up never finished");
        }
        assert_eq!(fader.level(), 1.0);
        // 0.01 per tick from silence
        assert!((95..=101).contains(&ticks));
    }

    #[test]
    fn fade_down_below_floor_keeps_level() {
        let mut fader = Fader::default();
        fader.set_level(0.0);
        assert!(!fader.step_down());
        assert_eq!(fader.level(), 0.0);
    }

    #[test]
    fn fade_down_stops_at_floor() {
        let mut fader = Fader::default();
        let mut ticks = 0;
        while fader.step_down() {
            ticks += 1;
        }
        assert_eq!(fader.level(), 0.2);
        assert!(ticks <= 16);
        // Already at the floor
        assert!(!fader.step_down());
        assert_eq!(fader.level(), 0.2);
    }

    #[test]
    fn set_level_clamps() {
        let mut fader = Fader::default();
        fader.set_level(3.0);
        assert_eq!(fader.level(), 1.0);
        fader.set_level(-1.0);
        assert_eq!(fader.level(), 0.0);
    }

    #[test]
    fn gain_conversion() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 0.001);
        assert!((db_to_gain(-8.0) - 0.398).abs() < 0.001);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 0.001);
    }
}
