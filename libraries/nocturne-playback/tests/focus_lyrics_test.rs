//! Audio focus and lyrics tests for PlaybackEngine
//!
//! Volume ramps and lyric lines are timer driven, so every test moves the
//! manual clock through `Harness::advance`.

mod common;

use common::*;
use nocturne_playback::{
    FocusChange, FocusState, LyricLine, PlaybackEvent, PlaybackState, TimerKind,
};

fn assert_volume(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 0.001,
        "volume {actual} != {expected}"
    );
}

fn lyric_events(events: &[PlaybackEvent]) -> Vec<(Option<usize>, Option<String>)> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::LyricLineChanged { index, text } => Some((*index, text.clone())),
            _ => None,
        })
        .collect()
}

fn playing_harness() -> Harness {
    let mut h = Harness::new(&[10, 20]);
    h.open(&[10, 20], Some(0));
    h.engine.play();
    h.advance(ms(10));
    h
}

// ===== Fades =====

#[test]
fn test_pause_play_mid_fade_finishes_at_full_volume() {
    let mut h = playing_harness();

    h.engine.on_focus_change(FocusChange::LostTransientCanDuck);
    h.advance(ms(35));
    let ramped = h.engine.volume();
    assert!(ramped < 1.0 && ramped > 0.2, "mid ramp, got {ramped}");

    h.engine.pause();
    h.engine.play();
    assert!(!h.engine.is_timer_pending(TimerKind::FadeDown));

    h.advance(secs(2));
    assert_eq!(h.engine.volume(), 1.0);
    assert_eq!(h.player.volume(), 1.0);
}

#[test]
fn test_duck_fades_to_floor() {
    let mut h = playing_harness();

    h.engine.on_focus_change(FocusChange::LostTransientCanDuck);
    assert_eq!(h.engine.focus_state(), FocusState::LostTransientDuckable);
    h.advance(secs(1));

    assert_volume(h.engine.volume(), 0.2);
    assert_volume(h.player.volume(), 0.2);
    assert!(h.engine.is_playing());
    assert!(!h.engine.is_timer_pending(TimerKind::FadeDown));
}

#[test]
fn test_regain_after_duck_ramps_back_up() {
    let mut h = playing_harness();
    h.engine.on_focus_change(FocusChange::LostTransientCanDuck);
    h.advance(secs(1));

    h.engine.on_focus_change(FocusChange::Gained);
    assert_eq!(h.engine.volume(), 0.0);
    h.advance(ms(500));
    assert!(h.engine.volume() < 1.0);
    h.advance(ms(600));
    assert_eq!(h.engine.volume(), 1.0);
    assert!(h.engine.is_playing());
}

#[test]
fn test_duck_right_after_resume_stays_silent() {
    let mut h = playing_harness();
    h.engine.on_focus_change(FocusChange::Gained);
    assert_eq!(h.engine.volume(), 0.0);

    h.engine.on_focus_change(FocusChange::LostTransientCanDuck);
    h.advance(ms(100));

    assert_eq!(h.engine.volume(), 0.0);
    assert_eq!(h.player.volume(), 0.0);
    assert!(!h.engine.is_timer_pending(TimerKind::FadeDown));
}

#[test]
fn test_fade_up_takes_a_hundred_ticks() {
    let mut h = playing_harness();
    h.engine.on_focus_change(FocusChange::LostTransient);
    h.engine.on_focus_change(FocusChange::Gained);
    assert_eq!(h.engine.volume(), 0.0);

    h.advance(ms(495));
    assert_volume(h.engine.volume(), 0.5);
}

// ===== Focus loss =====

#[test]
fn test_transient_loss_attenuates_without_pausing() {
    let mut h = playing_harness();

    h.engine.on_focus_change(FocusChange::LostTransient);
    assert!(h.engine.is_playing());
    assert_volume(h.engine.volume(), 0.398);
    assert_volume(h.player.volume(), 0.398);
    assert_eq!(h.engine.focus_state(), FocusState::LostTransient);

    h.engine.on_focus_change(FocusChange::Gained);
    h.advance(secs(2));
    assert_eq!(h.engine.volume(), 1.0);
    assert_eq!(h.engine.focus_state(), FocusState::Gained);
}

#[test]
fn test_permanent_loss_pauses() {
    let mut h = playing_harness();

    h.engine.on_focus_change(FocusChange::Lost);
    assert!(!h.engine.is_playing());
    assert!(!h.player.is_playing());
    assert_eq!(h.engine.playback_state(), PlaybackState::PausedUser);
    assert_eq!(h.engine.focus_state(), FocusState::LostPermanent);

    // Regaining focus does not restart a permanent-loss pause
    h.engine.on_focus_change(FocusChange::Gained);
    assert!(!h.engine.is_playing());
}

#[test]
fn test_transient_loss_while_paused_does_nothing() {
    let mut h = Harness::new(&[10]);
    h.open(&[10], Some(0));

    h.engine.on_focus_change(FocusChange::LostTransient);
    assert_eq!(h.engine.volume(), 1.0);
    assert!(!h.engine.is_playing());
}

#[test]
fn test_play_requests_focus() {
    let mut h = Harness::new(&[10]);
    h.open(&[10], Some(0));
    assert_eq!(h.engine.focus_state(), FocusState::Unfocused);

    h.engine.play();
    assert_eq!(h.engine.focus_state(), FocusState::Gained);
    assert_eq!(
        h.focus.requests.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[test]
fn test_idle_shutdown_abandons_focus() {
    let mut h = playing_harness();
    h.engine.pause();
    h.advance(secs(61));

    assert_eq!(h.engine.focus_state(), FocusState::Unfocused);
    assert_eq!(
        h.focus.abandons.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

// ===== Lyrics =====

fn lyrics_harness() -> Harness {
    let mut h = Harness::new(&[10, 20]);
    h.lyrics.insert(
        10,
        vec![
            LyricLine::new(secs(0), "one"),
            LyricLine::new(secs(5), "two"),
            LyricLine::new(secs(10), "three"),
        ],
    );
    h.open(&[10, 20], Some(0));
    h.events();
    h
}

#[test]
fn test_lyrics_follow_playback() {
    let mut h = lyrics_harness();

    h.engine.play();
    assert_eq!(
        lyric_events(&h.events()),
        vec![(Some(0), Some("one".to_string()))]
    );

    h.advance(secs(5));
    assert_eq!(
        lyric_events(&h.events()),
        vec![(Some(1), Some("two".to_string()))]
    );

    h.advance(secs(5));
    assert_eq!(
        lyric_events(&h.events()),
        vec![(Some(2), Some("three".to_string()))]
    );
    assert!(!h.engine.is_timer_pending(TimerKind::LyricsAdvance));

    h.advance(secs(30));
    assert!(lyric_events(&h.events()).is_empty());
}

#[test]
fn test_seek_resyncs_lyrics() {
    let mut h = lyrics_harness();
    h.engine.play();
    h.advance(secs(11));
    h.events();

    h.engine.seek(secs(7));
    let events = h.events();
    assert_eq!(
        lyric_events(&events),
        vec![(Some(1), Some("two".to_string()))]
    );
    assert!(events.contains(&PlaybackEvent::PositionChanged { position_ms: 7000 }));

    h.advance(secs(3));
    assert_eq!(
        lyric_events(&h.events()),
        vec![(Some(2), Some("three".to_string()))]
    );
}

#[test]
fn test_pause_suspends_lyrics() {
    let mut h = lyrics_harness();
    h.engine.play();
    h.advance(secs(2));
    h.engine.pause();
    h.events();

    assert!(h.engine.lyrics().is_suspended());
    assert!(!h.engine.is_timer_pending(TimerKind::LyricsAdvance));
    h.advance(secs(20));
    assert!(lyric_events(&h.events()).is_empty());

    // Resuming picks up from the real position
    h.engine.play();
    assert!(!h.engine.lyrics().is_suspended());
    assert!(h.engine.is_timer_pending(TimerKind::LyricsAdvance));
    h.advance(secs(3));
    assert_eq!(
        lyric_events(&h.events()),
        vec![(Some(1), Some("two".to_string()))]
    );
}

#[test]
fn test_track_change_loads_new_lyrics() {
    let mut h = lyrics_harness();
    h.engine.play();
    assert_eq!(h.engine.lyrics().lines().len(), 3);

    h.engine.next(false);
    assert_eq!(h.current(), Some(20));
    assert!(h.engine.lyrics().lines().is_empty());
    assert_eq!(h.engine.lyrics().active(), None);
}
