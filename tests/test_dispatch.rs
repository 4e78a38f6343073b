// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Command dispatch against a recording engine, and the session engine's
// behaviour driven through the same dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use playback_ipc::dispatch::{RESULT_EXECUTION, RESULT_INVALID_PARAMETER, RESULT_UNKNOWN_COMMAND};
use playback_ipc::engine::{
    DbRange, EngineError, EngineResult, PlaybackEngine, PlaybackSettings, SessionEngine,
    TrackInfo, TrackProbe,
};
use playback_ipc::message::kind;
use playback_ipc::{Command, CommandDispatcher, EventSink, Request, Response};

// ========== Recording engine ==========

#[derive(Default)]
struct RecordingEngine {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingEngine {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn record(&self, call: String) -> EngineResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(EngineError::Unsupported {
                url: "x".into(),
                reason: "device lost".into(),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlaybackEngine for RecordingEngine {
    fn play(&self, url: &str) -> EngineResult<()> {
        self.record(format!("play {url}"))
    }
    fn play_button(&self) -> EngineResult<()> {
        self.record("play_button".into())
    }
    fn set_music_url(&self, url: &str) -> EngineResult<()> {
        self.record(format!("set_music_url {url}"))
    }
    fn set_volume(&self, volume: f64) -> EngineResult<()> {
        self.record(format!("set_volume {volume}"))
    }
    fn current_position(&self) -> EngineResult<f64> {
        self.record("current_position".into()).map(|_| 12.5)
    }
    fn duration(&self) -> EngineResult<f64> {
        self.record("duration".into()).map(|_| 180.0)
    }
    fn seek(&self, seconds: f64) -> EngineResult<()> {
        self.record(format!("seek {seconds}"))
    }
    fn update_settings(&self, settings: PlaybackSettings) -> EngineResult<()> {
        self.record(format!("update_settings {}", settings.output_mode))
    }
    fn adjust_position(&self, delta_seconds: i32) -> EngineResult<f64> {
        self.record(format!("adjust_position {delta_seconds}"))
            .map(|_| 12.5 + f64::from(delta_seconds))
    }
    fn music_end(&self) -> EngineResult<()> {
        self.record("music_end".into())
    }
    fn dispose(&self) -> EngineResult<()> {
        self.record("dispose".into())
    }
    fn toggle_equalizer(&self) -> EngineResult<()> {
        self.record("toggle_equalizer".into())
    }
    fn apply_equalizer(&self) -> EngineResult<()> {
        self.record("apply_equalizer".into())
    }
    fn clear_equalizer(&self) -> EngineResult<()> {
        self.record("clear_equalizer".into())
    }
    fn set_equalizer_gain(&self, band: i32, gain: f32) -> EngineResult<()> {
        self.record(format!("set_equalizer_gain {band} {gain}"))
    }
    fn update_equalizer(&self, gains: &[(String, f64)]) -> EngineResult<()> {
        let mut gains = gains.to_vec();
        gains.sort_by(|a, b| a.0.cmp(&b.0));
        self.record(format!("update_equalizer {gains:?}"))
    }
    fn fade_out(&self) -> EngineResult<()> {
        self.record("fade_out".into())
    }
}

fn recording() -> (Arc<RecordingEngine>, CommandDispatcher) {
    let engine = Arc::new(RecordingEngine::default());
    let dispatcher = CommandDispatcher::new(engine.clone());
    (engine, dispatcher)
}

fn req(command: &str, data: Option<&str>) -> Request {
    match data {
        Some(d) => Request::new(command, d),
        None => Request::bare(command),
    }
}

// ========== Response table ==========

#[test]
fn every_command_maps_to_its_fixed_response() {
    let table: &[(&str, Option<&str>, i32, &str, &str, &str)] = &[
        ("Play", Some("/music/a.flac"), 1, "Started playing", "Playback_Started", "play /music/a.flac"),
        ("PlayButton", None, 1, "Play button pressed.", "Playback_Started", "play_button"),
        ("SetMusicUrl", Some("/music/b.wav"), 1, "Music URL set", "MusicUrl_Set", "set_music_url /music/b.wav"),
        ("Volume", Some("75"), 1, "Volume set.", "Volume_Set", "set_volume 75"),
        ("GetProgress", None, 20, "Current progress retrieved.", "12.5", "current_position"),
        ("GetDuration", None, 21, "Track duration retrieved.", "180", "duration"),
        ("ChangePosition", Some("42.5"), 1, "Playback position changed.", "Position_Changed", "seek 42.5"),
        ("ChangeVolume", Some("0.3"), 1, "Volume changed.", "Volume_Changed", "set_volume 0.3"),
        ("UpdateSettings", Some(r#"{"OutputMode":"ASIO"}"#), 1, "Settings updated.", "Settings_Updated", "update_settings ASIO"),
        ("AdjustPlaybackPosition", Some("5"), 22, "PlaybackPosition Adjusted.", "17.5", "adjust_position 5"),
        ("MusicEnd", None, 1, "MusicEnded", "MusicEnded", "music_end"),
        ("Dispose", None, 1000, "Dispose", "Dispose", "dispose"),
        ("ToggleEqualizer", None, 1, "Toggled Eq", "Toggled_Eq", "toggle_equalizer"),
        ("SetEqualizer", None, 1, "Eq Setted", "Eq_Setted", "apply_equalizer"),
        ("ClearEqualizer", None, 1, "Eq Cleared", "Eq_Cleared", "clear_equalizer"),
        ("SetEqualizerGain", Some(r#"{"bandIndex":3,"gain":-2.5}"#), 1, "EqGain Setted", "EqGain_Setted", "set_equalizer_gain 3 -2.5"),
        ("UpdateEq", Some(r#"{"32Hz":1.5,"1kHz":-3}"#), 1, "Eq Updated", "Eq_Updated", r#"update_equalizer [("1kHz", -3.0), ("32Hz", 1.5)]"#),
        ("FadeOut", None, 1, "Fade Out", "Fade_Out", "fade_out"),
    ];
    assert_eq!(table.len(), Command::ALL.len());

    for (command, data, kind, message, result, call) in table {
        let (engine, dispatcher) = recording();
        let response = dispatcher.dispatch(&req(command, *data));
        assert_eq!(
            response,
            Response::new(*kind, *message, *result),
            "command {command}"
        );
        assert_eq!(engine.calls(), vec![call.to_string()], "command {command}");
    }
}

#[test]
fn numeric_parameters_tolerate_surrounding_whitespace() {
    let (engine, dispatcher) = recording();
    assert!(!dispatcher.dispatch(&req("Volume", Some(" 40\n"))).is_failure());
    assert!(!dispatcher.dispatch(&req("ChangePosition", Some(" 1.5 "))).is_failure());
    assert_eq!(engine.calls(), vec!["set_volume 40", "seek 1.5"]);
}

#[test]
fn update_eq_skips_non_numeric_entries() {
    let (engine, dispatcher) = recording();
    let response = dispatcher.dispatch(&req("UpdateEq", Some(r#"{"64Hz":2,"2kHz":"loud"}"#)));
    assert_eq!(response.result, "Eq_Updated");
    assert_eq!(engine.calls(), vec![r#"update_equalizer [("64Hz", 2.0)]"#]);
}

// ========== Failures ==========

#[test]
fn unknown_command_is_rejected_without_engine_call() {
    let (engine, dispatcher) = recording();
    for name in ["Bogus", "play", "PLAY", "Play ", ""] {
        let response = dispatcher.dispatch(&req(name, None));
        assert_eq!(
            response,
            Response::new(kind::FAILURE, "Unknown command", RESULT_UNKNOWN_COMMAND)
        );
    }
    assert!(engine.calls().is_empty());
}

#[test]
fn invalid_parameters_produce_parameter_errors() {
    let cases = [
        ("Volume", None),
        ("Volume", Some("loud")),
        ("Volume", Some("75.5")),
        ("ChangePosition", Some("")),
        ("ChangePosition", Some("NaN")),
        ("ChangePosition", Some("inf")),
        ("ChangeVolume", Some("half")),
        ("ChangeVolume", Some("-inf")),
        ("ChangeVolume", Some("NaN")),
        ("AdjustPlaybackPosition", Some("1.5")),
        ("UpdateSettings", Some("{not json")),
        ("SetEqualizerGain", Some(r#"{"band":1}"#)),
        ("UpdateEq", Some("[1,2]")),
    ];
    for (command, data) in cases {
        let (engine, dispatcher) = recording();
        let response = dispatcher.dispatch(&req(command, data));
        assert_eq!(response.kind, kind::FAILURE, "{command} {data:?}");
        assert_eq!(response.result, RESULT_INVALID_PARAMETER, "{command} {data:?}");
        assert!(
            response.message.starts_with(&format!("Invalid parameter for {command}: ")),
            "{}",
            response.message
        );
        assert!(engine.calls().is_empty(), "{command} must not reach the engine");
    }
}

#[test]
fn engine_errors_are_reported_as_execution_failures() {
    let engine = Arc::new(RecordingEngine::failing());
    let dispatcher = CommandDispatcher::new(engine.clone());
    let response = dispatcher.dispatch(&req("Play", Some("/x.mp3")));
    assert_eq!(response.kind, kind::FAILURE);
    assert_eq!(response.result, RESULT_EXECUTION);
    assert!(response.message.starts_with("Error during command execution: "));
    assert!(response.message.contains("device lost"));
}

// ========== Session engine ==========

#[derive(Debug, Clone, PartialEq)]
enum Event {
    PlayState(bool),
    Ended(bool),
    Volume(f32),
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn play_state_changed(&self, playing: bool) {
        self.events.lock().unwrap().push(Event::PlayState(playing));
    }
    fn playback_ended(&self, playing: bool) {
        self.events.lock().unwrap().push(Event::Ended(playing));
    }
    fn volume_corrected(&self, volume: f32) {
        self.events.lock().unwrap().push(Event::Volume(volume));
    }
}

/// Serves made-up tracks; unknown paths fail to open.
struct FakeProbe(HashMap<&'static str, f64>);

impl TrackProbe for FakeProbe {
    fn probe(&self, url: &str) -> EngineResult<TrackInfo> {
        match self.0.get(url) {
            Some(&duration) => Ok(TrackInfo { duration }),
            None => Err(EngineError::Open {
                url: url.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such track"),
            }),
        }
    }
}

fn session() -> (Arc<RecordingSink>, Arc<SessionEngine>, CommandDispatcher) {
    let sink = Arc::new(RecordingSink::default());
    let probe = FakeProbe(HashMap::from([("a.wav", 120.0), ("b.wav", 90.0), ("c.wav", 60.0), ("short.wav", 0.2)]));
    let engine = Arc::new(SessionEngine::with_probe(sink.clone(), Box::new(probe)).expect("engine"));
    let dispatcher = CommandDispatcher::new(engine.clone());
    (sink, engine, dispatcher)
}

#[test]
fn session_play_reports_state() {
    let (sink, engine, dispatcher) = session();
    assert_eq!(dispatcher.dispatch(&req("Play", Some("a.wav"))).result, "Playback_Started");

    let snap = engine.snapshot();
    assert!(snap.playing);
    assert_eq!(snap.stream_url.as_deref(), Some("a.wav"));
    assert_eq!(snap.duration, 120.0);
    assert_eq!(sink.events(), vec![Event::PlayState(true)]);

    let duration = dispatcher.dispatch(&req("GetDuration", None));
    assert_eq!((duration.kind, duration.result.as_str()), (kind::DURATION, "120"));
}

#[test]
fn session_play_of_missing_track_fails_and_keeps_state() {
    let (sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    let response = dispatcher.dispatch(&req("Play", Some("missing.wav")));
    assert_eq!(response.result, RESULT_EXECUTION);
    assert!(response.message.contains("missing.wav"));
    assert_eq!(engine.snapshot().stream_url.as_deref(), Some("a.wav"));
    assert_eq!(sink.events(), vec![Event::PlayState(true)]);
}

#[test]
fn session_play_button_pauses_and_resumes() {
    let (sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    dispatcher.dispatch(&req("PlayButton", None));
    assert!(!engine.snapshot().playing);
    dispatcher.dispatch(&req("PlayButton", None));
    assert!(engine.snapshot().playing);
    assert_eq!(
        sink.events(),
        vec![Event::PlayState(true), Event::PlayState(false), Event::PlayState(true)]
    );
}

#[test]
fn session_play_button_without_track_reports_stopped() {
    let (sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("PlayButton", None));
    assert!(!engine.snapshot().playing);
    assert_eq!(sink.events(), vec![Event::PlayState(false)]);
}

#[test]
fn session_play_button_opens_remembered_url() {
    let (sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("SetMusicUrl", Some("b.wav")));
    assert_eq!(engine.snapshot().stream_url, None);
    dispatcher.dispatch(&req("PlayButton", None));
    let snap = engine.snapshot();
    assert!(snap.playing);
    assert_eq!(snap.stream_url.as_deref(), Some("b.wav"));
    assert_eq!(sink.events(), vec![Event::PlayState(true)]);
}

#[test]
fn session_seek_while_paused() {
    let (_sink, _engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    dispatcher.dispatch(&req("PlayButton", None));
    dispatcher.dispatch(&req("ChangePosition", Some("30")));
    assert_eq!(dispatcher.dispatch(&req("GetProgress", None)).result, "30");

    dispatcher.dispatch(&req("ChangePosition", Some("500")));
    assert_eq!(dispatcher.dispatch(&req("GetProgress", None)).result, "120");

    // Paused: adjusting reports 0 and leaves the position alone.
    let adjusted = dispatcher.dispatch(&req("AdjustPlaybackPosition", Some("-10")));
    assert_eq!((adjusted.kind, adjusted.result.as_str()), (kind::POSITION_ADJUSTED, "0"));
    assert_eq!(dispatcher.dispatch(&req("GetProgress", None)).result, "120");
}

#[test]
fn session_adjust_while_playing_moves_position() {
    let (_sink, _engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    let adjusted = dispatcher.dispatch(&req("AdjustPlaybackPosition", Some("60")));
    let position: f64 = adjusted.result.parse().expect("seconds");
    assert!((60.0..61.0).contains(&position), "{position}");
}

#[test]
fn session_volume_drives_channel_gain() {
    let (_sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    dispatcher.dispatch(&req("ChangeVolume", Some("0.75")));
    let snap = engine.snapshot();
    assert_eq!(snap.volume, 0.75);
    assert_eq!(snap.gain, 0.75);

    // The integer form is passed through as is; the gain saturates.
    dispatcher.dispatch(&req("Volume", Some("75")));
    let snap = engine.snapshot();
    assert_eq!(snap.volume, 75.0);
    assert_eq!(snap.gain, 1.0);
}

#[test]
fn session_non_finite_position_leaves_stream_alone() {
    let (_sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    dispatcher.dispatch(&req("ChangePosition", Some("30")));
    for data in ["NaN", "inf", "-inf"] {
        let response = dispatcher.dispatch(&req("ChangePosition", Some(data)));
        assert_eq!(response.result, RESULT_INVALID_PARAMETER, "{data}");
    }
    let response = dispatcher.dispatch(&req("ChangeVolume", Some("NaN")));
    assert_eq!(response.result, RESULT_INVALID_PARAMETER);

    let snap = engine.snapshot();
    assert!((30.0..31.0).contains(&snap.position), "{}", snap.position);
    assert!(snap.volume.is_finite());
    let progress: f64 = dispatcher
        .dispatch(&req("GetProgress", None))
        .result
        .parse()
        .expect("seconds");
    assert!(progress.is_finite() && progress < 120.0, "{progress}");
}

#[test]
fn session_exclusive_output_resets_volume_once() {
    let (sink, engine, dispatcher) = session();
    let settings = r#"{"OutputMode":"WasapiExclusiveEvent","Volume":0.9,"IsSettingChanged":true}"#;
    dispatcher.dispatch(&req("UpdateSettings", Some(settings)));
    assert!(engine.snapshot().volume_safety_armed);

    dispatcher.dispatch(&req("Play", Some("a.wav")));
    let range = DbRange::default();
    let safe = range.db_to_linear(range.mid_db()) as f32;
    assert_eq!(sink.events(), vec![Event::Volume(safe), Event::PlayState(true)]);
    let snap = engine.snapshot();
    assert_eq!(snap.volume, safe);
    assert!(!snap.volume_safety_armed);

    dispatcher.dispatch(&req("Play", Some("b.wav")));
    assert_eq!(sink.events().len(), 3, "no second correction");
}

#[test]
fn session_equalizer_follows_preset() {
    let (_sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("UpdateSettings", Some(r#"{"IsEqualizerEnabled":true}"#)));
    dispatcher.dispatch(&req("UpdateEq", Some(r#"{"1kHz":-3,"16kHz":2.5}"#)));
    dispatcher.dispatch(&req("Play", Some("a.wav")));

    let bands = engine.snapshot().equalizer.expect("attached");
    assert_eq!(bands[5], -3.0);
    assert_eq!(bands[9], 2.5);
    assert_eq!(bands[0], 0.0);

    dispatcher.dispatch(&req("SetEqualizerGain", Some(r#"{"bandIndex":0,"gain":4}"#)));
    assert_eq!(engine.snapshot().equalizer.expect("attached")[0], 4.0);

    dispatcher.dispatch(&req("ClearEqualizer", None));
    assert_eq!(engine.snapshot().equalizer, None);

    dispatcher.dispatch(&req("ToggleEqualizer", None));
    assert_eq!(engine.snapshot().equalizer, Some([0.0; 10]));
    dispatcher.dispatch(&req("SetEqualizer", None));
    assert_eq!(engine.snapshot().equalizer.expect("attached")[5], -3.0);
}

#[test]
fn session_equalizer_stays_off_when_disabled() {
    let (_sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    dispatcher.dispatch(&req("ToggleEqualizer", None));
    assert_eq!(engine.snapshot().equalizer, None);
    let response = dispatcher.dispatch(&req("SetEqualizerGain", Some(r#"{"bandIndex":1,"gain":3}"#)));
    assert_eq!(response.result, "EqGain_Setted");
}

#[test]
fn session_reports_end_of_track_once() {
    let (sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("short.wav")));

    let deadline = Instant::now() + Duration::from_secs(2);
    while !sink.events().contains(&Event::Ended(false)) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(300));

    let ended = sink.events().iter().filter(|e| **e == Event::Ended(false)).count();
    assert_eq!(ended, 1);
    assert!(!engine.snapshot().playing);
}

#[test]
fn session_music_end_rewinds() {
    let (_sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    dispatcher.dispatch(&req("ChangePosition", Some("50")));
    dispatcher.dispatch(&req("MusicEnd", None));
    let snap = engine.snapshot();
    assert!(!snap.playing);
    assert_eq!(snap.position, 0.0);
}

#[test]
fn session_dispose_then_play_again() {
    let (_sink, engine, dispatcher) = session();
    dispatcher.dispatch(&req("Play", Some("a.wav")));
    let disposed = dispatcher.dispatch(&req("Dispose", None));
    assert_eq!(disposed.kind, kind::DISPOSE);
    let snap = engine.snapshot();
    assert_eq!(snap.stream_url, None);
    assert!(!snap.playing);
    assert_eq!(dispatcher.dispatch(&req("GetProgress", None)).result, "0");

    dispatcher.dispatch(&req("Play", Some("b.wav")));
    assert!(engine.snapshot().playing);
}

/// Session with fades on the default output, so a track switch while
/// playing goes through a delayed handover.
fn fading_session() -> (Arc<SessionEngine>, CommandDispatcher) {
    let (_sink, engine, dispatcher) = session();
    let settings = r#"{"OutputMode":"DirectSound","IsFadeEnabled":true,"Volume":0.5}"#;
    assert!(!dispatcher.dispatch(&req("UpdateSettings", Some(settings))).is_failure());
    assert!(!dispatcher.dispatch(&req("Play", Some("a.wav"))).is_failure());
    // a.wav is still playing, so this one is handed over after a fade.
    assert!(!dispatcher.dispatch(&req("Play", Some("b.wav"))).is_failure());
    assert_eq!(engine.snapshot().stream_url.as_deref(), Some("a.wav"));
    (engine, dispatcher)
}

/// Longer than the handover fade plus its slack.
const HANDOVER_WAIT: Duration = Duration::from_millis(900);

#[test]
fn handover_completes_when_left_alone() {
    let (engine, _dispatcher) = fading_session();
    thread::sleep(HANDOVER_WAIT);
    let snap = engine.snapshot();
    assert_eq!(snap.stream_url.as_deref(), Some("b.wav"));
    assert!(snap.playing);
}

#[test]
fn dispose_cancels_pending_handover() {
    let (engine, dispatcher) = fading_session();
    dispatcher.dispatch(&req("Dispose", None));
    thread::sleep(HANDOVER_WAIT);
    let snap = engine.snapshot();
    assert_eq!(snap.stream_url, None);
    assert!(!snap.playing);
}

#[test]
fn music_end_cancels_pending_handover() {
    let (engine, dispatcher) = fading_session();
    dispatcher.dispatch(&req("MusicEnd", None));
    thread::sleep(HANDOVER_WAIT);
    let snap = engine.snapshot();
    assert_eq!(snap.stream_url.as_deref(), Some("a.wav"));
    assert!(!snap.playing);
    assert_eq!(snap.position, 0.0);
}

#[test]
fn pause_cancels_pending_handover() {
    let (engine, dispatcher) = fading_session();
    dispatcher.dispatch(&req("PlayButton", None));
    thread::sleep(HANDOVER_WAIT);
    let snap = engine.snapshot();
    assert_eq!(snap.stream_url.as_deref(), Some("a.wav"));
    assert!(!snap.playing);
}

#[test]
fn latest_handover_wins() {
    let (engine, dispatcher) = fading_session();
    thread::sleep(Duration::from_millis(100));
    // Still on a.wav and playing, so this schedules a second handover.
    dispatcher.dispatch(&req("Play", Some("c.wav")));
    thread::sleep(HANDOVER_WAIT);
    let snap = engine.snapshot();
    assert_eq!(snap.stream_url.as_deref(), Some("c.wav"));
    assert!(snap.playing);
}
