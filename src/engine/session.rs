// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Reference playback engine. It keeps the full session state a real audio
// back-end would (current stream, position clock, device volume rules,
// equalizer, fades, end-of-track events) without decoding anything, so the
// host can run and be tested end to end.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::equalizer::Equalizer;
use super::fade::{Fader, FADE_IN_MS, FADE_OUT_MS};
use super::settings::{OutputMode, PlaybackSettings};
use super::volume::DbRange;
use super::{EngineError, EngineResult, PlaybackEngine};
use crate::notify::EventSink;
use crate::shutdown::ShutdownToken;

/// How often the end-of-track watcher looks at the clock.
const END_POLL: Duration = Duration::from_millis(100);

/// Below this many seconds left, a track switch skips the fade-out.
const HANDOVER_MIN_REMAINING: f64 = 3.0;

/// Extra wait after a handover fade before the switch.
const HANDOVER_SLACK_MS: u64 = 50;

// ---------------------------------------------------------------------------
// Track probing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInfo {
    /// Seconds; 0 when the length is unknown.
    pub duration: f64,
}

/// Opens a track far enough to learn its length.
pub trait TrackProbe: Send + Sync {
    fn probe(&self, url: &str) -> EngineResult<TrackInfo>;
}

/// Probes local files. The file must be readable; RIFF/WAVE files get their
/// exact length, every other format reports an unknown length.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProbe;

impl TrackProbe for FileProbe {
    fn probe(&self, url: &str) -> EngineResult<TrackInfo> {
        let open_err = |source| EngineError::Open {
            url: url.to_string(),
            source,
        };
        let mut file = File::open(url).map_err(open_err)?;
        let duration = wav_duration(&mut file).map_err(open_err)?.unwrap_or(0.0);
        Ok(TrackInfo { duration })
    }
}

/// Length in seconds of a RIFF/WAVE stream, `None` if it is not one.
fn wav_duration<R: Read + Seek>(r: &mut R) -> io::Result<Option<f64>> {
    let mut header = [0u8; 12];
    if r.read_exact(&mut header).is_err() || &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Ok(None);
    }

    let mut byte_rate: Option<u32> = None;
    loop {
        let mut chunk = [0u8; 8];
        if r.read_exact(&mut chunk).is_err() {
            return Ok(None);
        }
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
        // Chunks are padded to even sizes.
        let padded = i64::from(size) + i64::from(size & 1);
        match &chunk[0..4] {
            b"fmt " if size >= 16 => {
                let mut fmt = [0u8; 16];
                r.read_exact(&mut fmt)?;
                byte_rate = Some(u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]));
                r.seek(SeekFrom::Current(padded - 16))?;
            }
            b"data" => {
                return Ok(byte_rate
                    .filter(|&b| b > 0)
                    .map(|b| f64::from(size) / f64::from(b)));
            }
            _ => {
                r.seek(SeekFrom::Current(padded))?;
            }
        }
    }
}

fn is_dsd_file(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.ends_with(".dsf") || lower.ends_with(".dff")
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct PlayClock {
    base: f64,
    since: Option<Instant>,
}

impl PlayClock {
    fn stopped() -> Self {
        Self {
            base: 0.0,
            since: None,
        }
    }

    fn read(&self) -> f64 {
        self.base + self.since.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    fn run(&mut self) {
        if self.since.is_none() {
            self.since = Some(Instant::now());
        }
    }

    fn halt(&mut self) {
        self.base = self.read();
        self.since = None;
    }

    fn set(&mut self, position: f64) {
        self.base = position;
        if self.since.is_some() {
            self.since = Some(Instant::now());
        }
    }
}

#[derive(Debug)]
struct Stream {
    url: String,
    duration: f64,
    clock: PlayClock,
    end_reported: bool,
}

impl Stream {
    fn position(&self) -> f64 {
        let p = self.clock.read();
        if self.duration > 0.0 {
            p.min(self.duration)
        } else {
            p
        }
    }

    fn at_end(&self) -> bool {
        self.duration > 0.0 && self.clock.read() >= self.duration
    }

    fn clamp(&self, position: f64) -> f64 {
        if self.duration > 0.0 {
            position.clamp(0.0, self.duration)
        } else {
            position.max(0.0)
        }
    }

    fn seek(&mut self, position: f64) {
        let target = self.clamp(position);
        self.clock.set(target);
        if !self.at_end() {
            self.end_reported = false;
        }
    }
}

struct Session {
    settings: PlaybackSettings,
    volume: f32,
    music_url: Option<String>,
    stream: Option<Stream>,
    playing: bool,
    volume_safety: bool,
    range: DbRange,
    // Bumped whenever the stream is replaced, stopped or handed over;
    // a pending handover only switches if it still matches.
    generation: u64,
}

impl Session {
    /// Invalidate any pending handover and return the new generation.
    fn bump_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    fn output(&self) -> OutputMode {
        self.settings.output()
    }

    /// Outputs where the channel gain is the volume control.
    fn uses_channel_gain(&self) -> bool {
        let mode = self.output();
        !mode.is_wasapi() && mode != OutputMode::Asio
    }

    fn position(&self) -> f64 {
        self.stream.as_ref().map_or(0.0, Stream::position)
    }
}

/// Observable engine state, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub playing: bool,
    pub music_url: Option<String>,
    pub stream_url: Option<String>,
    pub volume: f32,
    pub gain: f32,
    pub position: f64,
    pub duration: f64,
    pub equalizer: Option<[f32; super::BAND_COUNT]>,
    pub equalizer_preset: [f64; super::BAND_COUNT],
    pub volume_safety_armed: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    // Lock order: session, then equalizer.
    session: Mutex<Session>,
    equalizer: Mutex<Equalizer>,
    fader: Fader,
    probe: Box<dyn TrackProbe>,
    events: Arc<dyn EventSink>,
}

impl Shared {
    fn close_stream(&self, s: &mut Session) {
        self.fader.stop();
        if let Some(stream) = s.stream.take() {
            tracing::debug!(url = %stream.url, "stream closed");
        }
        s.playing = false;
        s.bump_generation();
        lock(&self.equalizer).detach();
    }

    fn open_stream(&self, s: &mut Session, url: &str, info: TrackInfo) {
        self.close_stream(s);
        s.stream = Some(Stream {
            url: url.to_string(),
            duration: info.duration,
            clock: PlayClock::stopped(),
            end_reported: false,
        });
        s.bump_generation();
        self.attach_equalizer(s);
        if s.uses_channel_gain() {
            self.fader.set_gain(s.volume);
        }
        tracing::debug!(url, duration = info.duration, "stream opened");
    }

    fn halt(&self, s: &mut Session) {
        if let Some(stream) = s.stream.as_mut() {
            stream.clock.halt();
        }
    }

    /// Start the current stream from where its clock stands.
    fn start(&self, s: &mut Session) -> EngineResult<()> {
        if s.stream.is_none() {
            return Ok(());
        }
        let mode = s.output();
        if mode.is_exclusive() && s.volume_safety {
            let safe = s.range.db_to_linear(s.range.mid_db()) as f32;
            tracing::info!(volume = safe, "exclusive output: volume reset to device mid-point");
            s.volume = safe;
            s.volume_safety = false;
            self.events.volume_corrected(safe);
        } else if mode.is_exclusive() {
            tracing::debug!(db = s.range.linear_to_db(f64::from(s.volume)), "device volume");
        }
        if s.uses_channel_gain() {
            if s.settings.fade_enabled {
                self.fader.fade_in(s.volume, FADE_IN_MS)?;
            } else {
                self.fader.set_gain(s.volume);
            }
        }
        if let Some(stream) = s.stream.as_mut() {
            stream.clock.run();
        }
        if s.settings.equalizer_enabled {
            lock(&self.equalizer).apply_preset();
        }
        s.playing = true;
        self.events.play_state_changed(true);
        Ok(())
    }

    fn switch_to(&self, s: &mut Session, url: &str, info: TrackInfo) -> EngineResult<()> {
        self.halt(s);
        self.open_stream(s, url, info);
        self.start(s)
    }

    fn attach_equalizer(&self, s: &Session) {
        if !s.settings.equalizer_enabled {
            return;
        }
        let mode = s.output();
        let native_dsd = s.settings.dop_enabled
            && (mode.is_exclusive() || mode == OutputMode::Asio)
            && s.music_url.as_deref().is_some_and(is_dsd_file);
        if native_dsd {
            tracing::debug!("equalizer skipped for native DSD output");
            return;
        }
        if s.stream.is_some() {
            lock(&self.equalizer).attach();
        }
    }

    fn play(self: &Arc<Self>, url: &str) -> EngineResult<()> {
        let info = self.probe.probe(url)?;
        let mut s = lock(&self.session);
        s.music_url = Some(url.to_string());

        let fading_handover = s.settings.fade_enabled
            && s.playing
            && s.output() == OutputMode::DirectSound
            && s.stream.is_some();
        if !fading_handover {
            return self.switch_to(&mut s, url, info);
        }

        let (position, duration) = s
            .stream
            .as_ref()
            .map_or((0.0, 0.0), |st| (st.position(), st.duration));
        let remaining = duration - position;
        if remaining < HANDOVER_MIN_REMAINING || duration <= 0.0 {
            return self.switch_to(&mut s, url, info);
        }

        let fade_ms = (remaining * 500.0).min(500.0) as u64;
        self.fader.fade_out(fade_ms)?;
        let generation = s.bump_generation();
        drop(s);

        let shared = Arc::clone(self);
        let url = url.to_string();
        thread::Builder::new().name("handover".into()).spawn(move || {
            thread::sleep(Duration::from_millis(fade_ms + HANDOVER_SLACK_MS));
            let mut s = lock(&shared.session);
            if s.generation != generation {
                tracing::debug!(url = %url, "handover superseded");
                return;
            }
            shared.fader.stop();
            if let Err(e) = shared.switch_to(&mut s, &url, info) {
                tracing::warn!(url = %url, error = %e, "handover failed");
            }
        })?;
        Ok(())
    }

    fn play_button(self: &Arc<Self>) -> EngineResult<()> {
        let mut s = lock(&self.session);
        if s.playing {
            if s.uses_channel_gain() && s.settings.fade_enabled {
                self.fader.fade_out(FADE_OUT_MS)?;
            }
            self.halt(&mut s);
            s.playing = false;
            s.bump_generation();
        } else if s.stream.is_some() {
            if let Some(stream) = s.stream.as_mut() {
                if stream.at_end() {
                    stream.seek(0.0);
                }
                stream.clock.run();
            }
            if s.uses_channel_gain() {
                if s.settings.fade_enabled {
                    self.fader.fade_in(s.volume, FADE_IN_MS)?;
                } else {
                    self.fader.set_gain(s.volume);
                }
            }
            s.playing = true;
        } else if let Some(url) = s.music_url.clone().filter(|u| !u.trim().is_empty()) {
            drop(s);
            // Reports the new state itself.
            return self.play(&url);
        }
        let playing = s.playing;
        drop(s);
        self.events.play_state_changed(playing);
        Ok(())
    }

    fn set_volume(&self, volume: f64) {
        let mut s = lock(&self.session);
        s.volume = volume as f32;
        if s.stream.is_none() {
            return;
        }
        if s.uses_channel_gain() {
            self.fader.set_gain(s.volume);
        } else if s.output().is_exclusive() {
            tracing::debug!(db = s.range.linear_to_db(volume), "device volume");
        }
    }

    fn update_settings(&self, settings: PlaybackSettings) {
        let mut s = lock(&self.session);
        let reswitch = settings.setting_changed;
        s.volume = settings.volume;
        s.settings = settings;
        tracing::debug!(output = %s.settings.output_mode, reswitch, "settings applied");
        if reswitch {
            self.reswitch(&mut s);
        }
    }

    /// Reopen the current track on the configured output, keeping position.
    fn reswitch(&self, s: &mut Session) {
        let position = s.position();
        if s.output().is_exclusive() {
            s.volume_safety = true;
        }
        let Some(url) = s.music_url.clone() else {
            return;
        };
        let info = match self.probe.probe(&url) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "reswitch failed");
                return;
            }
        };
        let was_playing = s.playing;
        self.halt(s);
        self.open_stream(s, &url, info);
        if was_playing {
            if let Err(e) = self.start(s) {
                tracing::warn!(url = %url, error = %e, "restart after reswitch failed");
            }
        }
        if let Some(stream) = s.stream.as_mut() {
            stream.seek(position);
        }
    }

    fn adjust_position(&self, delta: i32) -> f64 {
        let mut s = lock(&self.session);
        if !s.playing {
            return 0.0;
        }
        let Some(stream) = s.stream.as_mut() else {
            return 0.0;
        };
        let target = stream.clamp(stream.position() + f64::from(delta));
        stream.seek(target);
        target
    }

    fn music_end(&self) {
        let mut s = lock(&self.session);
        if let Some(stream) = s.stream.as_mut() {
            stream.clock.halt();
            stream.seek(0.0);
        }
        s.playing = false;
        s.bump_generation();
    }

    fn dispose(&self) {
        let mut s = lock(&self.session);
        self.close_stream(&mut s);
        tracing::info!("engine disposed");
    }

    /// Called by the watcher: report the end of the track once.
    fn check_end(&self) {
        let mut s = lock(&self.session);
        if !s.playing {
            return;
        }
        let ended = match s.stream.as_mut() {
            Some(stream) if stream.at_end() && !stream.end_reported => {
                stream.end_reported = true;
                stream.clock.halt();
                true
            }
            _ => false,
        };
        if ended {
            s.playing = false;
            drop(s);
            tracing::debug!("track ended");
            self.events.playback_ended(false);
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let s = lock(&self.session);
        let eq = lock(&self.equalizer);
        SessionSnapshot {
            playing: s.playing,
            music_url: s.music_url.clone(),
            stream_url: s.stream.as_ref().map(|st| st.url.clone()),
            volume: s.volume,
            gain: self.fader.gain(),
            position: s.position(),
            duration: s.stream.as_ref().map_or(0.0, |st| st.duration),
            equalizer: eq.active_gains(),
            equalizer_preset: *eq.preset(),
            volume_safety_armed: s.volume_safety,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionEngine
// ---------------------------------------------------------------------------

/// [`PlaybackEngine`] over an in-memory session.
///
/// Event sinks are called with the session lock held and must not call back
/// into the engine.
pub struct SessionEngine {
    shared: Arc<Shared>,
    watcher_stop: ShutdownToken,
    watcher: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SessionEngine {
    /// Engine that probes local files.
    pub fn new(events: Arc<dyn EventSink>) -> EngineResult<Self> {
        Self::with_probe(events, Box::new(FileProbe))
    }

    pub fn with_probe(events: Arc<dyn EventSink>, probe: Box<dyn TrackProbe>) -> EngineResult<Self> {
        let settings = PlaybackSettings::default();
        let shared = Arc::new(Shared {
            session: Mutex::new(Session {
                volume: settings.volume,
                settings,
                music_url: None,
                stream: None,
                playing: false,
                volume_safety: false,
                range: DbRange::default(),
                generation: 0,
            }),
            equalizer: Mutex::new(Equalizer::new()),
            fader: Fader::new(0.5),
            probe,
            events,
        });

        let watcher_stop = ShutdownToken::new();
        let watcher = {
            let shared = Arc::clone(&shared);
            let stop = watcher_stop.clone();
            thread::Builder::new().name("track-end".into()).spawn(move || {
                while !stop.wait_timeout(END_POLL) {
                    shared.check_end();
                }
            })?
        };

        Ok(Self {
            shared,
            watcher_stop,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.watcher_stop.cancel();
        self.shared.fader.stop();
        if let Some(handle) = lock(&self.watcher).take() {
            let _ = handle.join();
        }
    }
}

impl PlaybackEngine for SessionEngine {
    fn play(&self, url: &str) -> EngineResult<()> {
        self.shared.play(url)
    }

    fn play_button(&self) -> EngineResult<()> {
        self.shared.play_button()
    }

    fn set_music_url(&self, url: &str) -> EngineResult<()> {
        lock(&self.shared.session).music_url = Some(url.to_string());
        Ok(())
    }

    fn set_volume(&self, volume: f64) -> EngineResult<()> {
        self.shared.set_volume(volume);
        Ok(())
    }

    fn current_position(&self) -> EngineResult<f64> {
        Ok(lock(&self.shared.session).position())
    }

    fn duration(&self) -> EngineResult<f64> {
        Ok(lock(&self.shared.session)
            .stream
            .as_ref()
            .map_or(0.0, |st| st.duration))
    }

    fn seek(&self, seconds: f64) -> EngineResult<()> {
        if let Some(stream) = lock(&self.shared.session).stream.as_mut() {
            stream.seek(seconds);
        }
        Ok(())
    }

    fn update_settings(&self, settings: PlaybackSettings) -> EngineResult<()> {
        self.shared.update_settings(settings);
        Ok(())
    }

    fn adjust_position(&self, delta_seconds: i32) -> EngineResult<f64> {
        Ok(self.shared.adjust_position(delta_seconds))
    }

    fn music_end(&self) -> EngineResult<()> {
        self.shared.music_end();
        Ok(())
    }

    fn dispose(&self) -> EngineResult<()> {
        self.shared.dispose();
        Ok(())
    }

    fn toggle_equalizer(&self) -> EngineResult<()> {
        let s = lock(&self.shared.session);
        self.shared.attach_equalizer(&s);
        Ok(())
    }

    fn apply_equalizer(&self) -> EngineResult<()> {
        lock(&self.shared.equalizer).apply_preset();
        Ok(())
    }

    fn clear_equalizer(&self) -> EngineResult<()> {
        lock(&self.shared.equalizer).detach();
        Ok(())
    }

    fn set_equalizer_gain(&self, band: i32, gain: f32) -> EngineResult<()> {
        if !lock(&self.shared.equalizer).set_gain(band, gain) {
            tracing::debug!(band, "equalizer gain ignored");
        }
        Ok(())
    }

    fn update_equalizer(&self, gains: &[(String, f64)]) -> EngineResult<()> {
        let applied = lock(&self.shared.equalizer).merge_preset(gains);
        tracing::debug!(applied, "equalizer preset updated");
        Ok(())
    }

    fn fade_out(&self) -> EngineResult<()> {
        if lock(&self.shared.session).stream.is_some() {
            self.shared.fader.fade_out(FADE_OUT_MS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav(byte_rate: u32, data_len: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF");
        v.extend_from_slice(&(36 + data_len).to_le_bytes());
        v.extend_from_slice(b"WAVE");
        v.extend_from_slice(b"LIST");
        v.extend_from_slice(&3u32.to_le_bytes());
        v.extend_from_slice(&[0, 0, 0, 0]); // odd size + pad
        v.extend_from_slice(b"fmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&44_100u32.to_le_bytes());
        v.extend_from_slice(&byte_rate.to_le_bytes());
        v.extend_from_slice(&4u16.to_le_bytes());
        v.extend_from_slice(&16u16.to_le_bytes());
        v.extend_from_slice(b"data");
        v.extend_from_slice(&data_len.to_le_bytes());
        v
    }

    #[test]
    fn wav_length_comes_from_data_chunk() {
        let d = wav_duration(&mut Cursor::new(wav(176_400, 176_400 * 3))).expect("read");
        assert_eq!(d, Some(3.0));
    }

    #[test]
    fn non_wav_has_unknown_length() {
        assert_eq!(wav_duration(&mut Cursor::new(b"ID3\x04rest".to_vec())).expect("read"), None);
        assert_eq!(wav_duration(&mut Cursor::new(Vec::new())).expect("read"), None);
    }

    #[test]
    fn dsd_extensions_are_case_insensitive() {
        assert!(is_dsd_file("a/b.DSF"));
        assert!(is_dsd_file("x.dff"));
        assert!(!is_dsd_file("x.flac"));
    }

    #[test]
    fn clock_halts_and_resumes() {
        let mut c = PlayClock::stopped();
        c.set(5.0);
        assert_eq!(c.read(), 5.0);
        c.run();
        thread::sleep(Duration::from_millis(20));
        c.halt();
        let p = c.read();
        assert!(p >= 5.02);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(c.read(), p);
    }
}
