// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The playback capability the dispatcher drives, and a reference session
// engine that tracks stream state without producing audio.

use std::io;

use thiserror::Error;

pub mod equalizer;
pub mod fade;
pub mod session;
pub mod settings;
pub mod volume;

pub use equalizer::{BandGain, Equalizer, BAND_COUNT, BAND_FREQUENCIES, BAND_LABELS};
pub use session::{FileProbe, SessionEngine, SessionSnapshot, TrackInfo, TrackProbe};
pub use settings::{OutputMode, PlaybackSettings};
pub use volume::DbRange;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cannot open {url}: {source}")]
    Open {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported track {url}: {reason}")]
    Unsupported { url: String, reason: String },

    #[error("engine worker failed: {0}")]
    Worker(#[from] io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Operations the host exposes to the client, one per command.
///
/// Implementations are shared between the listener thread and their own
/// internal workers, so every method takes `&self`.
pub trait PlaybackEngine: Send + Sync {
    /// Replace the current stream with `url` and start it.
    fn play(&self, url: &str) -> EngineResult<()>;
    /// Toggle between playing and paused.
    fn play_button(&self) -> EngineResult<()>;
    /// Remember `url` for the next `play_button` without opening it.
    fn set_music_url(&self, url: &str) -> EngineResult<()>;
    /// Linear volume, 0.0 to 1.0.
    fn set_volume(&self, volume: f64) -> EngineResult<()>;
    /// Position in seconds, 0 without a stream.
    fn current_position(&self) -> EngineResult<f64>;
    /// Track length in seconds, 0 without a stream or when unknown.
    fn duration(&self) -> EngineResult<f64>;
    fn seek(&self, seconds: f64) -> EngineResult<()>;
    fn update_settings(&self, settings: PlaybackSettings) -> EngineResult<()>;
    /// Move the position by `delta_seconds` while playing; returns the new
    /// position, or 0 when nothing is playing.
    fn adjust_position(&self, delta_seconds: i32) -> EngineResult<f64>;
    /// Stop and rewind the current stream.
    fn music_end(&self) -> EngineResult<()>;
    /// Release the stream and every engine resource.
    fn dispose(&self) -> EngineResult<()>;
    fn toggle_equalizer(&self) -> EngineResult<()>;
    /// Load the stored preset into the active bands.
    fn apply_equalizer(&self) -> EngineResult<()>;
    fn clear_equalizer(&self) -> EngineResult<()>;
    fn set_equalizer_gain(&self, band: i32, gain: f32) -> EngineResult<()>;
    /// Merge label/gain pairs into the stored preset.
    fn update_equalizer(&self, gains: &[(String, f64)]) -> EngineResult<()>;
    fn fade_out(&self) -> EngineResult<()>;
}
