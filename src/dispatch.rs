// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Maps a decoded request onto one engine call and a fixed response.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::engine::equalizer::{parse_gain_map, BandGain};
use crate::engine::{EngineError, PlaybackEngine, PlaybackSettings};
use crate::message::{kind, Request, Response};

/// The closed set of commands a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Play,
    PlayButton,
    SetMusicUrl,
    Volume,
    GetProgress,
    GetDuration,
    ChangePosition,
    ChangeVolume,
    UpdateSettings,
    AdjustPlaybackPosition,
    MusicEnd,
    Dispose,
    ToggleEqualizer,
    SetEqualizer,
    ClearEqualizer,
    SetEqualizerGain,
    UpdateEq,
    FadeOut,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::Play,
        Command::PlayButton,
        Command::SetMusicUrl,
        Command::Volume,
        Command::GetProgress,
        Command::GetDuration,
        Command::ChangePosition,
        Command::ChangeVolume,
        Command::UpdateSettings,
        Command::AdjustPlaybackPosition,
        Command::MusicEnd,
        Command::Dispose,
        Command::ToggleEqualizer,
        Command::SetEqualizer,
        Command::ClearEqualizer,
        Command::SetEqualizerGain,
        Command::UpdateEq,
        Command::FadeOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Play => "Play",
            Command::PlayButton => "PlayButton",
            Command::SetMusicUrl => "SetMusicUrl",
            Command::Volume => "Volume",
            Command::GetProgress => "GetProgress",
            Command::GetDuration => "GetDuration",
            Command::ChangePosition => "ChangePosition",
            Command::ChangeVolume => "ChangeVolume",
            Command::UpdateSettings => "UpdateSettings",
            Command::AdjustPlaybackPosition => "AdjustPlaybackPosition",
            Command::MusicEnd => "MusicEnd",
            Command::Dispose => "Dispose",
            Command::ToggleEqualizer => "ToggleEqualizer",
            Command::SetEqualizer => "SetEqualizer",
            Command::ClearEqualizer => "ClearEqualizer",
            Command::SetEqualizerGain => "SetEqualizerGain",
            Command::UpdateEq => "UpdateEq",
            Command::FadeOut => "FadeOut",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

pub const RESULT_UNKNOWN_COMMAND: &str = "Error_UnknownCommand";
pub const RESULT_INVALID_PARAMETER: &str = "Error_InvalidParameter";
pub const RESULT_EXECUTION: &str = "Error_Execution";

enum Failure {
    Param(String),
    Engine(EngineError),
}

impl From<EngineError> for Failure {
    fn from(e: EngineError) -> Self {
        Failure::Engine(e)
    }
}

fn param<T, E: fmt::Display>(r: Result<T, E>) -> Result<T, Failure> {
    r.map_err(|e| Failure::Param(e.to_string()))
}

/// `f64::from_str` accepts "NaN" and "inf"; the engine must never see them.
fn finite(v: f64) -> Result<f64, Failure> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(Failure::Param(format!("{v} is not a finite number")))
    }
}

fn ok(message: &str, result: impl Into<String>) -> Response {
    Response::new(kind::SUCCESS, message, result)
}

/// Turns requests into engine calls.
pub struct CommandDispatcher {
    engine: Arc<dyn PlaybackEngine>,
}

impl CommandDispatcher {
    pub fn new(engine: Arc<dyn PlaybackEngine>) -> Self {
        Self { engine }
    }

    /// Always produces a response; failures are encoded in it.
    pub fn dispatch(&self, request: &Request) -> Response {
        let command = match request.command.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting request");
                return Response::failure("Unknown command", RESULT_UNKNOWN_COMMAND);
            }
        };
        tracing::debug!(%command, data_len = request.data().len(), "executing command");

        match self.execute(command, request.data()) {
            Ok(response) => response,
            Err(Failure::Param(detail)) => {
                tracing::debug!(%command, %detail, "invalid parameter");
                Response::failure(
                    format!("Invalid parameter for {command}: {detail}"),
                    RESULT_INVALID_PARAMETER,
                )
            }
            Err(Failure::Engine(e)) => {
                tracing::warn!(%command, error = %e, "command failed");
                Response::failure(format!("Error during command execution: {e}"), RESULT_EXECUTION)
            }
        }
    }

    fn execute(&self, command: Command, data: &str) -> Result<Response, Failure> {
        let engine = &*self.engine;
        let response = match command {
            Command::Play => {
                engine.play(data)?;
                ok("Started playing", "Playback_Started")
            }
            Command::PlayButton => {
                engine.play_button()?;
                ok("Play button pressed.", "Playback_Started")
            }
            Command::SetMusicUrl => {
                engine.set_music_url(data)?;
                ok("Music URL set", "MusicUrl_Set")
            }
            Command::Volume => {
                // Integer, handed to the engine unscaled.
                let volume: i32 = param(data.trim().parse())?;
                engine.set_volume(f64::from(volume))?;
                ok("Volume set.", "Volume_Set")
            }
            Command::GetProgress => {
                let position = engine.current_position()?;
                Response::new(kind::PROGRESS, "Current progress retrieved.", position.to_string())
            }
            Command::GetDuration => {
                let duration = engine.duration()?;
                Response::new(kind::DURATION, "Track duration retrieved.", duration.to_string())
            }
            Command::ChangePosition => {
                let seconds = finite(param(data.trim().parse())?)?;
                engine.seek(seconds)?;
                ok("Playback position changed.", "Position_Changed")
            }
            Command::ChangeVolume => {
                let volume = finite(param(data.trim().parse())?)?;
                engine.set_volume(volume)?;
                ok("Volume changed.", "Volume_Changed")
            }
            Command::UpdateSettings => {
                let settings = param(PlaybackSettings::from_json(data))?;
                engine.update_settings(settings)?;
                ok("Settings updated.", "Settings_Updated")
            }
            Command::AdjustPlaybackPosition => {
                let delta: i32 = param(data.trim().parse())?;
                let position = engine.adjust_position(delta)?;
                Response::new(kind::POSITION_ADJUSTED, "PlaybackPosition Adjusted.", position.to_string())
            }
            Command::MusicEnd => {
                engine.music_end()?;
                ok("MusicEnded", "MusicEnded")
            }
            Command::Dispose => {
                engine.dispose()?;
                Response::new(kind::DISPOSE, "Dispose", "Dispose")
            }
            Command::ToggleEqualizer => {
                engine.toggle_equalizer()?;
                ok("Toggled Eq", "Toggled_Eq")
            }
            Command::SetEqualizer => {
                engine.apply_equalizer()?;
                ok("Eq Setted", "Eq_Setted")
            }
            Command::ClearEqualizer => {
                engine.clear_equalizer()?;
                ok("Eq Cleared", "Eq_Cleared")
            }
            Command::SetEqualizerGain => {
                let band: BandGain = param(serde_json::from_str(data))?;
                engine.set_equalizer_gain(band.band_index, band.gain)?;
                ok("EqGain Setted", "EqGain_Setted")
            }
            Command::UpdateEq => {
                let gains = param(parse_gain_map(data))?;
                engine.update_equalizer(&gains)?;
                ok("Eq Updated", "Eq_Updated")
            }
            Command::FadeOut => {
                engine.fade_out()?;
                ok("Fade Out", "Fade_Out")
            }
        };
        Ok(response)
    }
}
