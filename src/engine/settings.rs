// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Settings pushed by the client in `UpdateSettings`.

use serde::{Deserialize, Serialize};

/// Output back-end selected by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    DirectSound,
    WasapiShared,
    WasapiExclusivePush,
    WasapiExclusiveEvent,
    Asio,
    /// Anything else; handled like the default back-end except for fades.
    Other,
}

impl OutputMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "DirectSound" => OutputMode::DirectSound,
            "WasapiShared" => OutputMode::WasapiShared,
            "WasapiExclusivePush" => OutputMode::WasapiExclusivePush,
            "WasapiExclusiveEvent" => OutputMode::WasapiExclusiveEvent,
            "ASIO" => OutputMode::Asio,
            _ => OutputMode::Other,
        }
    }

    pub fn is_wasapi(self) -> bool {
        matches!(
            self,
            OutputMode::WasapiShared | OutputMode::WasapiExclusivePush | OutputMode::WasapiExclusiveEvent
        )
    }

    /// Exclusive device access: the volume goes straight to the hardware.
    pub fn is_exclusive(self) -> bool {
        matches!(self, OutputMode::WasapiExclusivePush | OutputMode::WasapiExclusiveEvent)
    }
}

/// Wire keys follow the client's naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    #[serde(rename = "OutputMode")]
    pub output_mode: String,
    #[serde(rename = "BassOutputDeviceId")]
    pub output_device_id: i32,
    #[serde(rename = "BassASIODeviceId")]
    pub asio_device_id: i32,
    /// Milliseconds.
    #[serde(rename = "Latency")]
    pub latency: i32,
    #[serde(rename = "IsDopEnabled")]
    pub dop_enabled: bool,
    #[serde(rename = "dsdGain")]
    pub dsd_gain: i32,
    #[serde(rename = "dsdPcmFreq")]
    pub dsd_pcm_freq: i32,
    #[serde(rename = "IsEqualizerEnabled")]
    pub equalizer_enabled: bool,
    #[serde(rename = "Volume")]
    pub volume: f32,
    /// Reopen the current stream on the (possibly new) device.
    #[serde(rename = "IsSettingChanged")]
    pub setting_changed: bool,
    #[serde(rename = "IsFadeEnabled")]
    pub fade_enabled: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            output_mode: "DirectSound".to_string(),
            output_device_id: -1,
            asio_device_id: 0,
            latency: 400,
            dop_enabled: false,
            dsd_gain: 6,
            dsd_pcm_freq: 88200,
            equalizer_enabled: false,
            volume: 0.5,
            setting_changed: false,
            fade_enabled: false,
        }
    }
}

impl PlaybackSettings {
    pub fn output(&self) -> OutputMode {
        OutputMode::parse(&self.output_mode)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}
