// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Ten-band peaking equalizer state: a stored preset plus the bands currently
// attached to the stream.

use serde::Deserialize;

pub const BAND_COUNT: usize = 10;

pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

pub const BAND_LABELS: [&str; BAND_COUNT] = [
    "32Hz", "64Hz", "125Hz", "250Hz", "500Hz", "1kHz", "2kHz", "4kHz", "8kHz", "16kHz",
];

/// Payload of `SetEqualizerGain`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BandGain {
    #[serde(rename = "bandIndex")]
    pub band_index: i32,
    pub gain: f32,
}

/// Parse an `UpdateEq` payload: a JSON object of label to gain. Entries whose
/// value is not a number are skipped.
pub fn parse_gain_map(data: &str) -> serde_json::Result<Vec<(String, f64)>> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(data)?;
    Ok(map
        .into_iter()
        .filter_map(|(label, value)| value.as_f64().map(|g| (label, g)))
        .collect())
}

#[derive(Debug, Clone, Default)]
pub struct Equalizer {
    preset: [f64; BAND_COUNT],
    active: Option<[f32; BAND_COUNT]>,
}

impl Equalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn band_index(label: &str) -> Option<usize> {
        BAND_LABELS.iter().position(|l| *l == label)
    }

    /// Merge gains into the preset; unknown labels are ignored. Returns how
    /// many bands changed.
    pub fn merge_preset(&mut self, gains: &[(String, f64)]) -> usize {
        let mut applied = 0;
        for (label, gain) in gains {
            if let Some(i) = Self::band_index(label) {
                self.preset[i] = *gain;
                applied += 1;
            }
        }
        applied
    }

    pub fn preset(&self) -> &[f64; BAND_COUNT] {
        &self.preset
    }

    /// Attach fresh, flat bands to the stream.
    pub fn attach(&mut self) {
        self.active = Some([0.0; BAND_COUNT]);
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_gains(&self) -> Option<[f32; BAND_COUNT]> {
        self.active
    }

    /// Copy the preset into the attached bands. No-op when detached.
    pub fn apply_preset(&mut self) {
        if let Some(bands) = self.active.as_mut() {
            for (band, gain) in bands.iter_mut().zip(self.preset.iter()) {
                *band = *gain as f32;
            }
        }
    }

    /// Change one attached band. Returns `false` when detached or out of range.
    pub fn set_gain(&mut self, index: i32, gain: f32) -> bool {
        let Some(bands) = self.active.as_mut() else {
            return false;
        };
        match usize::try_from(index).ok().and_then(|i| bands.get_mut(i)) {
            Some(band) => {
                *band = gain;
                true
            }
            None => false,
        }
    }

    pub fn detach(&mut self) {
        self.active = None;
    }
}
