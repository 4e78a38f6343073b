// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Perceptual volume curve between a linear slider value and device decibels.

/// Decibel range of the output device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbRange {
    pub min_db: f64,
    pub max_db: f64,
}

impl Default for DbRange {
    fn default() -> Self {
        Self {
            min_db: -60.0,
            max_db: 0.0,
        }
    }
}

impl DbRange {
    pub fn mid_db(&self) -> f64 {
        (self.min_db + self.max_db) / 2.0
    }

    /// Map a linear value in `[0, 1]` onto the range with a log10 curve.
    pub fn linear_to_db(&self, linear: f64) -> f64 {
        if linear <= 0.0 {
            return self.min_db;
        }
        if linear >= 1.0 {
            return self.max_db;
        }
        self.max_db + (self.min_db - self.max_db) * (1.0 - (9.0 * linear + 1.0).log10())
    }

    /// Inverse of [`linear_to_db`](Self::linear_to_db).
    pub fn db_to_linear(&self, db: f64) -> f64 {
        let db = db.clamp(self.min_db, self.max_db);
        if db <= self.min_db {
            return 0.0;
        }
        let position = (db - self.max_db) / (self.min_db - self.max_db);
        (10f64.powf(1.0 - position) - 1.0) / 9.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_map_to_range_bounds() {
        let r = DbRange::default();
        assert_eq!(r.linear_to_db(0.0), -60.0);
        assert_eq!(r.linear_to_db(-1.0), -60.0);
        assert_eq!(r.linear_to_db(1.0), 0.0);
        assert_eq!(r.db_to_linear(-80.0), 0.0);
        assert!((r.db_to_linear(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn curves_are_inverse() {
        let r = DbRange::default();
        for x in [0.05, 0.25, 0.5, 0.9] {
            let back = r.db_to_linear(r.linear_to_db(x));
            assert!((back - x).abs() < 1e-9, "{x} -> {back}");
        }
    }

    #[test]
    fn mid_point_is_quarter_volume() {
        let r = DbRange::default();
        assert_eq!(r.mid_db(), -30.0);
        let v = r.db_to_linear(r.mid_db());
        assert!((v - (10f64.sqrt() - 1.0) / 9.0).abs() < 1e-12);
    }
}
