//! Perceptual volume curve
//!
//! The bridge reports and accepts volume as a gain offset in dB, with 0 dB
//! as reference loudness. Users think in percent, so the displayed value
//! follows `percent = 100 * 10^(db / K)`, clamped to 0..=100.
//!
//! Reference loudness is full scale: any gain above 0 dB reads as 100%, and
//! no percentage maps back to a positive gain.

use crate::config::CoordinatorConfig;

/// Mapping between dB gain and a 0-100 volume percentage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCurve {
    calibration: f64,
    min_db: f64,
    max_db: f64,
}

impl VolumeCurve {
    /// Create a curve with calibration constant `k` over `[min_db, max_db]`
    pub fn new(k: f64, min_db: f64, max_db: f64) -> Self {
        Self {
            calibration: k,
            min_db,
            max_db,
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(
            config.volume_calibration,
            config.volume_min_db,
            config.volume_max_db,
        )
    }

    /// Same curve with a different upper bound (server-reported `maxGain`)
    pub fn with_max_db(self, max_db: f64) -> Self {
        Self {
            max_db: max_db.max(self.min_db),
            ..self
        }
    }

    pub fn min_db(&self) -> f64 {
        self.min_db
    }

    pub fn max_db(&self) -> f64 {
        self.max_db
    }

    /// Clamp a gain into the valid range
    pub fn clamp_db(&self, db: f64) -> f64 {
        if db.is_nan() {
            return self.min_db;
        }
        db.clamp(self.min_db, self.max_db)
    }

    /// Convert a gain to the displayed percentage
    pub fn db_to_percent(&self, db: f64) -> u8 {
        let db = self.clamp_db(db);
        let percent = (100.0 * 10f64.powf(db / self.calibration)).round();
        percent.clamp(0.0, 100.0) as u8
    }

    /// Convert a requested percentage to the gain to send
    ///
    /// 0% maps to the bottom of the range.
    pub fn percent_to_db(&self, percent: u8) -> f64 {
        let percent = percent.min(100);
        if percent == 0 {
            return self.min_db;
        }
        self.clamp_db(self.calibration * (f64::from(percent) / 100.0).log10())
    }
}

impl Default for VolumeCurve {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}
