//! Analysis configuration
//!
//! Every field has a default, so a JSON document only needs the values that
//! differ from the standard run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::path::Path;

use crate::core::perimeter::DonorOrder;
use crate::core::sensor::{BandPair, Landsat8Profile, Sentinel2Profile, SensorProfile};
use crate::core::severity::SeverityThresholds;
use crate::io::reducer::ReduceParams;
use crate::types::{BurnError, BurnResult, DateWindow, Sensor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub sensor: Sensor,
    pub pre_fire: DateWindow,
    pub post_fire: DateWindow,
    /// Cloud probability at or above which a pixel is rejected
    pub max_cloud_probability: f32,
    /// Scene classification code treated as water
    pub water_class: u8,
    pub thresholds: SeverityThresholds,
    /// Overrides the sensor's NIR/SWIR pair
    pub nbr_bands: Option<BandPair>,
    /// Reduction scale for zonal statistics, meters
    pub pixel_size: f64,
    pub max_pixels: u64,
    /// Creation-time window for perimeter merging
    pub perimeter_window: DateWindow,
    pub donor_order: DonorOrder,
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sensor: Sensor::Sentinel2,
            pre_fire: DateWindow::new(ymd(2024, 12, 15), ymd(2025, 1, 5)),
            post_fire: DateWindow::new(ymd(2025, 1, 7), ymd(2025, 1, 17)),
            max_cloud_probability: 65.0,
            water_class: 6,
            thresholds: SeverityThresholds::default(),
            nbr_bands: None,
            pixel_size: 30.0,
            max_pixels: 10_000_000_000_000,
            perimeter_window: DateWindow::new(ymd(2025, 1, 1), ymd(2026, 1, 1)),
            donor_order: DonorOrder::ById,
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate. Well-formed JSON holding invalid values (bad
    /// thresholds, unknown keys, wrong types) is a configuration error.
    pub fn from_json_str(json: &str) -> BurnResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| match e.classify() {
            Category::Data => BurnError::Configuration(format!("Invalid analysis config: {}", e)),
            _ => BurnError::Json(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BurnResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading analysis config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> BurnResult<()> {
        for (name, window) in [
            ("pre_fire", &self.pre_fire),
            ("post_fire", &self.post_fire),
            ("perimeter_window", &self.perimeter_window),
        ] {
            if window.is_empty() {
                return Err(BurnError::Configuration(format!("{} window {} is empty", name, window)));
            }
        }

        if self.pre_fire.end > self.post_fire.start {
            log::warn!(
                "Pre-fire window {} overlaps post-fire window {}",
                self.pre_fire,
                self.post_fire
            );
        }

        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(BurnError::Configuration(format!(
                "pixel_size must be positive, got {}",
                self.pixel_size
            )));
        }

        if !(0.0..=100.0).contains(&self.max_cloud_probability) {
            return Err(BurnError::Configuration(format!(
                "max_cloud_probability must be within 0..=100, got {}",
                self.max_cloud_probability
            )));
        }

        if self.max_pixels == 0 {
            return Err(BurnError::Configuration("max_pixels must be nonzero".to_string()));
        }

        // Re-check in case the value was built in code rather than parsed
        SeverityThresholds::new(self.thresholds.values())?;
        Ok(())
    }

    /// The configured sensor's profile with masking and band overrides applied
    pub fn sensor_profile(&self) -> Box<dyn SensorProfile> {
        match self.sensor {
            Sensor::Sentinel2 => {
                let mut profile = Sentinel2Profile::default();
                profile.masking.max_cloud_probability = self.max_cloud_probability;
                profile.masking.water_class = self.water_class;
                if let Some(bands) = &self.nbr_bands {
                    profile.bands = bands.clone();
                }
                Box::new(profile)
            }
            Sensor::Landsat8 => {
                let mut profile = Landsat8Profile::default();
                if let Some(bands) = &self.nbr_bands {
                    profile.bands = bands.clone();
                }
                Box::new(profile)
            }
        }
    }

    pub fn reduce_params(&self) -> ReduceParams {
        ReduceParams::new(self.pixel_size, self.max_pixels)
    }
}
