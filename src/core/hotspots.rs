use chrono::{DateTime, Utc};
use geo::{Contains, Point};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::perimeter::MergedPerimeter;
use crate::types::BurnError;

/// VIIRS active-fire detection confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "l")]
    Low,
    #[serde(rename = "n")]
    Nominal,
    #[serde(rename = "h")]
    High,
}

impl FromStr for Confidence {
    type Err = BurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Confidence::Low),
            "n" | "nominal" => Ok(Confidence::Nominal),
            "h" | "high" => Ok(Confidence::High),
            other => Err(BurnError::Configuration(format!(
                "Unknown detection confidence code: {:?}",
                other
            ))),
        }
    }
}

/// One active-fire detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: Confidence,
    #[serde(default)]
    pub acquired: Option<DateTime<Utc>>,
}

impl Hotspot {
    pub fn new(latitude: f64, longitude: f64, confidence: Confidence) -> Self {
        Self {
            latitude,
            longitude,
            confidence,
            acquired: None,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Detections above low confidence lying strictly within a merged perimeter.
///
/// Perimeters and detections must share one coordinate system.
pub fn filter_hotspots(hotspots: &[Hotspot], perimeters: &[MergedPerimeter]) -> Vec<Hotspot> {
    let kept: Vec<Hotspot> = hotspots
        .iter()
        .filter(|h| h.confidence != Confidence::Low)
        .filter(|h| {
            let point = h.point();
            perimeters.iter().any(|p| p.geometry.contains(&point))
        })
        .cloned()
        .collect();

    log::info!(
        "Kept {} of {} fire detections inside {} perimeters",
        kept.len(),
        hotspots.len(),
        perimeters.len()
    );
    kept
}
