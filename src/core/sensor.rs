//! Sensor profiles
//!
//! Each supported platform bundles its collection identifiers, burn-ratio
//! band pair, scaling constants, mask strategy and display defaults behind
//! one trait. The profile is chosen once from the configuration and the
//! rest of the pipeline never branches on the platform again.

use serde::{Deserialize, Serialize};

use crate::core::masking::{CloudProbabilityParams, MaskStrategy, QaBitmaskParams};
use crate::core::scaling::{BandScaler, BandScaling};
use crate::types::{BurnResult, Sensor};

/// True-color display defaults for a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub bands: [String; 3],
    pub min: f32,
    pub max: f32,
    pub gamma: f32,
}

/// Near-infrared / shortwave-infrared pair used by the burn ratio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandPair {
    pub nir: String,
    pub swir: String,
}

impl BandPair {
    pub fn new(nir: impl Into<String>, swir: impl Into<String>) -> Self {
        Self {
            nir: nir.into(),
            swir: swir.into(),
        }
    }
}

pub trait SensorProfile: Send + Sync + std::fmt::Debug {
    fn sensor(&self) -> Sensor;

    /// Surface reflectance collection queried from the catalog
    fn collection_id(&self) -> &str;

    /// Auxiliary collection joined by scene id, if the mask needs one
    fn cloud_probability_collection(&self) -> Option<&str> {
        None
    }

    fn nbr_bands(&self) -> &BandPair;

    fn scaler(&self) -> BurnResult<BandScaler>;

    fn mask_strategy(&self) -> MaskStrategy;

    fn visualization(&self) -> VisParams;

    /// Native ground-sampling distance of the burn-ratio bands, meters
    fn native_resolution(&self) -> f64;
}

/// Sentinel-2 harmonized surface reflectance with the s2cloudless join
#[derive(Debug, Clone)]
pub struct Sentinel2Profile {
    pub collection: String,
    pub cloud_collection: String,
    pub bands: BandPair,
    pub masking: CloudProbabilityParams,
}

impl Default for Sentinel2Profile {
    fn default() -> Self {
        Self {
            collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            cloud_collection: "COPERNICUS/S2_CLOUD_PROBABILITY".to_string(),
            bands: BandPair::new("B8", "B12"),
            masking: CloudProbabilityParams::default(),
        }
    }
}

impl SensorProfile for Sentinel2Profile {
    fn sensor(&self) -> Sensor {
        Sensor::Sentinel2
    }

    fn collection_id(&self) -> &str {
        &self.collection
    }

    fn cloud_probability_collection(&self) -> Option<&str> {
        Some(&self.cloud_collection)
    }

    fn nbr_bands(&self) -> &BandPair {
        &self.bands
    }

    fn scaler(&self) -> BurnResult<BandScaler> {
        // The harmonized collection is delivered as calibrated reflectance
        Ok(BandScaler::identity())
    }

    fn mask_strategy(&self) -> MaskStrategy {
        MaskStrategy::CloudProbability(self.masking.clone())
    }

    fn visualization(&self) -> VisParams {
        VisParams {
            bands: ["B4".to_string(), "B3".to_string(), "B2".to_string()],
            min: 0.0,
            max: 2000.0,
            gamma: 1.5,
        }
    }

    fn native_resolution(&self) -> f64 {
        10.0
    }
}

/// Landsat 8 Collection 2 Level-2
#[derive(Debug, Clone)]
pub struct Landsat8Profile {
    pub collection: String,
    pub bands: BandPair,
    pub scalings: Vec<BandScaling>,
    pub masking: QaBitmaskParams,
}

impl Default for Landsat8Profile {
    fn default() -> Self {
        Self {
            collection: "LANDSAT/LC08/C02/T1_L2".to_string(),
            bands: BandPair::new("SR_B5", "SR_B7"),
            scalings: vec![
                BandScaling::landsat_c2_reflectance(),
                BandScaling::landsat_c2_thermal(),
            ],
            masking: QaBitmaskParams::default(),
        }
    }
}

impl SensorProfile for Landsat8Profile {
    fn sensor(&self) -> Sensor {
        Sensor::Landsat8
    }

    fn collection_id(&self) -> &str {
        &self.collection
    }

    fn nbr_bands(&self) -> &BandPair {
        &self.bands
    }

    fn scaler(&self) -> BurnResult<BandScaler> {
        BandScaler::new(self.scalings.clone())
    }

    fn mask_strategy(&self) -> MaskStrategy {
        MaskStrategy::QaBitmask(self.masking.clone())
    }

    fn visualization(&self) -> VisParams {
        VisParams {
            bands: ["SR_B4".to_string(), "SR_B3".to_string(), "SR_B2".to_string()],
            min: 0.0,
            max: 1.0,
            gamma: 2.0,
        }
    }

    fn native_resolution(&self) -> f64 {
        30.0
    }
}

impl Sensor {
    /// Default profile for this platform
    pub fn profile(&self) -> Box<dyn SensorProfile> {
        match self {
            Sensor::Sentinel2 => Box::new(Sentinel2Profile::default()),
            Sensor::Landsat8 => Box::new(Landsat8Profile::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_carry_platform_specifics() {
        let s2 = Sensor::Sentinel2.profile();
        assert_eq!(s2.nbr_bands(), &BandPair::new("B8", "B12"));
        assert!(s2.scaler().unwrap().is_identity());
        assert!(matches!(s2.mask_strategy(), MaskStrategy::CloudProbability(_)));
        assert!(s2.cloud_probability_collection().is_some());

        let l8 = Sensor::Landsat8.profile();
        assert_eq!(l8.nbr_bands(), &BandPair::new("SR_B5", "SR_B7"));
        assert!(!l8.scaler().unwrap().is_identity());
        assert!(matches!(l8.mask_strategy(), MaskStrategy::QaBitmask(_)));
        assert!(l8.cloud_probability_collection().is_none());
        assert_eq!(l8.native_resolution(), 30.0);
    }
}
