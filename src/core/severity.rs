use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::types::{Band, BurnError, BurnResult};

/// Ordinal dNBR severity classes.
///
/// The discriminant is the class index produced by the threshold count. Index
/// 0 is "NA" even though it is drawn last in the legend; downstream consumers
/// key on these indices, so the historical ordering is kept as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeverityClass {
    NotApplicable = 0,
    High = 1,
    ModerateHigh = 2,
    ModerateLow = 3,
    Low = 4,
    Unburned = 5,
    EnhancedRegrowthLow = 6,
    EnhancedRegrowthHigh = 7,
}

/// Code written for unclassified pixels by [`SeverityClassifier::to_codes`]
pub const UNCLASSIFIED_CODE: u8 = 255;

/// Classified dNBR raster; `None` marks no-data
pub type ClassifiedRaster = Array2<Option<SeverityClass>>;

impl SeverityClass {
    /// All classes in index order
    pub const ALL: [SeverityClass; 8] = [
        SeverityClass::NotApplicable,
        SeverityClass::High,
        SeverityClass::ModerateHigh,
        SeverityClass::ModerateLow,
        SeverityClass::Low,
        SeverityClass::Unburned,
        SeverityClass::EnhancedRegrowthLow,
        SeverityClass::EnhancedRegrowthHigh,
    ];

    /// Legend order: regrowth first, "NA" last
    pub const DISPLAY_ORDER: [SeverityClass; 8] = [
        SeverityClass::EnhancedRegrowthHigh,
        SeverityClass::EnhancedRegrowthLow,
        SeverityClass::Unburned,
        SeverityClass::Low,
        SeverityClass::ModerateLow,
        SeverityClass::ModerateHigh,
        SeverityClass::High,
        SeverityClass::NotApplicable,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            SeverityClass::NotApplicable => "NA",
            SeverityClass::High => "High Severity",
            SeverityClass::ModerateHigh => "Moderate-high Severity",
            SeverityClass::ModerateLow => "Moderate-low Severity",
            SeverityClass::Low => "Low Severity",
            SeverityClass::Unburned => "Unburned",
            SeverityClass::EnhancedRegrowthLow => "Enhanced Regrowth, Low",
            SeverityClass::EnhancedRegrowthHigh => "Enhanced Regrowth, High",
        }
    }

    /// Legend color as `#rrggbb`
    pub fn color(self) -> &'static str {
        match self {
            SeverityClass::NotApplicable => "#ffffff",
            SeverityClass::High => "#a41fd6",
            SeverityClass::ModerateHigh => "#ff641b",
            SeverityClass::ModerateLow => "#ffaf38",
            SeverityClass::Low => "#fff70b",
            SeverityClass::Unburned => "#0ae042",
            SeverityClass::EnhancedRegrowthLow => "#acbe4d",
            SeverityClass::EnhancedRegrowthHigh => "#7a8737",
        }
    }
}

impl std::fmt::Display for SeverityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Eight strictly increasing dNBR class boundaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityThresholds([f32; 8]);

impl SeverityThresholds {
    /// USGS-calibrated boundaries for dNBR scaled by 1000
    pub const USGS: [f32; 8] = [-1000.0, -251.0, -101.0, 99.0, 269.0, 439.0, 659.0, 2000.0];

    pub fn new(values: &[f32]) -> BurnResult<Self> {
        let values: [f32; 8] = values.try_into().map_err(|_| {
            BurnError::Configuration(format!(
                "Expected 8 severity thresholds, got {}",
                values.len()
            ))
        })?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BurnError::Configuration(
                "Severity thresholds must be finite".to_string(),
            ));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BurnError::Configuration(format!(
                "Severity thresholds must be strictly increasing: {:?}",
                values
            )));
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32; 8] {
        &self.0
    }

    /// Number of thresholds strictly above the value, folded into 0..=7.
    ///
    /// A value equal to a threshold is not below it, so boundary values land
    /// in the lower class index. Values under the lowest threshold fold into
    /// the highest index.
    pub fn classify_value(&self, value: f32) -> Option<SeverityClass> {
        if value.is_nan() {
            return None;
        }
        let below = self.0.iter().filter(|&&t| value < t).count();
        SeverityClass::from_index(below.min(7) as u8)
    }
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self(Self::USGS)
    }
}

impl<'de> Deserialize<'de> for SeverityThresholds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<f32>::deserialize(deserializer)?;
        SeverityThresholds::new(&values).map_err(serde::de::Error::custom)
    }
}

/// Maps the continuous dNBR raster to ordinal severity classes
#[derive(Debug, Clone, Default)]
pub struct SeverityClassifier {
    thresholds: SeverityThresholds,
}

impl SeverityClassifier {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }

    pub fn classify(&self, dnbr: &Band) -> ClassifiedRaster {
        log::info!("Classifying {}x{} dNBR pixels", dnbr.nrows(), dnbr.ncols());
        let thresholds = &self.thresholds;

        #[cfg(feature = "parallel")]
        let classified = Zip::from(dnbr).par_map_collect(|&v| thresholds.classify_value(v));
        #[cfg(not(feature = "parallel"))]
        let classified = Zip::from(dnbr).map_collect(|&v| thresholds.classify_value(v));

        classified
    }

    /// Integer class codes for export, [`UNCLASSIFIED_CODE`] for no-data
    pub fn to_codes(classified: &ClassifiedRaster) -> Array2<u8> {
        classified.mapv(|c| c.map_or(UNCLASSIFIED_CODE, SeverityClass::index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_to_name_table() {
        let names: Vec<&str> = (0..8u8)
            .map(|i| SeverityClass::from_index(i).unwrap().label())
            .collect();
        assert_eq!(
            names,
            vec![
                "NA",
                "High Severity",
                "Moderate-high Severity",
                "Moderate-low Severity",
                "Low Severity",
                "Unburned",
                "Enhanced Regrowth, Low",
                "Enhanced Regrowth, High",
            ]
        );
        assert_eq!(SeverityClass::from_index(8), None);
    }

    #[test]
    fn test_boundaries_map_to_lower_index() {
        let t = SeverityThresholds::default();
        assert_eq!(t.classify_value(659.0), Some(SeverityClass::High));
        assert_eq!(t.classify_value(658.9), Some(SeverityClass::ModerateHigh));
        assert_eq!(t.classify_value(269.0), Some(SeverityClass::ModerateLow));
        assert_eq!(t.classify_value(99.0), Some(SeverityClass::Low));
        assert_eq!(t.classify_value(98.0), Some(SeverityClass::Unburned));
        assert_eq!(t.classify_value(-101.0), Some(SeverityClass::Unburned));
        assert_eq!(t.classify_value(-102.0), Some(SeverityClass::EnhancedRegrowthLow));
        assert_eq!(t.classify_value(2000.0), Some(SeverityClass::NotApplicable));
        assert_eq!(t.classify_value(-1000.0), Some(SeverityClass::EnhancedRegrowthHigh));
    }

    #[test]
    fn test_every_finite_value_gets_one_class() {
        let t = SeverityThresholds::default();
        let mut v = -5000.0_f32;
        while v < 5000.0 {
            let class = t.classify_value(v).unwrap();
            assert!(class.index() <= 7);
            v += 7.3;
        }
        assert_eq!(t.classify_value(-1e9), Some(SeverityClass::EnhancedRegrowthHigh));
        assert_eq!(t.classify_value(f32::NAN), None);
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(SeverityThresholds::new(&[1.0, 2.0]).is_err());
        assert!(SeverityThresholds::new(&[0.0, 1.0, 2.0, 3.0, 3.0, 5.0, 6.0, 7.0]).is_err());
        assert!(SeverityThresholds::new(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, f32::INFINITY]).is_err());
        assert!(SeverityThresholds::new(&SeverityThresholds::USGS).is_ok());
    }

    #[test]
    fn test_classify_raster_keeps_nodata_unclassified() {
        let dnbr = Array2::from_shape_vec((1, 3), vec![667.0, f32::NAN, 0.0]).unwrap();
        let classified = SeverityClassifier::default().classify(&dnbr);
        assert_eq!(classified[[0, 0]], Some(SeverityClass::High));
        assert_eq!(classified[[0, 1]], None);
        assert_eq!(classified[[0, 2]], Some(SeverityClass::Unburned));

        let codes = SeverityClassifier::to_codes(&classified);
        assert_eq!(codes.iter().copied().collect::<Vec<_>>(), vec![1, UNCLASSIFIED_CODE, 5]);
    }

    #[test]
    fn test_display_order_puts_na_last() {
        assert_eq!(SeverityClass::DISPLAY_ORDER[7], SeverityClass::NotApplicable);
        assert_eq!(SeverityClass::DISPLAY_ORDER[0], SeverityClass::EnhancedRegrowthHigh);
    }
}
