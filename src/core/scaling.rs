use crate::types::{Band, BurnError, BurnResult, RasterImage};
use ndarray::{Array2, Zip};
use num_traits::ToPrimitive;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Linear digital-number to physical-unit conversion for a group of bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandScaling {
    /// Regular expression matched against the full band name
    pub pattern: String,
    pub scale: f32,
    pub offset: f32,
}

impl BandScaling {
    pub fn new(pattern: impl Into<String>, scale: f32, offset: f32) -> Self {
        Self {
            pattern: pattern.into(),
            scale,
            offset,
        }
    }

    /// Landsat Collection 2 surface reflectance (`SR_B1`..`SR_B7`)
    pub fn landsat_c2_reflectance() -> Self {
        Self::new("^SR_B.$", 0.0000275, -0.2)
    }

    /// Landsat Collection 2 surface temperature (Kelvin)
    pub fn landsat_c2_thermal() -> Self {
        Self::new("^ST_B10$", 0.00341802, 149.0)
    }

    #[inline]
    pub fn apply_value(&self, value: f32) -> f32 {
        value * self.scale + self.offset
    }

    /// Inverse transform back to digital numbers
    pub fn invert(&self, value: f32) -> BurnResult<f32> {
        if self.scale == 0.0 {
            return Err(BurnError::Configuration(format!(
                "Scaling for {} has zero scale and cannot be inverted",
                self.pattern
            )));
        }
        Ok((value - self.offset) / self.scale)
    }
}

/// Scaled image plus the scaling rules that matched no band
#[derive(Debug, Clone)]
pub struct ScaleOutcome {
    pub image: RasterImage,
    pub missing: Vec<String>,
}

/// Applies sensor scale/offset pairs to an image's optical and thermal bands
#[derive(Debug, Clone)]
pub struct BandScaler {
    rules: Vec<(BandScaling, Regex)>,
}

impl BandScaler {
    /// Compile the band patterns of each scaling rule
    pub fn new(scalings: Vec<BandScaling>) -> BurnResult<Self> {
        let rules = scalings
            .into_iter()
            .map(|s| {
                let re = Regex::new(&s.pattern).map_err(|e| {
                    BurnError::Configuration(format!("Invalid band pattern {}: {}", s.pattern, e))
                })?;
                Ok((s, re))
            })
            .collect::<BurnResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Scaler for catalogs that already deliver calibrated reflectance
    pub fn identity() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn is_identity(&self) -> bool {
        self.rules.is_empty()
    }

    /// Scaling rule for a band name, first matching rule wins
    pub fn rule_for(&self, band_name: &str) -> Option<&BandScaling> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(band_name))
            .map(|(s, _)| s)
    }

    /// Scale every band matched by a rule, leaving other bands untouched.
    ///
    /// A rule that matches nothing is a data gap: the image is returned
    /// unmodified for it and the pattern is reported in `missing`.
    pub fn scale(&self, image: &RasterImage) -> ScaleOutcome {
        if self.is_identity() {
            return ScaleOutcome {
                image: image.clone(),
                missing: Vec::new(),
            };
        }

        let missing: Vec<String> = self
            .rules
            .iter()
            .filter(|(_, re)| !image.band_names().any(|name| re.is_match(name)))
            .map(|(s, _)| s.pattern.clone())
            .collect();
        for pattern in &missing {
            log::warn!("No band matches scaling pattern {}, leaving image unscaled for it", pattern);
        }

        let scaled = image.map_bands(|name, band| match self.rule_for(name) {
            Some(rule) => {
                log::debug!(
                    "Scaling band {} by {} + {}",
                    name,
                    rule.scale,
                    rule.offset
                );
                apply_linear(band, rule)
            }
            None => band.clone(),
        });

        ScaleOutcome {
            image: scaled,
            missing,
        }
    }

    /// Convert a raw integer band (e.g. `u16` digital numbers) to physical units
    pub fn scale_raw<T>(raw: &Array2<T>, scaling: &BandScaling) -> Band
    where
        T: ToPrimitive + Copy,
    {
        raw.mapv(|dn| match dn.to_f32() {
            Some(v) => scaling.apply_value(v),
            None => f32::NAN,
        })
    }
}

fn apply_linear(band: &Band, scaling: &BandScaling) -> Band {
    #[cfg(feature = "parallel")]
    {
        Zip::from(band).par_map_collect(|&v| scaling.apply_value(v))
    }
    #[cfg(not(feature = "parallel"))]
    {
        Zip::from(band).map_collect(|&v| scaling.apply_value(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;

    fn landsat_image() -> RasterImage {
        RasterImage::new(GeoTransform::new(0.0, 60.0, 30.0), None)
            .with_band("SR_B5", Array2::from_elem((2, 2), 20000.0))
            .unwrap()
            .with_band("SR_B7", Array2::from_elem((2, 2), 10000.0))
            .unwrap()
            .with_band("ST_B10", Array2::from_elem((2, 2), 44000.0))
            .unwrap()
            .with_band("QA_PIXEL", Array2::from_elem((2, 2), 21824.0))
            .unwrap()
    }

    fn landsat_scaler() -> BandScaler {
        BandScaler::new(vec![
            BandScaling::landsat_c2_reflectance(),
            BandScaling::landsat_c2_thermal(),
        ])
        .unwrap()
    }

    #[test]
    fn test_scales_optical_and_thermal() {
        let out = landsat_scaler().scale(&landsat_image());
        assert!(out.missing.is_empty());

        let nir = out.image.band("SR_B5").unwrap()[[0, 0]];
        assert_relative_eq!(nir, 20000.0 * 0.0000275 - 0.2, epsilon = 1e-6);
        let st = out.image.band("ST_B10").unwrap()[[1, 1]];
        assert_relative_eq!(st, 44000.0 * 0.00341802 + 149.0, epsilon = 1e-2);
    }

    #[test]
    fn test_unlisted_bands_untouched() {
        let out = landsat_scaler().scale(&landsat_image());
        assert_eq!(out.image.band("QA_PIXEL").unwrap()[[0, 0]], 21824.0);
    }

    #[test]
    fn test_missing_thermal_band_degrades() {
        let image = landsat_image().select(&["SR_B5", "SR_B7"]);
        let out = landsat_scaler().scale(&image);
        assert_eq!(out.missing, vec!["^ST_B10$".to_string()]);
        assert!(!out.image.has_band("ST_B10"));
        assert_relative_eq!(out.image.band("SR_B7").unwrap()[[0, 0]], 0.075, epsilon = 1e-6);
    }

    #[test]
    fn test_identity_is_noop() {
        let image = landsat_image();
        let out = BandScaler::identity().scale(&image);
        assert_eq!(out.image, image);
    }

    #[test]
    fn test_invert_round_trip() {
        let rule = BandScaling::landsat_c2_reflectance();
        for x in [0.0_f32, 0.05, 0.3, 0.9] {
            let dn = rule.invert(x).unwrap();
            assert_relative_eq!(rule.apply_value(dn), x, epsilon = 1e-5);
        }
        assert!(BandScaling::new("B1", 0.0, 1.0).invert(1.0).is_err());
    }

    #[test]
    fn test_scale_raw_u16() {
        let raw: Array2<u16> = Array2::from_elem((1, 3), 7273);
        let band = BandScaler::scale_raw(&raw, &BandScaling::landsat_c2_reflectance());
        assert_relative_eq!(band[[0, 2]], 7273.0 * 0.0000275 - 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let err = BandScaler::new(vec![BandScaling::new("SR_B(", 1.0, 0.0)]).unwrap_err();
        assert!(matches!(err, BurnError::Configuration(_)));
    }
}
