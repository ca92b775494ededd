use serde::{Deserialize, Serialize};

use crate::types::{BurnError, BurnResult, RasterImage, ValidityMask};

/// Parameters for fractional cloud-probability sensors (Sentinel-2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudProbabilityParams {
    /// Band joined in from the cloud-probability collection
    pub probability_band: String,
    /// Pixels at or above this probability are cloud
    pub max_cloud_probability: f32,
    /// Scene classification band
    pub scl_band: String,
    /// Reserved scene classification code for water
    pub water_class: u8,
    /// Coarser-resolution bands whose own masks are ANDed in. The masks of
    /// the 10 m bands do not always exclude stale data at scene edges.
    pub edge_bands: Vec<String>,
}

impl Default for CloudProbabilityParams {
    fn default() -> Self {
        Self {
            probability_band: "probability".to_string(),
            max_cloud_probability: 65.0,
            scl_band: "SCL".to_string(),
            water_class: 6,
            edge_bands: vec!["B8A".to_string(), "B9".to_string()],
        }
    }
}

/// Parameters for QA bitmask sensors (Landsat Collection 2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaBitmaskParams {
    pub qa_band: String,
    /// Must be clear
    pub cloud_shadow_bit: u8,
    /// Must be clear
    pub snow_bit: u8,
    /// Must be set
    pub clear_bit: u8,
}

impl Default for QaBitmaskParams {
    fn default() -> Self {
        Self {
            qa_band: "QA_PIXEL".to_string(),
            cloud_shadow_bit: 4,
            snow_bit: 5,
            clear_bit: 6,
        }
    }
}

/// Mask construction strategy, chosen by the sensor profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaskStrategy {
    CloudProbability(CloudProbabilityParams),
    QaBitmask(QaBitmaskParams),
}

/// Per sub-check rejection counts. A pixel rejected by several checks is
/// counted once per check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaskStats {
    pub total_pixels: usize,
    pub valid_pixels: usize,
    pub cloud_pixels: usize,
    pub water_pixels: usize,
    pub edge_pixels: usize,
    pub shadow_pixels: usize,
    pub snow_pixels: usize,
    pub not_clear_pixels: usize,
    pub valid_percentage: f64,
}

/// Combined validity mask with statistics and degraded sub-checks
#[derive(Debug, Clone)]
pub struct MaskReport {
    pub mask: ValidityMask,
    pub stats: MaskStats,
    /// Quality bands that were absent; their sub-check degraded to all-valid
    pub missing_bands: Vec<String>,
}

/// Builds fail-closed validity masks from sensor quality bands
#[derive(Debug, Clone)]
pub struct QualityMasker {
    strategy: MaskStrategy,
}

impl QualityMasker {
    pub fn new(strategy: MaskStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &MaskStrategy {
        &self.strategy
    }

    /// Build the conjunctive validity mask for one scene
    pub fn build_mask(&self, image: &RasterImage) -> BurnResult<MaskReport> {
        let dim = image.dim().ok_or_else(|| {
            BurnError::Processing("Cannot build a quality mask for an image with no bands".to_string())
        })?;

        let mut stats = MaskStats {
            total_pixels: dim.0 * dim.1,
            ..MaskStats::default()
        };
        let mut missing_bands = Vec::new();
        let mut mask = ValidityMask::all_valid(dim);

        match &self.strategy {
            MaskStrategy::CloudProbability(params) => {
                log::debug!(
                    "Building cloud-probability mask (threshold {})",
                    params.max_cloud_probability
                );

                match cloud_probability_mask(image, &params.probability_band, params.max_cloud_probability) {
                    Some(cloud) => {
                        stats.cloud_pixels = cloud.count_invalid();
                        mask = mask.and(&cloud)?;
                    }
                    None => missing_bands.push(params.probability_band.clone()),
                }

                match water_mask(image, &params.scl_band, params.water_class) {
                    Some(water) => {
                        stats.water_pixels = water.count_invalid();
                        mask = mask.and(&water)?;
                    }
                    None => missing_bands.push(params.scl_band.clone()),
                }

                let (edge, missing_edges) = edge_mask(image, &params.edge_bands)?;
                stats.edge_pixels = edge.count_invalid();
                mask = mask.and(&edge)?;
                missing_bands.extend(missing_edges);
            }
            MaskStrategy::QaBitmask(params) => {
                log::debug!("Building QA bitmask mask from {}", params.qa_band);

                match image.band(&params.qa_band) {
                    Some(qa) => {
                        let shadow = ValidityMask::from_array(qa.mapv(|v| bit_is_clear(v, params.cloud_shadow_bit)));
                        let snow = ValidityMask::from_array(qa.mapv(|v| bit_is_clear(v, params.snow_bit)));
                        let clear = ValidityMask::from_array(qa.mapv(|v| bit_is_set(v, params.clear_bit)));

                        stats.shadow_pixels = shadow.count_invalid();
                        stats.snow_pixels = snow.count_invalid();
                        stats.not_clear_pixels = clear.count_invalid();

                        mask = mask.and(&shadow)?.and(&snow)?.and(&clear)?;
                    }
                    None => missing_bands.push(params.qa_band.clone()),
                }
            }
        }

        for band in &missing_bands {
            log::warn!("Quality band {} missing, its mask check degrades to all-valid", band);
        }

        stats.valid_pixels = mask.count_valid();
        stats.valid_percentage = if stats.total_pixels > 0 {
            stats.valid_pixels as f64 / stats.total_pixels as f64 * 100.0
        } else {
            0.0
        };

        log::debug!(
            "Mask: {}/{} valid ({:.1}%)",
            stats.valid_pixels,
            stats.total_pixels,
            stats.valid_percentage
        );

        Ok(MaskReport {
            mask,
            stats,
            missing_bands,
        })
    }

    /// Mask every band of the image with its quality mask
    pub fn apply(&self, image: &RasterImage) -> BurnResult<(RasterImage, MaskReport)> {
        let report = self.build_mask(image)?;
        let masked = image.update_mask(&report.mask)?;
        Ok((masked, report))
    }
}

/// `probability < max`; no-data probability is invalid. `None` if the band is absent.
pub fn cloud_probability_mask(image: &RasterImage, band: &str, max_probability: f32) -> Option<ValidityMask> {
    image
        .band(band)
        .map(|p| ValidityMask::from_array(p.mapv(|v| !v.is_nan() && v < max_probability)))
}

/// Scene classification not equal to the water code. `None` if the band is absent.
pub fn water_mask(image: &RasterImage, band: &str, water_class: u8) -> Option<ValidityMask> {
    image.band(band).map(|scl| {
        ValidityMask::from_array(scl.mapv(|v| match qa_value(v) {
            Some(code) => code != water_class as u32,
            None => false,
        }))
    })
}

/// AND of the listed bands' own masks, plus the bands that were absent
pub fn edge_mask(image: &RasterImage, bands: &[String]) -> BurnResult<(ValidityMask, Vec<String>)> {
    let dim = image
        .dim()
        .ok_or_else(|| BurnError::Processing("Image has no bands".to_string()))?;
    let mut mask = ValidityMask::all_valid(dim);
    let mut missing = Vec::new();
    for name in bands {
        match image.band_mask(name) {
            Some(band_mask) => mask = mask.and(&band_mask)?,
            None => missing.push(name.clone()),
        }
    }
    Ok((mask, missing))
}

fn qa_value(v: f32) -> Option<u32> {
    if v.is_finite() && v >= 0.0 {
        Some(v as u32)
    } else {
        None
    }
}

/// Single-bit flag; `None` for a bit position outside the QA word
fn bit_flag(bit: u8) -> Option<u32> {
    1u32.checked_shl(bit as u32)
}

fn bit_is_clear(v: f32, bit: u8) -> bool {
    match (qa_value(v), bit_flag(bit)) {
        (Some(qa), Some(flag)) => qa & flag == 0,
        _ => false,
    }
}

fn bit_is_set(v: f32, bit: u8) -> bool {
    match (qa_value(v), bit_flag(bit)) {
        (Some(qa), Some(flag)) => qa & flag != 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, NODATA};
    use ndarray::Array2;

    fn row(values: &[f32]) -> Array2<f32> {
        Array2::from_shape_vec((1, values.len()), values.to_vec()).unwrap()
    }

    fn s2_image(prob: &[f32], scl: &[f32], b8a: &[f32]) -> RasterImage {
        let n = prob.len();
        RasterImage::new(GeoTransform::new(0.0, 10.0, 10.0), None)
            .with_band("B8", row(&vec![0.3; n]))
            .unwrap()
            .with_band("probability", row(prob))
            .unwrap()
            .with_band("SCL", row(scl))
            .unwrap()
            .with_band("B8A", row(b8a))
            .unwrap()
            .with_band("B9", row(&vec![0.1; n]))
            .unwrap()
    }

    fn valid(report: &MaskReport) -> Vec<bool> {
        report.mask.as_array().iter().copied().collect()
    }

    #[test]
    fn test_cloud_probability_threshold_is_strict() {
        let image = s2_image(&[10.0, 64.9, 65.0, 90.0], &[4.0; 4], &[0.2; 4]);
        let masker = QualityMasker::new(MaskStrategy::CloudProbability(CloudProbabilityParams::default()));
        let report = masker.build_mask(&image).unwrap();
        assert_eq!(valid(&report), vec![true, true, false, false]);
        assert_eq!(report.stats.cloud_pixels, 2);
    }

    #[test]
    fn test_water_and_edge_checks_are_anded() {
        let image = s2_image(&[0.0; 4], &[4.0, 6.0, 5.0, 4.0], &[0.2, 0.2, 0.2, NODATA]);
        let masker = QualityMasker::new(MaskStrategy::CloudProbability(CloudProbabilityParams::default()));
        let report = masker.build_mask(&image).unwrap();
        assert_eq!(valid(&report), vec![true, false, true, false]);
        assert_eq!(report.stats.water_pixels, 1);
        assert_eq!(report.stats.edge_pixels, 1);
        assert_eq!(report.stats.valid_pixels, 2);
    }

    #[test]
    fn test_missing_probability_degrades_to_all_valid() {
        let image = s2_image(&[99.0; 3], &[4.0; 3], &[0.2; 3]).select(&["B8", "SCL", "B8A", "B9"]);
        let masker = QualityMasker::new(MaskStrategy::CloudProbability(CloudProbabilityParams::default()));
        let report = masker.build_mask(&image).unwrap();
        assert_eq!(report.missing_bands, vec!["probability".to_string()]);
        assert_eq!(report.stats.valid_pixels, 3);
    }

    #[test]
    fn test_qa_bitmask_rules() {
        let clear = (1 << 6) as f32;
        let shadow = ((1 << 6) | (1 << 4)) as f32;
        let snow = ((1 << 6) | (1 << 5)) as f32;
        let cloudy = (1 << 3) as f32;
        let image = RasterImage::new(GeoTransform::new(0.0, 30.0, 30.0), None)
            .with_band("QA_PIXEL", row(&[clear, shadow, snow, cloudy, NODATA, 21824.0]))
            .unwrap();

        let masker = QualityMasker::new(MaskStrategy::QaBitmask(QaBitmaskParams::default()));
        let report = masker.build_mask(&image).unwrap();
        // 21824 = 0b0101_0101_0100_0000: clear set, shadow and snow clear
        assert_eq!(valid(&report), vec![true, false, false, false, false, true]);
        assert_eq!(report.stats.shadow_pixels, 2);
        assert_eq!(report.stats.snow_pixels, 2);
    }

    #[test]
    fn test_apply_masks_every_band() {
        let image = s2_image(&[0.0, 80.0], &[4.0, 4.0], &[0.2, 0.2]);
        let masker = QualityMasker::new(MaskStrategy::CloudProbability(CloudProbabilityParams::default()));
        let (masked, _) = masker.apply(&image).unwrap();
        assert_eq!(masked.band("B8").unwrap()[[0, 0]], 0.3);
        assert!(masked.band("B8").unwrap()[[0, 1]].is_nan());
    }

    #[test]
    fn test_out_of_range_qa_bit_fails_closed() {
        let image = RasterImage::new(GeoTransform::new(0.0, 30.0, 30.0), None)
            .with_band("QA_PIXEL", row(&[64.0, 21824.0]))
            .unwrap();
        let params = QaBitmaskParams {
            snow_bit: 40,
            ..QaBitmaskParams::default()
        };
        let report = QualityMasker::new(MaskStrategy::QaBitmask(params)).build_mask(&image).unwrap();
        assert_eq!(valid(&report), vec![false, false]);
        assert_eq!(report.stats.snow_pixels, 2);
        assert!(!bit_is_set(64.0, 32));
        assert!(bit_is_set(64.0, 6));
    }
}
