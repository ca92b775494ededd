use ndarray::{Array2, Zip};

use crate::core::sensor::BandPair;
use crate::types::{Band, BurnError, BurnResult, RasterImage, NODATA};

/// USGS reporting convention: dNBR is published scaled by 1000
pub const DNBR_SCALE: f32 = 1000.0;

/// `(a - b) / (a + b)`; no-data input or an exactly-zero denominator is no-data
#[inline]
pub fn normalized_difference_value(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return NODATA;
    }
    let denominator = a + b;
    if denominator == 0.0 {
        return NODATA;
    }
    (a - b) / denominator
}

/// Pixelwise normalized difference of two bands on the same grid
pub fn normalized_difference(a: &Band, b: &Band) -> BurnResult<Band> {
    if a.dim() != b.dim() {
        return Err(BurnError::Processing(format!(
            "Normalized difference bands differ in shape: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }

    #[cfg(feature = "parallel")]
    let nd = Zip::from(a).and(b).par_map_collect(|&x, &y| normalized_difference_value(x, y));
    #[cfg(not(feature = "parallel"))]
    let nd = Zip::from(a).and(b).map_collect(|&x, &y| normalized_difference_value(x, y));

    Ok(nd)
}

/// Normalized Burn Ratio per epoch and its scaled temporal delta
#[derive(Debug, Clone)]
pub struct BurnIndexEngine {
    bands: BandPair,
}

impl BurnIndexEngine {
    pub fn new(bands: BandPair) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &BandPair {
        &self.bands
    }

    /// NBR = (NIR - SWIR) / (NIR + SWIR).
    ///
    /// A missing band is a data gap: the index comes back entirely no-data
    /// rather than failing the run.
    pub fn nbr(&self, image: &RasterImage) -> BurnResult<Band> {
        let dim = image
            .dim()
            .ok_or_else(|| BurnError::Processing("Cannot compute NBR of an image with no bands".to_string()))?;

        match (image.band(&self.bands.nir), image.band(&self.bands.swir)) {
            (Some(nir), Some(swir)) => {
                log::debug!("Computing NBR from {} and {}", self.bands.nir, self.bands.swir);
                normalized_difference(nir, swir)
            }
            _ => {
                let missing = if image.has_band(&self.bands.nir) {
                    &self.bands.swir
                } else {
                    &self.bands.nir
                };
                log::warn!("Band {} missing, NBR is no-data for this epoch", missing);
                Ok(Array2::from_elem(dim, NODATA))
            }
        }
    }

    /// dNBR = (pre - post) * 1000. Positive values mean the post-fire
    /// ratio dropped, i.e. higher burn severity.
    pub fn dnbr(&self, pre: &Band, post: &Band) -> BurnResult<Band> {
        if pre.dim() != post.dim() {
            return Err(BurnError::Processing(format!(
                "Pre-fire NBR {:?} and post-fire NBR {:?} are on different grids",
                pre.dim(),
                post.dim()
            )));
        }

        log::info!("Computing dNBR over {}x{} pixels", pre.nrows(), pre.ncols());

        // NaN on either side propagates
        let delta = Zip::from(pre)
            .and(post)
            .map_collect(|&a, &b| (a - b) * DNBR_SCALE);
        Ok(delta)
    }
}
