use geo::{Intersects, Point};
use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, BurnError, BurnResult, GeoTransform, Region, ValidityMask};

/// Reduction request parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReduceParams {
    /// Target resolution in CRS units (meters)
    pub scale: f64,
    /// Upper bound on pixels visited before the reduction fails
    pub max_pixels: u64,
}

impl ReduceParams {
    pub fn new(scale: f64, max_pixels: u64) -> Self {
        Self { scale, max_pixels }
    }

    pub fn pixel_area(&self) -> f64 {
        self.scale * self.scale
    }
}

impl Default for ReduceParams {
    fn default() -> Self {
        Self {
            scale: 30.0,
            max_pixels: 10_000_000_000_000,
        }
    }
}

/// Raster-engine collaborator that performs region reductions
pub trait RegionReducer: Send + Sync {
    /// Count the selected pixels inside the region at the requested scale.
    ///
    /// Must fail with [`BurnError::ResourceExceeded`] rather than return a
    /// partial count when the pixel budget is exceeded.
    fn count(
        &self,
        selected: &ValidityMask,
        transform: &GeoTransform,
        region: &Region,
        params: &ReduceParams,
    ) -> BurnResult<u64>;
}

/// In-process reducer over ndarray masks.
///
/// A coarser target scale is honoured by nearest-neighbour sampling: one
/// native pixel (the block center) stands for each target pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalReducer;

impl LocalReducer {
    pub fn new() -> Self {
        Self
    }

    fn stride(transform: &GeoTransform, scale: f64) -> usize {
        let resolution = transform.resolution();
        if resolution <= 0.0 || scale <= resolution {
            return 1;
        }
        ((scale / resolution).round() as usize).max(1)
    }

    /// Pixel index range covering the region envelope, clamped to the grid
    fn window(
        transform: &GeoTransform,
        bounds: &BoundingBox,
        dim: (usize, usize),
    ) -> ((usize, usize), (usize, usize)) {
        let (r0, c0) = transform.to_pixel(bounds.min_x, bounds.max_y);
        let (r1, c1) = transform.to_pixel(bounds.max_x, bounds.min_y);
        let clamp = |v: f64, max: usize| -> usize { v.max(0.0).min(max as f64) as usize };
        let rows = (clamp(r0.min(r1).floor(), dim.0), clamp(r0.max(r1).ceil(), dim.0));
        let cols = (clamp(c0.min(c1).floor(), dim.1), clamp(c0.max(c1).ceil(), dim.1));
        (rows, cols)
    }
}

impl RegionReducer for LocalReducer {
    fn count(
        &self,
        selected: &ValidityMask,
        transform: &GeoTransform,
        region: &Region,
        params: &ReduceParams,
    ) -> BurnResult<u64> {
        if params.scale <= 0.0 {
            return Err(BurnError::Configuration(format!(
                "Reduction scale must be positive, got {}",
                params.scale
            )));
        }

        let bounds = match BoundingBox::of_region(region) {
            Some(b) => b,
            None => return Ok(0),
        };

        let stride = Self::stride(transform, params.scale);
        let offset = stride / 2;
        let ((row_start, row_end), (col_start, col_end)) = Self::window(transform, &bounds, selected.dim());

        let sampled = |start: usize, end: usize| -> Vec<usize> {
            (start..end).filter(|i| i % stride == offset).collect()
        };
        let rows = sampled(row_start, row_end);
        let cols = sampled(col_start, col_end);

        let visited = (rows.len() as u64) * (cols.len() as u64);
        if visited > params.max_pixels {
            return Err(BurnError::ResourceExceeded {
                visited,
                max_pixels: params.max_pixels,
                context: format!("count over region {} at scale {}", bounds, params.scale),
            });
        }

        let mut count = 0u64;
        for &row in &rows {
            for &col in &cols {
                if !selected.is_valid(row, col) {
                    continue;
                }
                let (x, y) = transform.pixel_center(row, col);
                if region.intersects(&Point::new(x, y)) {
                    count += 1;
                }
            }
        }

        log::debug!(
            "Counted {} of {} sampled pixels (stride {})",
            count,
            visited,
            stride
        );
        Ok(count)
    }
}
