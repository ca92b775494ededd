use geo::{Intersects, Point};
use ndarray::{s, Array2, Zip};
use std::collections::BTreeSet;
use std::ops::Range;

use crate::types::{
    BoundingBox, BurnError, BurnResult, DateWindow, Epoch, GeoTransform, ImageSet, RasterImage,
    Region, ValidityMask, NODATA,
};

/// Metadata describing how a composite was assembled
#[derive(Debug, Clone)]
pub struct CompositeMetadata {
    pub epoch: Epoch,
    pub window: DateWindow,
    /// Scene ids in mosaic priority order
    pub scene_ids: Vec<String>,
    /// Pixels whose center lies inside the region
    pub region_pixels: usize,
}

/// One mosaicked, region-clipped image per epoch
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RasterImage,
    pub metadata: CompositeMetadata,
}

/// Merges a time- and space-bounded scene collection into one mosaic
pub struct TemporalCompositor {
    region: Region,
    bounds: BoundingBox,
}

impl TemporalCompositor {
    pub fn new(region: Region) -> BurnResult<Self> {
        let bounds = BoundingBox::of_region(&region).ok_or_else(|| {
            BurnError::Configuration("Analysis region is empty".to_string())
        })?;
        Ok(Self { region, bounds })
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Filter by `[start, end)` and region bounds, mosaic, frame to the
    /// region envelope on the scenes' lattice, then clip.
    ///
    /// An empty collection after filtering is a configuration error: it
    /// almost always means the date window is wrong for the sensor's
    /// revisit rate.
    pub fn composite(&self, scenes: &ImageSet, window: &DateWindow, epoch: Epoch) -> BurnResult<Composite> {
        log::info!("Compositing {} scenes for {} window {}", scenes.len(), epoch, window);

        let filtered = scenes
            .filter_date(window)
            .filter_bounds(&self.bounds)
            .sorted_by_time();

        if filtered.is_empty() {
            return Err(BurnError::Configuration(format!(
                "No scenes available for {} epoch in {} over region {}",
                epoch, window, self.bounds
            )));
        }

        log::debug!("{} scenes remain after date and bounds filtering", filtered.len());

        let mosaicked = mosaic(&filtered)?;
        let framed = frame_to_bounds(&mosaicked, &self.bounds)?;
        let clipped = clip_to_region(&framed, &self.region)?;
        let region_pixels = match clipped.dim() {
            Some(dim) => region_mask(dim, &clipped.transform, &self.region).count_valid(),
            None => 0,
        };

        Ok(Composite {
            image: clipped,
            metadata: CompositeMetadata {
                epoch,
                window: *window,
                scene_ids: filtered.iter().map(|s| s.id.clone()).collect(),
                region_pixels,
            },
        })
    }
}

/// Per pixel and band, the first non-masked value across the ordered scenes.
///
/// A collection with exactly one scene is returned unchanged. Scenes must
/// share a pixel size and lie on one pixel lattice; the output covers the
/// union of their extents, no-data where no scene reaches.
pub fn mosaic(scenes: &ImageSet) -> BurnResult<RasterImage> {
    let first = scenes
        .scenes()
        .first()
        .ok_or_else(|| BurnError::Configuration("Cannot mosaic an empty collection".to_string()))?;

    if scenes.len() == 1 {
        return Ok(first.image.clone());
    }

    let reference = first.image.transform;

    // (row offset, col offset, rows, cols) of every scene that has bands
    let mut placements = Vec::with_capacity(scenes.len());
    for scene in scenes.iter() {
        let (row_off, col_off) = lattice_offset(&scene.image.transform, &reference).ok_or_else(|| {
            BurnError::Processing(format!(
                "Scene {} is not on the pixel lattice of scene {}",
                scene.id, first.id
            ))
        })?;
        if let Some((rows, cols)) = scene.image.dim() {
            placements.push((scene, row_off, col_off, rows, cols));
        }
    }

    let min_row = placements.iter().map(|p| p.1).min().unwrap_or(0);
    let min_col = placements.iter().map(|p| p.2).min().unwrap_or(0);
    let max_row = placements.iter().map(|p| p.1 + p.3 as isize).max().unwrap_or(0);
    let max_col = placements.iter().map(|p| p.2 + p.4 as isize).max().unwrap_or(0);
    let dim = ((max_row - min_row) as usize, (max_col - min_col) as usize);
    let transform = shifted(&reference, min_row, min_col);

    let band_names: BTreeSet<&str> = scenes.iter().flat_map(|s| s.image.band_names()).collect();
    let mut output = RasterImage::new(transform, first.image.crs.clone());

    // Earliest scene wins, unlike last-on-top mosaics; later scenes only fill no-data
    for name in band_names {
        let mut merged = Array2::from_elem(dim, NODATA);
        for &(scene, row_off, col_off, rows, cols) in &placements {
            if let Some(band) = scene.image.band(name) {
                let r0 = (row_off - min_row) as usize;
                let c0 = (col_off - min_col) as usize;
                Zip::from(merged.slice_mut(s![r0..r0 + rows, c0..c0 + cols]))
                    .and(band)
                    .for_each(|out, &v| {
                        if out.is_nan() && !v.is_nan() {
                            *out = v;
                        }
                    });
            }
        }
        output = output.with_band(name, merged)?;
    }

    log::debug!(
        "Mosaicked {} scenes into {} bands of {}x{}",
        scenes.len(),
        output.band_count(),
        dim.0,
        dim.1
    );

    Ok(output)
}

/// Re-grid an image onto the lattice-aligned window covering `bounds`.
///
/// Pixels outside the source extent become no-data. Two images on one
/// lattice framed to the same bounds end up on identical grids.
pub fn frame_to_bounds(image: &RasterImage, bounds: &BoundingBox) -> BurnResult<RasterImage> {
    let (rows, cols) = match image.dim() {
        Some(dim) => dim,
        None => return Ok(image.clone()),
    };
    let gt = &image.transform;
    const EPS: f64 = 1e-9;

    let (top, left) = gt.to_pixel(bounds.min_x, bounds.max_y);
    let (bottom, right) = gt.to_pixel(bounds.max_x, bounds.min_y);
    let row0 = (top.min(bottom) + EPS).floor() as isize;
    let row1 = (top.max(bottom) - EPS).ceil() as isize;
    let col0 = (left.min(right) + EPS).floor() as isize;
    let col1 = (left.max(right) - EPS).ceil() as isize;

    if row1 <= row0 || col1 <= col0 {
        return Err(BurnError::Processing(format!("Region {} covers no pixels", bounds)));
    }
    let dim = ((row1 - row0) as usize, (col1 - col0) as usize);

    let rows_src = overlap(-row0, rows, dim.0);
    let cols_src = overlap(-col0, cols, dim.1);

    let mut framed = RasterImage::new(shifted(gt, row0, col0), image.crs.clone());
    for (name, band) in image.bands() {
        let mut out = Array2::from_elem(dim, NODATA);
        if let (Some((src_r, dst_r)), Some((src_c, dst_c))) = (rows_src.clone(), cols_src.clone()) {
            out.slice_mut(s![dst_r, dst_c]).assign(&band.slice(s![src_r, src_c]));
        }
        framed = framed.with_band(name, out)?;
    }
    Ok(framed)
}

/// Source and destination index ranges when a source of `src_len` pixels
/// starts at `offset` in a destination of `dst_len` pixels
fn overlap(offset: isize, src_len: usize, dst_len: usize) -> Option<(Range<usize>, Range<usize>)> {
    let dst_start = offset.max(0);
    let dst_end = (offset + src_len as isize).min(dst_len as isize);
    if dst_start >= dst_end {
        return None;
    }
    let src_start = (dst_start - offset) as usize;
    let src_end = (dst_end - offset) as usize;
    Some((src_start..src_end, dst_start as usize..dst_end as usize))
}

/// Whole-pixel `(row, col)` offset of `from`'s origin on `to`'s lattice,
/// `None` when pixel sizes differ or the offset is fractional
pub(crate) fn lattice_offset(from: &GeoTransform, to: &GeoTransform) -> Option<(isize, isize)> {
    const TOL: f64 = 1e-6;
    if (from.pixel_width - to.pixel_width).abs() > TOL || (from.pixel_height - to.pixel_height).abs() > TOL {
        return None;
    }
    let col = (from.top_left_x - to.top_left_x) / to.pixel_width;
    let row = (from.top_left_y - to.top_left_y) / to.pixel_height;
    if (col - col.round()).abs() > TOL || (row - row.round()).abs() > TOL {
        return None;
    }
    Some((row.round() as isize, col.round() as isize))
}

fn shifted(gt: &GeoTransform, rows: isize, cols: isize) -> GeoTransform {
    GeoTransform {
        top_left_x: gt.top_left_x + cols as f64 * gt.pixel_width,
        top_left_y: gt.top_left_y + rows as f64 * gt.pixel_height,
        ..*gt
    }
}

/// Set every pixel whose center lies outside the region to no-data
pub fn clip_to_region(image: &RasterImage, region: &Region) -> BurnResult<RasterImage> {
    match image.dim() {
        Some(dim) => image.update_mask(&region_mask(dim, &image.transform, region)),
        None => Ok(image.clone()),
    }
}

/// Pixels whose center falls inside (or on the boundary of) the region
pub fn region_mask(dim: (usize, usize), transform: &GeoTransform, region: &Region) -> ValidityMask {
    let mut inside = Array2::from_elem(dim, false);
    let test = |(row, col): (usize, usize), v: &mut bool| {
        let (x, y) = transform.pixel_center(row, col);
        *v = region.intersects(&Point::new(x, y));
    };

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut inside).par_for_each(test);
    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut inside).for_each(test);

    ValidityMask::from_array(inside)
}

pub(crate) fn same_grid(a: &GeoTransform, b: &GeoTransform) -> bool {
    const TOL: f64 = 1e-6;
    (a.top_left_x - b.top_left_x).abs() < TOL
        && (a.top_left_y - b.top_left_y).abs() < TOL
        && (a.pixel_width - b.pixel_width).abs() < TOL
        && (a.pixel_height - b.pixel_height).abs() < TOL
}
