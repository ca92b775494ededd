use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use geo::{BoundingRect, MultiPolygon};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single raster band in physical or raw units
pub type Band = Array2<f32>;

/// Tagged no-data value carried by every band
pub const NODATA: f32 = f32::NAN;

/// Analysis area supplied by the caller (polygon or multi-polygon)
pub type Region = MultiPolygon<f64>;

/// Supported satellite platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    #[serde(rename = "S2", alias = "s2")]
    Sentinel2,
    #[serde(rename = "L8", alias = "l8")]
    Landsat8,
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sensor::Sentinel2 => write!(f, "Sentinel-2"),
            Sensor::Landsat8 => write!(f, "Landsat 8"),
        }
    }
}

/// Acquisition epoch relative to the fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Epoch {
    PreFire,
    PostFire,
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Epoch::PreFire => write!(f, "pre-fire"),
            Epoch::PostFire => write!(f, "post-fire"),
        }
    }
}

/// Half-open date range `[start, end)` evaluated at midnight UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        *time >= self.start_utc() && *time < self.end_utc()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Axis-aligned bounding box in CRS units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Envelope of a region, `None` for an empty region
    pub fn of_region(region: &Region) -> Option<Self> {
        region.bounding_rect().map(|rect| Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4}, {:.4})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// North-up affine transform from pixel to CRS coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub top_left_y: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            top_left_y,
            pixel_height: -pixel_size,
        }
    }

    /// CRS coordinates of the center of pixel `(row, col)`
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.top_left_x + (col as f64 + 0.5) * self.pixel_width,
            self.top_left_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Ground-sampling resolution (pixel width) in CRS units
    pub fn resolution(&self) -> f64 {
        self.pixel_width.abs()
    }

    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// Fractional `(row, col)` of a CRS coordinate
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (y - self.top_left_y) / self.pixel_height,
            (x - self.top_left_x) / self.pixel_width,
        )
    }

    pub fn extent(&self, rows: usize, cols: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + cols as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + rows as f64 * self.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Per-pixel usability, `true` = valid
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityMask(Array2<bool>);

impl ValidityMask {
    pub fn all_valid(dim: (usize, usize)) -> Self {
        Self(Array2::from_elem(dim, true))
    }

    pub fn from_array(mask: Array2<bool>) -> Self {
        Self(mask)
    }

    /// A band's own mask: valid wherever the band carries data
    pub fn from_band(band: &Band) -> Self {
        Self(band.mapv(|v| !v.is_nan()))
    }

    /// Conjunctive composition of two independent mask sources
    pub fn and(&self, other: &ValidityMask) -> BurnResult<ValidityMask> {
        if self.dim() != other.dim() {
            return Err(BurnError::Processing(format!(
                "Cannot combine masks of shape {:?} and {:?}",
                self.dim(),
                other.dim()
            )));
        }
        Ok(Self(Zip::from(&self.0).and(&other.0).map_collect(|&a, &b| a && b)))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.0[[row, col]]
    }

    pub fn count_valid(&self) -> usize {
        self.0.iter().filter(|&&v| v).count()
    }

    pub fn count_invalid(&self) -> usize {
        self.0.len() - self.count_valid()
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.0
    }
}

/// Multi-band raster on a common grid. Values are immutable once built;
/// every transformation returns a new image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    bands: BTreeMap<String, Band>,
    pub transform: GeoTransform,
    pub crs: Option<String>,
}

impl RasterImage {
    pub fn new(transform: GeoTransform, crs: Option<String>) -> Self {
        Self {
            bands: BTreeMap::new(),
            transform,
            crs,
        }
    }

    /// Add or replace a band, returning the new image
    pub fn with_band(mut self, name: impl Into<String>, band: Band) -> BurnResult<Self> {
        let name = name.into();
        if let Some(dim) = self.dim() {
            if band.dim() != dim {
                return Err(BurnError::Processing(format!(
                    "Band {} has shape {:?}, image grid is {:?}",
                    name,
                    band.dim(),
                    dim
                )));
            }
        }
        self.bands.insert(name, band);
        Ok(self)
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.get(name)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(|k| k.as_str())
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Band)> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Grid shape `(rows, cols)`, `None` for an image with no bands
    pub fn dim(&self) -> Option<(usize, usize)> {
        self.bands.values().next().map(|b| b.dim())
    }

    pub fn resolution(&self) -> f64 {
        self.transform.resolution()
    }

    /// Validity mask of one band, `None` if the band is absent
    pub fn band_mask(&self, name: &str) -> Option<ValidityMask> {
        self.band(name).map(ValidityMask::from_band)
    }

    /// Keep only the listed bands that exist
    pub fn select(&self, names: &[&str]) -> Self {
        Self {
            bands: self
                .bands
                .iter()
                .filter(|(k, _)| names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }

    /// Mark every band as no-data wherever `mask` is invalid
    pub fn update_mask(&self, mask: &ValidityMask) -> BurnResult<Self> {
        let mut bands = BTreeMap::new();
        for (name, band) in &self.bands {
            if band.dim() != mask.dim() {
                return Err(BurnError::Processing(format!(
                    "Mask shape {:?} does not match band {} shape {:?}",
                    mask.dim(),
                    name,
                    band.dim()
                )));
            }
            let masked = Zip::from(band)
                .and(mask.as_array())
                .map_collect(|&v, &ok| if ok { v } else { NODATA });
            bands.insert(name.clone(), masked);
        }
        Ok(Self {
            bands,
            transform: self.transform,
            crs: self.crs.clone(),
        })
    }

    pub fn map_bands<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&str, &Band) -> Band,
    {
        Self {
            bands: self
                .bands
                .iter()
                .map(|(k, v)| (k.clone(), f(k, v)))
                .collect(),
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }
}

/// One catalog entry: an image plus acquisition metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// System identifier, used to co-register auxiliary collections
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub footprint: BoundingBox,
    pub image: RasterImage,
}

impl Scene {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, image: RasterImage) -> Self {
        let footprint = match image.dim() {
            Some((rows, cols)) => image.transform.extent(rows, cols),
            None => image.transform.extent(0, 0),
        };
        Self {
            id: id.into(),
            acquired,
            footprint,
            image,
        }
    }

    pub fn with_image(&self, image: RasterImage) -> Self {
        Self {
            id: self.id.clone(),
            acquired: self.acquired,
            footprint: self.footprint,
            image,
        }
    }
}

/// Ordered collection of scenes sharing a band schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSet {
    scenes: Vec<Scene>,
}

impl ImageSet {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.scenes.iter()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn into_scenes(self) -> Vec<Scene> {
        self.scenes
    }

    pub fn filter_date(&self, window: &DateWindow) -> Self {
        Self {
            scenes: self
                .scenes
                .iter()
                .filter(|s| window.contains(&s.acquired))
                .cloned()
                .collect(),
        }
    }

    pub fn filter_bounds(&self, bounds: &BoundingBox) -> Self {
        Self {
            scenes: self
                .scenes
                .iter()
                .filter(|s| s.footprint.intersects(bounds))
                .cloned()
                .collect(),
        }
    }

    /// Stable sort by acquisition time, earliest first
    pub fn sorted_by_time(&self) -> Self {
        let mut scenes = self.scenes.clone();
        scenes.sort_by_key(|s| s.acquired);
        Self { scenes }
    }

    pub fn try_map<F>(&self, f: F) -> BurnResult<Self>
    where
        F: FnMut(&Scene) -> BurnResult<Scene>,
    {
        Ok(Self {
            scenes: self.scenes.iter().map(f).collect::<BurnResult<Vec<_>>>()?,
        })
    }
}

/// Error types for burn severity processing
#[derive(Debug, thiserror::Error)]
pub enum BurnError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data gap: band {band} missing ({context})")]
    DataGap { band: String, context: String },

    #[error("Resource exceeded: {visited} pixels visited, budget {max_pixels} ({context})")]
    ResourceExceeded {
        visited: u64,
        max_pixels: u64,
        context: String,
    },

    #[error("Zero area: {0}")]
    ZeroArea(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for burn severity operations
pub type BurnResult<T> = Result<T, BurnError>;
