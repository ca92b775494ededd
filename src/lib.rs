//! burnsev: A Fast, Modular Wildfire Burn Severity Processor
//!
//! Computes burn severity maps from pre-fire and post-fire optical imagery
//! (Sentinel-2 or Landsat 8) and summarizes burned area per severity class.
//! Overlapping fire perimeters can be dissolved into disjoint merged
//! perimeters, and active-fire detections filtered against them.
//!
//! Imagery access and region reductions are supplied by the caller through
//! the [`io::ImageCatalog`] and [`io::RegionReducer`] traits.

pub mod types;
pub mod io;
pub mod core;
pub mod config;

// Re-export main types and functions for easier access
pub use types::{
    Band, BoundingBox, BurnError, BurnResult, DateWindow, Epoch, GeoTransform, ImageSet,
    RasterImage, Region, Scene, Sensor, ValidityMask, NODATA,
};

pub use config::AnalysisConfig;
pub use io::{ImageCatalog, InMemoryCatalog, LocalReducer, ReduceParams, RegionReducer};
pub use crate::core::{
    BurnSeverityPipeline, SeverityClass, SeverityReport, SeverityThresholds, ZonalRecord, ZonalReport,
};
