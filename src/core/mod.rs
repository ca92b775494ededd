//! Core burn severity processing modules

pub mod scaling;
pub mod masking;
pub mod sensor;
pub mod composite;
pub mod burn_index;
pub mod severity;
pub mod zonal;
pub mod perimeter;
pub mod hotspots;
pub mod pipeline;

// Re-export main types
pub use scaling::{BandScaler, BandScaling, ScaleOutcome};
pub use masking::{CloudProbabilityParams, MaskReport, MaskStats, MaskStrategy, QaBitmaskParams, QualityMasker};
pub use sensor::{BandPair, Landsat8Profile, Sentinel2Profile, SensorProfile, VisParams};
pub use composite::{Composite, CompositeMetadata, TemporalCompositor};
pub use burn_index::{BurnIndexEngine, DNBR_SCALE};
pub use severity::{ClassifiedRaster, SeverityClass, SeverityClassifier, SeverityThresholds};
pub use zonal::{ZonalAccumulator, ZonalRecord, ZonalReport, ZonalStatistics};
pub use perimeter::{DonorOrder, MergedPerimeter, Perimeter, PerimeterMerger};
pub use hotspots::{filter_hotspots, Confidence, Hotspot};
pub use pipeline::{BurnSeverityPipeline, EpochSummary, SeverityReport};
