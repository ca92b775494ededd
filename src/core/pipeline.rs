//! End-to-end burn severity run
//!
//! Queries both epochs from the catalog, scales and masks every scene,
//! composites each epoch over the region and carries the result through the
//! burn index, classification and zonal statistics.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::AnalysisConfig;
use crate::core::burn_index::BurnIndexEngine;
use crate::core::composite::{same_grid, TemporalCompositor};
use crate::core::masking::{MaskStats, MaskStrategy, QualityMasker};
use crate::core::perimeter::{MergedPerimeter, Perimeter, PerimeterMerger};
use crate::core::sensor::SensorProfile;
use crate::core::severity::{ClassifiedRaster, SeverityClassifier};
use crate::core::zonal::{ZonalReport, ZonalStatistics};
use crate::io::catalog::{join_cloud_probability, ImageCatalog};
use crate::io::reducer::RegionReducer;
use crate::types::{
    Band, BoundingBox, BurnError, BurnResult, DateWindow, Epoch, GeoTransform, ImageSet, Region, Sensor,
};

/// What went into one epoch's composite
#[derive(Debug, Clone, Serialize)]
pub struct EpochSummary {
    pub epoch: Epoch,
    pub window: DateWindow,
    pub scene_ids: Vec<String>,
    /// Bands a scaling rule, mask check or index expected but did not find
    pub data_gaps: Vec<String>,
    pub mask_stats: Vec<MaskStats>,
    pub region_pixels: usize,
}

impl EpochSummary {
    pub fn scene_count(&self) -> usize {
        self.scene_ids.len()
    }
}

/// Output of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct SeverityReport {
    pub sensor: Sensor,
    pub pre_fire: EpochSummary,
    pub post_fire: EpochSummary,
    pub zonal: ZonalReport,
    #[serde(skip)]
    pub transform: GeoTransform,
    #[serde(skip)]
    pub pre_nbr: Band,
    #[serde(skip)]
    pub post_nbr: Band,
    #[serde(skip)]
    pub dnbr: Band,
    #[serde(skip)]
    pub classified: ClassifiedRaster,
}

impl SeverityReport {
    /// Records and run metadata as pretty JSON; rasters are left out
    pub fn to_json(&self) -> BurnResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn has_data_gaps(&self) -> bool {
        !self.pre_fire.data_gaps.is_empty() || !self.post_fire.data_gaps.is_empty()
    }
}

struct PreparedEpoch {
    summary: EpochSummary,
    nbr: Band,
    transform: GeoTransform,
}

pub struct BurnSeverityPipeline {
    config: AnalysisConfig,
    profile: Box<dyn SensorProfile>,
}

impl BurnSeverityPipeline {
    pub fn new(config: AnalysisConfig) -> BurnResult<Self> {
        config.validate()?;
        let profile = config.sensor_profile();
        log::info!("Burn severity pipeline for {}", profile.sensor());
        Ok(Self { config, profile })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn profile(&self) -> &dyn SensorProfile {
        self.profile.as_ref()
    }

    pub fn run(
        &self,
        catalog: &dyn ImageCatalog,
        region: &Region,
        reducer: &dyn RegionReducer,
    ) -> BurnResult<SeverityReport> {
        let compositor = TemporalCompositor::new(region.clone())?;
        let engine = BurnIndexEngine::new(self.profile.nbr_bands().clone());

        let pre = self.prepare_epoch(catalog, &compositor, &engine, Epoch::PreFire, &self.config.pre_fire)?;
        let post = self.prepare_epoch(catalog, &compositor, &engine, Epoch::PostFire, &self.config.post_fire)?;

        if !same_grid(&pre.transform, &post.transform) || pre.nbr.dim() != post.nbr.dim() {
            return Err(BurnError::Processing(format!(
                "pre-fire grid {:?} {:?} and post-fire grid {:?} {:?} over region {} cannot be registered",
                pre.transform,
                pre.nbr.dim(),
                post.transform,
                post.nbr.dim(),
                compositor.bounds()
            )));
        }

        let dnbr = engine.dnbr(&pre.nbr, &post.nbr)?;
        let classified = SeverityClassifier::new(self.config.thresholds).classify(&dnbr);

        let zonal = ZonalStatistics::new(reducer, self.config.reduce_params())
            .compute(&classified, &post.transform, region)
            .map_err(|e| match e {
                BurnError::ResourceExceeded { visited, max_pixels, context } => BurnError::ResourceExceeded {
                    visited,
                    max_pixels,
                    context: format!("zonal statistics over {}: {}", compositor.bounds(), context),
                },
                other => other,
            })?;

        log::info!(
            "Classified {} pixels ({:.2} ha)",
            zonal.total_valid,
            zonal.total_hectares()
        );

        Ok(SeverityReport {
            sensor: self.profile.sensor(),
            pre_fire: pre.summary,
            post_fire: post.summary,
            zonal,
            transform: post.transform,
            pre_nbr: pre.nbr,
            post_nbr: post.nbr,
            dnbr,
            classified,
        })
    }

    /// Dissolve the perimeters touching the region, using the configured
    /// window and donor order
    pub fn merge_perimeters(&self, perimeters: &[Perimeter], region: &Region) -> BurnResult<Vec<MergedPerimeter>> {
        let bounds = BoundingBox::of_region(region)
            .ok_or_else(|| BurnError::Configuration("Analysis region is empty".to_string()))?;
        PerimeterMerger::new(
            self.config.perimeter_window.start_utc(),
            self.config.perimeter_window.end_utc(),
        )?
        .with_bounds(bounds)
        .with_donor_order(self.config.donor_order)
        .merge(perimeters)
    }

    fn query_epoch(
        &self,
        catalog: &dyn ImageCatalog,
        compositor: &TemporalCompositor,
        window: &DateWindow,
    ) -> BurnResult<ImageSet> {
        let bounds = compositor.bounds();
        let primary = catalog.query(self.profile.collection_id(), window, bounds)?;

        match (self.profile.cloud_probability_collection(), self.profile.mask_strategy()) {
            (Some(collection), MaskStrategy::CloudProbability(params)) => {
                let clouds = catalog.query(collection, window, bounds)?;
                Ok(join_cloud_probability(&primary, &clouds, &params.probability_band))
            }
            _ => Ok(primary),
        }
    }

    fn prepare_epoch(
        &self,
        catalog: &dyn ImageCatalog,
        compositor: &TemporalCompositor,
        engine: &BurnIndexEngine,
        epoch: Epoch,
        window: &DateWindow,
    ) -> BurnResult<PreparedEpoch> {
        log::info!("Preparing {} epoch {}", epoch, window);

        let scenes = self.query_epoch(catalog, compositor, window)?;
        let scaler = self.profile.scaler()?;
        let masker = QualityMasker::new(self.profile.mask_strategy());

        let mut gaps = BTreeSet::new();
        let mut mask_stats = Vec::with_capacity(scenes.len());

        let prepared = scenes.try_map(|scene| {
            let scaled = scaler.scale(&scene.image);
            gaps.extend(scaled.missing);
            let (masked, report) = masker.apply(&scaled.image)?;
            gaps.extend(report.missing_bands);
            mask_stats.push(report.stats);
            Ok(scene.with_image(masked))
        })?;

        let composite = compositor.composite(&prepared, window, epoch)?;

        let bands = engine.bands();
        for band in [&bands.nir, &bands.swir] {
            if !composite.image.has_band(band) {
                gaps.insert(band.clone());
            }
        }
        let nbr = engine.nbr(&composite.image)?;

        for gap in &gaps {
            log::warn!(
                "{}",
                BurnError::DataGap {
                    band: gap.clone(),
                    context: format!("{} epoch {}", epoch, window),
                }
            );
        }

        Ok(PreparedEpoch {
            summary: EpochSummary {
                epoch,
                window: *window,
                scene_ids: composite.metadata.scene_ids,
                data_gaps: gaps.into_iter().collect(),
                mask_stats,
                region_pixels: composite.metadata.region_pixels,
            },
            nbr,
            transform: composite.image.transform,
        })
    }
}
