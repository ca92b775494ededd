//! Burned-area statistics per severity class
//!
//! Counts are requested from a [`RegionReducer`]; this module only decides
//! which masks to count and turns the counts into hectares and percentages.

use rayon::prelude::*;
use serde::Serialize;

use crate::core::severity::{ClassifiedRaster, SeverityClass};
use crate::io::reducer::{ReduceParams, RegionReducer};
use crate::types::{BurnError, BurnResult, GeoTransform, Region, ValidityMask};

const SQ_METERS_PER_HECTARE: f64 = 10_000.0;

/// Area summary of one severity class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalRecord {
    pub class: SeverityClass,
    pub label: String,
    pub pixels: u64,
    pub hectares: f64,
    /// Share of all classified pixels, two decimals. `None` when nothing
    /// in the region was classified.
    pub percentage: Option<f64>,
}

/// `round(part / total * 10000) / 100`, `None` for a zero total
pub fn percentage(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((part as f64 / total as f64 * 10_000.0).round() / 100.0)
}

/// Collects per-class records for one classification run
#[derive(Debug, Clone)]
pub struct ZonalAccumulator {
    total_valid: u64,
    pixel_area_m2: f64,
    records: Vec<ZonalRecord>,
}

impl ZonalAccumulator {
    pub fn new(total_valid: u64, pixel_area_m2: f64) -> Self {
        Self {
            total_valid,
            pixel_area_m2,
            records: Vec::with_capacity(SeverityClass::ALL.len()),
        }
    }

    pub fn push(&mut self, class: SeverityClass, pixels: u64) {
        self.records.push(ZonalRecord {
            class,
            label: class.label().to_string(),
            pixels,
            hectares: pixels as f64 * self.pixel_area_m2 / SQ_METERS_PER_HECTARE,
            percentage: percentage(pixels, self.total_valid),
        });
    }

    /// Records in legend display order, "NA" last
    pub fn finish(mut self) -> ZonalReport {
        self.records.sort_by_key(|r| {
            SeverityClass::DISPLAY_ORDER
                .iter()
                .position(|c| *c == r.class)
                .unwrap_or(usize::MAX)
        });
        ZonalReport {
            total_valid: self.total_valid,
            pixel_area_m2: self.pixel_area_m2,
            records: self.records,
        }
    }
}

/// Finished zonal summary for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalReport {
    pub total_valid: u64,
    pub pixel_area_m2: f64,
    pub records: Vec<ZonalRecord>,
}

impl ZonalReport {
    pub fn record(&self, class: SeverityClass) -> Option<&ZonalRecord> {
        self.records.iter().find(|r| r.class == class)
    }

    pub fn percentage_of(&self, class: SeverityClass) -> BurnResult<f64> {
        if self.total_valid == 0 {
            return Err(BurnError::ZeroArea(format!(
                "no classified pixels in region, percentage of {} is undefined",
                class
            )));
        }
        Ok(self.record(class).and_then(|r| r.percentage).unwrap_or(0.0))
    }

    pub fn total_hectares(&self) -> f64 {
        self.total_valid as f64 * self.pixel_area_m2 / SQ_METERS_PER_HECTARE
    }

    /// Sum of the rounded percentages, `None` when undefined
    pub fn percentage_sum(&self) -> Option<f64> {
        self.records.iter().map(|r| r.percentage).sum()
    }
}

/// Computes per-class counts, areas and percentages over a region
pub struct ZonalStatistics<'a> {
    reducer: &'a dyn RegionReducer,
    params: ReduceParams,
}

impl<'a> ZonalStatistics<'a> {
    pub fn new(reducer: &'a dyn RegionReducer, params: ReduceParams) -> Self {
        Self { reducer, params }
    }

    pub fn compute(
        &self,
        classified: &ClassifiedRaster,
        transform: &GeoTransform,
        region: &Region,
    ) -> BurnResult<ZonalReport> {
        log::info!("Computing zonal statistics at {} m", self.params.scale);

        let any_class = ValidityMask::from_array(classified.mapv(|c| c.is_some()));
        let total_valid = self.reducer.count(&any_class, transform, region, &self.params)?;

        if total_valid == 0 {
            log::warn!("No classified pixels inside the region, percentages are undefined");
        }

        // Classes are independent; count them concurrently
        let counts: Vec<(SeverityClass, u64)> = SeverityClass::ALL
            .par_iter()
            .map(|&class| {
                let selected = ValidityMask::from_array(classified.mapv(|c| c == Some(class)));
                self.reducer
                    .count(&selected, transform, region, &self.params)
                    .map(|n| (class, n))
            })
            .collect::<BurnResult<Vec<_>>>()?;

        let mut acc = ZonalAccumulator::new(total_valid, self.params.pixel_area());
        for (class, pixels) in counts {
            log::debug!("{}: {} pixels", class, pixels);
            acc.push(class, pixels);
        }

        Ok(acc.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reducer::LocalReducer;
    use approx::assert_relative_eq;
    use geo::{polygon, MultiPolygon};
    use ndarray::Array2;

    fn region() -> Region {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 90.0, y: 0.0), (x: 90.0, y: 30.0), (x: 0.0, y: 30.0), (x: 0.0, y: 0.0),
        ]])
    }

    fn classified(values: Vec<Option<SeverityClass>>) -> ClassifiedRaster {
        Array2::from_shape_vec((1, values.len()), values).unwrap()
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), Some(33.33));
        assert_eq!(percentage(2, 3), Some(66.67));
        assert_eq!(percentage(0, 0), None);
    }

    #[test]
    fn test_hectares_and_percentages() {
        use SeverityClass::*;
        let raster = classified(vec![Some(High), Some(High), Some(Unburned)]);
        let transform = GeoTransform::new(0.0, 30.0, 30.0);
        let reducer = LocalReducer;
        let stats = ZonalStatistics::new(&reducer, ReduceParams::new(30.0, 1_000));
        let report = stats.compute(&raster, &transform, &region()).unwrap();

        assert_eq!(report.total_valid, 3);
        let high = report.record(High).unwrap();
        assert_eq!(high.pixels, 2);
        assert_relative_eq!(high.hectares, 0.18);
        assert_eq!(high.percentage, Some(66.67));
        assert_relative_eq!(report.percentage_sum().unwrap(), 100.0, epsilon = 0.02);
        assert_eq!(report.record(Low).unwrap().pixels, 0);
    }

    #[test]
    fn test_records_follow_display_order() {
        let raster = classified(vec![Some(SeverityClass::NotApplicable)]);
        let transform = GeoTransform::new(0.0, 30.0, 30.0);
        let report = ZonalStatistics::new(&LocalReducer, ReduceParams::new(30.0, 1_000))
            .compute(&raster, &transform, &region())
            .unwrap();
        let order: Vec<SeverityClass> = report.records.iter().map(|r| r.class).collect();
        assert_eq!(order, SeverityClass::DISPLAY_ORDER.to_vec());
    }

    #[test]
    fn test_zero_total_is_undefined() {
        let raster = classified(vec![None, None, None]);
        let transform = GeoTransform::new(0.0, 30.0, 30.0);
        let report = ZonalStatistics::new(&LocalReducer, ReduceParams::new(30.0, 1_000))
            .compute(&raster, &transform, &region())
            .unwrap();
        assert_eq!(report.total_valid, 0);
        assert!(report.records.iter().all(|r| r.percentage.is_none()));
        assert!(matches!(
            report.percentage_of(SeverityClass::High),
            Err(BurnError::ZeroArea(_))
        ));
    }
}
