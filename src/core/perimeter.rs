//! Fire perimeter dissolve
//!
//! Overlapping perimeter polygons from the same season are dissolved into
//! disjoint merged perimeters. Each merged polygon borrows the attributes of
//! one source perimeter (the donor) and gets a freshly computed area.

use chrono::{DateTime, Utc};
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{BoundingBox, BurnError, BurnResult};

/// Square meters per acre
pub const SQ_METERS_PER_ACRE: f64 = 4046.86;

/// One source fire perimeter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perimeter {
    pub id: String,
    pub geometry: Polygon<f64>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Perimeter {
    pub fn new(id: impl Into<String>, geometry: Polygon<f64>, created: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            geometry,
            created,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A dissolved, disjoint perimeter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedPerimeter {
    pub geometry: Polygon<f64>,
    /// Source perimeter whose attributes were borrowed
    pub donor_id: Option<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Area in the merger's configured unit
    pub area: f64,
}

/// How kept perimeters are ordered before the donor is picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorOrder {
    /// Lexicographic by perimeter id
    #[default]
    ById,
    /// As supplied by the caller
    CatalogOrder,
}

#[derive(Debug, Clone)]
pub struct PerimeterMerger {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bounds: Option<BoundingBox>,
    area_field: String,
    sq_meters_per_unit: f64,
    donor_order: DonorOrder,
}

impl PerimeterMerger {
    /// Merger over creation times in `[start, end)`, area in acres
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> BurnResult<Self> {
        if start >= end {
            return Err(BurnError::Configuration(format!(
                "Perimeter window is empty: [{}, {})",
                start, end
            )));
        }
        Ok(Self {
            start,
            end,
            bounds: None,
            area_field: "area_acres".to_string(),
            sq_meters_per_unit: SQ_METERS_PER_ACRE,
            donor_order: DonorOrder::default(),
        })
    }

    /// Only keep perimeters whose envelope touches these bounds
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_area_field(mut self, field: impl Into<String>, sq_meters_per_unit: f64) -> BurnResult<Self> {
        if !(sq_meters_per_unit.is_finite() && sq_meters_per_unit > 0.0) {
            return Err(BurnError::Configuration(format!(
                "Area unit must be a positive number of square meters, got {}",
                sq_meters_per_unit
            )));
        }
        self.area_field = field.into();
        self.sq_meters_per_unit = sq_meters_per_unit;
        Ok(self)
    }

    pub fn with_donor_order(mut self, order: DonorOrder) -> Self {
        self.donor_order = order;
        self
    }

    pub fn area_field(&self) -> &str {
        &self.area_field
    }

    fn keeps(&self, perimeter: &Perimeter) -> bool {
        if perimeter.created < self.start || perimeter.created >= self.end {
            return false;
        }
        match (&self.bounds, perimeter.geometry.bounding_rect()) {
            (Some(bounds), Some(rect)) => bounds.intersects(&BoundingBox::new(
                rect.min().x,
                rect.min().y,
                rect.max().x,
                rect.max().y,
            )),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// Dissolve the in-window perimeters into disjoint polygons
    pub fn merge(&self, perimeters: &[Perimeter]) -> BurnResult<Vec<MergedPerimeter>> {
        let mut kept: Vec<&Perimeter> = perimeters.iter().filter(|p| self.keeps(p)).collect();
        if self.donor_order == DonorOrder::ById {
            kept.sort_by(|a, b| a.id.cmp(&b.id));
        }

        log::info!(
            "Merging {} of {} perimeters created in [{}, {})",
            kept.len(),
            perimeters.len(),
            self.start,
            self.end
        );

        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let dissolved = dissolve(kept.iter().map(|p| &p.geometry))?;
        log::debug!("Dissolved into {} polygons", dissolved.0.len());

        let merged = dissolved
            .into_iter()
            .map(|polygon| self.assign_attributes(polygon, &kept))
            .collect();
        Ok(merged)
    }

    fn assign_attributes(&self, polygon: Polygon<f64>, kept: &[&Perimeter]) -> MergedPerimeter {
        let donor = kept.iter().find(|p| p.geometry.intersects(&polygon));

        let mut attributes = match donor {
            Some(p) => p.attributes.clone(),
            None => {
                log::warn!("Merged perimeter has no intersecting source, attributes left empty");
                BTreeMap::new()
            }
        };

        attributes.remove(&self.area_field);
        let area = polygon.unsigned_area() / self.sq_meters_per_unit;
        attributes.insert(self.area_field.clone(), serde_json::json!(area));

        MergedPerimeter {
            geometry: polygon,
            donor_id: donor.map(|p| p.id.clone()),
            attributes,
            area,
        }
    }
}

/// Union of all polygons as a set of disjoint polygons
pub fn dissolve<'a, I>(polygons: I) -> BurnResult<MultiPolygon<f64>>
where
    I: IntoIterator<Item = &'a Polygon<f64>>,
{
    let mut iter = polygons.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| BurnError::Geometry("Cannot dissolve an empty set of polygons".to_string()))?;

    let union = iter.fold(MultiPolygon::new(vec![first.clone()]), |acc, p| {
        acc.union(&MultiPolygon::new(vec![p.clone()]))
    });
    Ok(union)
}
