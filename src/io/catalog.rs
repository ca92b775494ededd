use std::collections::HashMap;

use crate::types::{BoundingBox, BurnResult, DateWindow, ImageSet, Scene};

/// Source of scene collections
pub trait ImageCatalog: Send + Sync {
    /// Scenes of `collection` acquired in `[window.start, window.end)` whose
    /// footprint intersects `bounds`
    fn query(&self, collection: &str, window: &DateWindow, bounds: &BoundingBox) -> BurnResult<ImageSet>;
}

/// Catalog held entirely in memory, keyed by collection id
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    collections: HashMap<String, Vec<Scene>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: impl Into<String>, scene: Scene) {
        self.collections.entry(collection.into()).or_default().push(scene);
    }

    pub fn with_scenes(mut self, collection: impl Into<String>, scenes: Vec<Scene>) -> Self {
        self.collections.entry(collection.into()).or_default().extend(scenes);
        self
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }
}

impl ImageCatalog for InMemoryCatalog {
    fn query(&self, collection: &str, window: &DateWindow, bounds: &BoundingBox) -> BurnResult<ImageSet> {
        let scenes = match self.collections.get(collection) {
            Some(scenes) => scenes.clone(),
            None => {
                log::warn!("Collection {} is not in the catalog", collection);
                Vec::new()
            }
        };

        let set = ImageSet::new(scenes).filter_date(window).filter_bounds(bounds);
        log::debug!("Catalog query {} {} returned {} scenes", collection, window, set.len());
        Ok(set)
    }
}

/// Attach the auxiliary `band` to each primary scene sharing its scene id.
///
/// The first auxiliary scene with a matching id wins. Primary scenes without
/// a match, or whose match is on another grid, are kept without the band and
/// their mask check degrades downstream.
pub fn join_cloud_probability(primary: &ImageSet, clouds: &ImageSet, band: &str) -> ImageSet {
    let mut by_id: HashMap<&str, &Scene> = HashMap::new();
    for scene in clouds.iter() {
        by_id.entry(scene.id.as_str()).or_insert(scene);
    }

    let mut unmatched = 0usize;
    let joined = primary
        .iter()
        .map(|scene| {
            let probability = by_id
                .get(scene.id.as_str())
                .and_then(|aux| aux.image.band(band));
            match probability {
                Some(p) => match scene.image.clone().with_band(band, p.clone()) {
                    Ok(image) => scene.with_image(image),
                    Err(e) => {
                        log::warn!("Cannot join {} into scene {}: {}", band, scene.id, e);
                        unmatched += 1;
                        scene.clone()
                    }
                },
                None => {
                    unmatched += 1;
                    scene.clone()
                }
            }
        })
        .collect();

    if unmatched > 0 {
        log::warn!("{} of {} scenes have no {} band", unmatched, primary.len(), band);
    }
    ImageSet::new(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, RasterImage};
    use chrono::{NaiveDate, TimeZone, Utc};
    use ndarray::Array2;

    fn scene(id: &str, band: &str, value: f32, day: u32) -> Scene {
        let image = RasterImage::new(GeoTransform::new(0.0, 20.0, 10.0), None)
            .with_band(band, Array2::from_elem((2, 2), value))
            .unwrap();
        Scene::new(id, Utc.with_ymd_and_hms(2025, 1, day, 18, 30, 0).unwrap(), image)
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
        )
    }

    #[test]
    fn test_query_filters_window_and_bounds() {
        let catalog = InMemoryCatalog::new().with_scenes(
            "S2",
            vec![scene("in", "B8", 0.3, 9), scene("late", "B8", 0.3, 20)],
        );
        let set = catalog
            .query("S2", &window(), &BoundingBox::new(5.0, 5.0, 15.0, 15.0))
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.scenes()[0].id, "in");

        let far = catalog
            .query("S2", &window(), &BoundingBox::new(500.0, 500.0, 600.0, 600.0))
            .unwrap();
        assert!(far.is_empty());
        assert!(catalog.query("missing", &window(), &BoundingBox::new(0.0, 0.0, 1.0, 1.0)).unwrap().is_empty());
    }

    #[test]
    fn test_join_by_scene_id_first_match_wins() {
        let primary = ImageSet::new(vec![scene("x", "B8", 0.3, 9), scene("y", "B8", 0.3, 10)]);
        let clouds = ImageSet::new(vec![
            scene("x", "probability", 10.0, 9),
            scene("x", "probability", 90.0, 9),
        ]);
        let joined = join_cloud_probability(&primary, &clouds, "probability");

        let x = &joined.scenes()[0];
        assert_eq!(x.image.band("probability").unwrap()[[0, 0]], 10.0);
        assert!(x.image.has_band("B8"));
        assert!(!joined.scenes()[1].image.has_band("probability"));
    }
}
