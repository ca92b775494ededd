use approx::assert_relative_eq;
use burnsev::core::hotspots::{filter_hotspots, Confidence, Hotspot};
use burnsev::core::perimeter::{DonorOrder, Perimeter, PerimeterMerger, SQ_METERS_PER_ACRE};
use burnsev::{AnalysisConfig, BurnSeverityPipeline, Region};
use chrono::{TimeZone, Utc};
use geo::{polygon, Area, BooleanOps, MultiPolygon, Polygon};
use serde_json::json;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0)]
}

fn county() -> Region {
    MultiPolygon::new(vec![rect(-1000.0, -1000.0, 20_000.0, 2000.0)])
}

fn season_perimeters() -> Vec<Perimeter> {
    vec![
        Perimeter::new("palisades-0108", rect(0.0, 0.0, 2000.0, 1000.0), Utc.with_ymd_and_hms(2025, 1, 8, 6, 0, 0).unwrap())
            .with_attribute("incident", json!("Palisades"))
            .with_attribute("area_acres", json!(12.5)),
        Perimeter::new("palisades-0110", rect(1000.0, 0.0, 3000.0, 1000.0), Utc.with_ymd_and_hms(2025, 1, 10, 6, 0, 0).unwrap())
            .with_attribute("incident", json!("Palisades")),
        Perimeter::new("eaton-0108", rect(10_000.0, 0.0, 11_000.0, 1000.0), Utc.with_ymd_and_hms(2025, 1, 8, 7, 0, 0).unwrap())
            .with_attribute("incident", json!("Eaton")),
        Perimeter::new("franklin-2024", rect(2500.0, 0.0, 4000.0, 1000.0), Utc.with_ymd_and_hms(2024, 12, 10, 0, 0, 0).unwrap())
            .with_attribute("incident", json!("Franklin")),
    ]
}

#[test]
fn test_season_merge_through_pipeline() {
    let _ = env_logger::builder().is_test(true).try_init();

    let pipeline = BurnSeverityPipeline::new(AnalysisConfig::default()).expect("Failed to build pipeline");
    let mut merged = pipeline.merge_perimeters(&season_perimeters(), &county()).expect("Merge failed");
    merged.sort_by(|a, b| a.donor_id.cmp(&b.donor_id));

    // The 2024 perimeter is outside the window and contributes nothing
    assert_eq!(merged.len(), 2);
    let eaton = &merged[0];
    let palisades = &merged[1];
    assert_eq!(eaton.donor_id.as_deref(), Some("eaton-0108"));
    assert_eq!(palisades.donor_id.as_deref(), Some("palisades-0108"));

    assert_relative_eq!(palisades.geometry.unsigned_area(), 3_000_000.0, epsilon = 1e-3);
    assert_relative_eq!(palisades.area, 3_000_000.0 / SQ_METERS_PER_ACRE, epsilon = 1e-6);
    assert_eq!(palisades.attributes["incident"], json!("Palisades"));
    assert_relative_eq!(
        palisades.attributes["area_acres"].as_f64().unwrap(),
        palisades.area,
        epsilon = 1e-9
    );

    let overlap = eaton.geometry.intersection(&palisades.geometry).unsigned_area();
    assert_relative_eq!(overlap, 0.0, epsilon = 1e-9);

    let json = serde_json::to_string(&merged).expect("Failed to serialize perimeters");
    assert!(json.contains("eaton-0108"));
}

#[test]
fn test_custom_area_field() {
    let merger = PerimeterMerger::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    )
    .unwrap()
    .with_area_field("area_ha", 10_000.0)
    .unwrap()
    .with_donor_order(DonorOrder::CatalogOrder);

    let merged = merger.merge(&season_perimeters()).unwrap();
    let palisades = merged
        .iter()
        .find(|m| m.donor_id.as_deref() == Some("palisades-0108"))
        .expect("Palisades perimeter missing");
    assert_relative_eq!(palisades.attributes["area_ha"].as_f64().unwrap(), 300.0, epsilon = 1e-6);
    // The donor's stale acreage is carried over only under its own field name
    assert_eq!(palisades.attributes["area_acres"], json!(12.5));

    assert!(merger.clone().with_area_field("bad", 0.0).is_err());
}

#[test]
fn test_hotspots_inside_merged_perimeters() {
    let pipeline = BurnSeverityPipeline::new(AnalysisConfig::default()).unwrap();
    let merged = pipeline.merge_perimeters(&season_perimeters(), &county()).unwrap();

    // Coordinates share the perimeters' planar system: latitude is y
    let detections = vec![
        Hotspot::new(500.0, 1500.0, Confidence::High),
        Hotspot::new(500.0, 1500.0, Confidence::Low),
        Hotspot::new(500.0, 10_500.0, "n".parse().unwrap()),
        Hotspot::new(500.0, 3500.0, Confidence::High), // only inside the 2024 perimeter
        Hotspot::new(5000.0, 1500.0, Confidence::High),
    ];

    let kept = filter_hotspots(&detections, &merged);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].longitude, 1500.0);
    assert_eq!(kept[1].confidence, Confidence::Nominal);
}

#[test]
fn test_perimeters_outside_region_are_ignored() {
    let pipeline = BurnSeverityPipeline::new(AnalysisConfig::default()).unwrap();
    let west_only = MultiPolygon::new(vec![rect(-1000.0, -1000.0, 5000.0, 2000.0)]);

    let merged = pipeline.merge_perimeters(&season_perimeters(), &west_only).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].donor_id.as_deref(), Some("palisades-0108"));

    let empty = MultiPolygon::new(vec![]);
    assert!(pipeline.merge_perimeters(&season_perimeters(), &empty).is_err());
}
