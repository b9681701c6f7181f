use stormgeo::core::footprint::FootprintParams;
use stormgeo::core::geodesy::{Sphere, MEAN_EARTH_RADIUS_KM, OCEAN_PRODUCT_RADIUS_KM};
use stormgeo::core::grid_index::{DistanceMetric, GridIndexParams, SearchStrategy};
use stormgeo::core::polar::{PolarMesh, PolarParams};
use stormgeo::core::track::Track;
use stormgeo::types::{GeoPoint, LonConvention};

#[test]
fn test_partial_configs_fall_back_to_defaults() {
    let footprint: FootprintParams = serde_json::from_str(r#"{"radius_km": 350.0}"#).expect("footprint params");
    assert_eq!(footprint.radius_km, 350.0);
    assert_eq!(footprint.convention, LonConvention::Signed180);
    assert_eq!(footprint.sphere.radius_km, MEAN_EARTH_RADIUS_KM);

    let polar: PolarParams = serde_json::from_str(r#"{"azimuth_steps": 36}"#).expect("polar params");
    assert_eq!(polar.azimuth_steps, 36);
    assert_eq!(polar.max_radius_km, 400.0);
    assert_eq!(polar.km_per_degree, 111.1);
    assert_eq!(polar.min_valid_corners, 3);

    let search: GridIndexParams = serde_json::from_str("{}").expect("search params");
    assert_eq!(search.strategy, SearchStrategy::Exact);
    assert_eq!(search.metric, DistanceMetric::Haversine);
}

#[test]
fn test_ocean_product_config() {
    let json = r#"{
        "radius_km": 500.0,
        "convention": {"WrapFrom": 74.16},
        "sphere": {"radius_km": 6378.1}
    }"#;
    let params: FootprintParams = serde_json::from_str(json).expect("ocean footprint params");
    assert_eq!(params.convention, LonConvention::WrapFrom(74.16));
    assert_eq!(params.sphere, Sphere::new(OCEAN_PRODUCT_RADIUS_KM));

    let search: GridIndexParams =
        serde_json::from_str(r#"{"strategy": "Fast", "metric": "PlanarDegrees"}"#).expect("search params");
    assert_eq!(search.strategy, SearchStrategy::Fast);
    assert_eq!(search.metric, DistanceMetric::PlanarDegrees);
}

#[test]
fn test_configured_mesh_is_validated() {
    let polar: PolarParams = serde_json::from_str(r#"{"azimuth_steps": 0}"#).expect("polar params");
    assert!(PolarMesh::new(&polar).is_err());
}

#[test]
fn test_track_serializes() {
    let track = Track::from_records(vec![(0, -60.0, 20.0), (6, -60.5, 20.4)]);
    let json = serde_json::to_string(&track).expect("serialize track");
    let back: Track = serde_json::from_str(&json).expect("deserialize track");
    assert_eq!(back.fixes(), track.fixes());
    assert_eq!(back.init_time(), None);
}

#[test]
fn test_track_config_must_be_in_time_order() {
    let unordered = r#"{"fixes": [
        {"forecast_hour": 12, "center": {"lon": -61.0, "lat": 21.0}},
        {"forecast_hour": 0, "center": {"lon": -60.0, "lat": 20.0}},
        {"forecast_hour": 6, "center": {"lon": -60.5, "lat": 20.5}}
    ]}"#;
    let result: Result<Track, _> = serde_json::from_str(unordered);
    let err = result.expect_err("unordered track must be rejected");
    println!("Rejected track config: {}", err);
    assert!(err.to_string().contains("strictly ascending"));

    let ordered = r#"{"init_time": "2024-09-25T12:00:00Z", "fixes": [
        {"forecast_hour": 0, "center": {"lon": -60.0, "lat": 20.0}},
        {"forecast_hour": 6, "center": {"lon": -60.5, "lat": 20.5}},
        {"forecast_hour": 12, "center": {"lon": -61.0, "lat": 21.0}}
    ]}"#;
    let track: Track = serde_json::from_str(ordered).expect("ordered track");
    assert_eq!(track.forecast_hours(), vec![0, 6, 12]);
    assert_eq!(track.center_at(12), Some(GeoPoint::new(-61.0, 21.0)));
    assert!(track.init_time().is_some());
}
