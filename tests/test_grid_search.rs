use approx::assert_abs_diff_eq;
use ndarray::Array2;
use stormgeo::core::grid_index::{
    nearest_index_binary, nearest_index_linear, DistanceMetric, GridIndex, GridIndexParams, SearchStrategy,
};
use stormgeo::types::{GeoPoint, Grid, StormError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Regular 0.5 degree grid over the western Atlantic, longitudes offset by `lon_shift`
fn atlantic_grid(lon_shift: f64) -> Grid {
    let lons: Vec<f64> = (0..25).map(|k| -70.0 + 0.5 * k as f64 + lon_shift).collect();
    let lats: Vec<f64> = (0..19).map(|k| 12.0 + 0.5 * k as f64).collect();
    Grid::from_axes(&lons, &lats).expect("valid grid")
}

/// 9x9 one-degree grid whose last node is folded back next to the first
fn folded_grid() -> Grid {
    let mut lon = Array2::from_shape_fn((9, 9), |(_, j)| j as f64);
    let mut lat = Array2::from_shape_fn((9, 9), |(i, _)| i as f64);
    lon[[8, 8]] = 0.1;
    lat[[8, 8]] = 0.1;
    Grid::new(lon, lat).expect("valid grid")
}

#[test]
fn test_exact_and_fast_agree_on_regular_grid() {
    init_logging();
    let grid = atlantic_grid(0.0);
    let (rows, cols) = grid.dim();
    let mut checked = 0;
    for i in 0..rows {
        for j in 0..cols {
            let node = grid.node(i, j);
            assert_eq!(nearest_index_linear(&grid, node), (i, j));
            let (bi, bj, dist) = nearest_index_binary(&grid, node);
            assert_eq!((bi, bj), (i, j));
            assert_eq!(dist, 0.0);

            if i + 1 < rows && j + 1 < cols {
                let query = GeoPoint::new(node.lon + 0.1, node.lat + 0.15);
                let (li, lj) = nearest_index_linear(&grid, query);
                let (bi, bj, _) = nearest_index_binary(&grid, query);
                assert_eq!((li, lj), (i, j));
                assert_eq!((bi, bj), (li, lj), "query {}", query);
                checked += 1;
            }
        }
    }
    println!("Exact and fast search agree on {} off-node queries", checked);
}

#[test]
fn test_fast_search_misses_folded_node() {
    init_logging();
    let grid = folded_grid();
    let query = GeoPoint::new(0.1, 0.1);

    // the true nearest node is the folded corner, at distance zero
    let exact = GridIndex::new(&grid).nearest_linear(query);
    assert_eq!((exact.i, exact.j), (8, 8));
    assert_eq!(exact.distance_km, 0.0);

    // quadrant bisection never looks at that corner again after the first
    // halving and settles on the local minimum at the origin
    let fast = GridIndex::new(&grid).nearest_binary(query);
    assert_eq!((fast.i, fast.j), (0, 0));
    assert!(fast.distance_km > 10.0);

    let validated = GridIndex::new(&grid).nearest_validated(query);
    assert_eq!(validated, exact);
}

#[test]
fn test_strategy_selection() {
    let grid = folded_grid();
    let query = GeoPoint::new(0.1, 0.1);
    let fast = GridIndex::with_params(
        &grid,
        GridIndexParams {
            strategy: SearchStrategy::Fast,
            ..Default::default()
        },
    );
    assert_eq!(fast.params().strategy, SearchStrategy::Fast);
    assert_eq!((fast.nearest(query).i, fast.nearest(query).j), (0, 0));
    assert_eq!((GridIndex::new(&grid).nearest(query).i, GridIndex::new(&grid).nearest(query).j), (8, 8));
}

#[test]
fn test_query_outside_envelope_returns_boundary_node() {
    let grid = atlantic_grid(0.0);
    let index = GridIndex::new(&grid);

    let west = index.nearest(GeoPoint::new(-75.0, 16.0));
    assert_eq!((west.i, west.j), (8, 0));
    assert!(west.distance_km > 500.0);

    let north_east = index.nearest(GeoPoint::new(-40.0, 40.0));
    assert_eq!((north_east.i, north_east.j), (18, 24));
}

#[test]
fn test_longitude_convention_tolerated() {
    let signed = atlantic_grid(0.0);
    let positive = atlantic_grid(360.0);
    let query = GeoPoint::new(-63.2, 17.6);

    let expected = nearest_index_linear(&signed, query);
    assert_eq!(expected, (11, 14));
    assert_eq!(nearest_index_linear(&positive, query), expected);

    let planar = GridIndex::with_params(
        &positive,
        GridIndexParams {
            metric: DistanceMetric::PlanarDegrees,
            ..Default::default()
        },
    );
    let node = planar.nearest(query);
    assert_eq!((node.i, node.j), expected);
    // the reported distance is always great-circle km
    let reference = GridIndex::new(&signed).nearest(query);
    assert_abs_diff_eq!(node.distance_km, reference.distance_km, epsilon = 1e-9);
}

#[test]
fn test_batched_queries() {
    init_logging();
    let grid = atlantic_grid(0.0);
    let index = GridIndex::new(&grid);
    let lons = [-69.9, -60.1, f64::NAN, -58.4];
    let lats = [12.1, 20.4, 15.0, 13.2];

    let batch = index.nearest_batch_lonlat(&lons, &lats).expect("batch");
    assert_eq!(batch.len(), 4);
    for k in 0..4 {
        let single = index.nearest(GeoPoint::new(lons[k], lats[k]));
        assert_eq!((batch.i[k], batch.j[k]), (single.i, single.j));
    }
    assert_eq!((batch.i[1], batch.j[1]), (17, 20));
    assert!(batch.distance_km[2].is_nan());
    assert!(!index.nearest(GeoPoint::new(f64::NAN, 15.0)).is_valid());

    assert!(matches!(
        index.nearest_batch_lonlat(&lons, &lats[..3]),
        Err(StormError::ShapeMismatch(_))
    ));
}

#[test]
fn test_batched_fast_queries_match_single_queries() {
    init_logging();
    let grid = atlantic_grid(0.0);
    let index = GridIndex::with_params(
        &grid,
        GridIndexParams {
            strategy: SearchStrategy::Fast,
            ..Default::default()
        },
    );
    let lons = [-69.9, -59.9, -58.4, -65.0];
    let lats = [12.15, 20.15, 13.15, 17.0];

    let batch = index.nearest_batch_lonlat(&lons, &lats).expect("batch");
    for k in 0..lons.len() {
        let single = index.nearest(GeoPoint::new(lons[k], lats[k]));
        assert_eq!((batch.i[k], batch.j[k]), (single.i, single.j));
        assert_eq!(batch.distance_km[k], single.distance_km);
    }
    // regular grid, so the heuristic lands on the exact answers
    assert_eq!(batch.i, vec![0, 16, 2, 10]);
    assert_eq!(batch.j, vec![0, 20, 23, 10]);
    assert_eq!(batch.distance_km[3], 0.0);
}
