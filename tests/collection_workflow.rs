use std::collections::HashSet;

use geo::{line_string, polygon, Point};

use stratum::data::value::values;
use stratum::{
    BoreholeCollection, DataTable, DepthInterval, HeaderRecord, HorizontalReference, Layer, PointHeader,
    PolygonPredicate, PolygonSet, SelectionMode, StratumError, Value, VerticalReference,
};

const LITH: [&str; 8] = ["Z", "K", "Z", "L", "K", "Z", "V", "G"];

/// 13 boreholes, 8 of them inside x 128600–130000, y 504000–505000.
const LOCATIONS: [(f64, f64); 13] = [
    (128_700.0, 504_100.0),
    (128_900.0, 504_300.0),
    (129_100.0, 504_500.0),
    (129_300.0, 504_700.0),
    (129_500.0, 504_900.0),
    (129_700.0, 504_200.0),
    (129_900.0, 504_800.0),
    (129_000.0, 504_600.0),
    (128_500.0, 504_500.0),
    (130_100.0, 504_500.0),
    (129_000.0, 503_900.0),
    (129_000.0, 505_100.0),
    (127_000.0, 506_000.0),
];

const SURFACES: [f64; 4] = [0.5, 1.25, -0.75, 2.0];

fn id(i: usize) -> String {
    format!("B{:02}", i + 1)
}

/// Object `i` has `6 + i % 3` layers of 0.5 m; only objects with at least
/// seven layers contain peat (`V`).
fn boreholes() -> BoreholeCollection {
    let mut header = Vec::new();
    let mut layers = Vec::new();
    for (i, &(x, y)) in LOCATIONS.iter().enumerate() {
        let n_layers = 6 + i % 3;
        let surface = SURFACES[i % SURFACES.len()];
        let end = n_layers as f64 * 0.5;
        header.push(HeaderRecord::new(id(i), x, y, surface, end).with("source", "synthetic"));
        for (j, lith) in LITH.iter().take(n_layers).enumerate() {
            let top = j as f64 * 0.5;
            layers.push(Layer::new(id(i), top, top + 0.5).at(x, y, surface, end).with("lith", *lith));
        }
    }
    let header = PointHeader::new(header, HorizontalReference::RD_NEW, VerticalReference::Depth).unwrap();
    let data = DataTable::new(layers, VerticalReference::Depth);
    BoreholeCollection::new(header, data).unwrap()
}

fn header_ids(collection: &BoreholeCollection) -> HashSet<String> {
    collection.header().ids().map(str::to_string).collect()
}

fn data_ids(collection: &BoreholeCollection) -> HashSet<String> {
    collection.data().ids().into_iter().map(str::to_string).collect()
}

#[test]
fn fixture_shape() {
    let collection = boreholes();
    assert_eq!(collection.n_points(), 13);
    assert_eq!(collection.data().len(), 90);
    assert!(collection.check_header_to_data_alignment().is_ok());
}

#[test]
fn bbox_selection_keeps_header_and_data_aligned() {
    let collection = boreholes();
    let selected = collection.select_within_bbox(128_600.0, 130_000.0, 504_000.0, 505_000.0, false);

    let expected: HashSet<String> = (0..8).map(id).collect();
    assert_eq!(selected.n_points(), 8);
    assert_eq!(header_ids(&selected), expected);
    assert_eq!(data_ids(&selected), expected);

    let expected_rows: usize = (0..8).map(|i| 6 + i % 3).sum();
    assert_eq!(selected.data().len(), expected_rows);

    let outside = collection.select_within_bbox(128_600.0, 130_000.0, 504_000.0, 505_000.0, true);
    assert_eq!(outside.n_points(), 5);
    assert_eq!(data_ids(&outside), header_ids(&outside));
}

#[test]
fn polygon_selection_matches_bbox_and_labels_areas() {
    let collection = boreholes();
    let area = polygon![
        (x: 128_600.0, y: 504_000.0),
        (x: 130_000.0, y: 504_000.0),
        (x: 130_000.0, y: 505_000.0),
        (x: 128_600.0, y: 505_000.0),
    ];
    let set = PolygonSet::from_polygons(vec![area])
        .with_crs(HorizontalReference::RD_NEW)
        .with_labels("area", values(["polder"]))
        .unwrap();

    let selected = collection
        .select_within_polygons(&set, 0.0, PolygonPredicate::Within, false)
        .unwrap();
    let bbox = collection.select_within_bbox(128_600.0, 130_000.0, 504_000.0, 505_000.0, false);
    assert_eq!(header_ids(&selected), header_ids(&bbox));

    let labels = collection.get_area_labels(&set, "area").unwrap();
    let labelled: Vec<_> = labels.iter().filter(|(_, v)| !v.is_null()).collect();
    assert_eq!(labelled.len(), 8);
    assert!(labelled.iter().all(|(_, v)| *v == Value::from("polder")));
}

#[test]
fn point_and_line_buffers_select_nearby_objects() {
    let collection = boreholes();
    let near = collection.select_with_points(&[Point::new(128_700.0, 504_150.0)], 100.0, false);
    assert_eq!(header_ids(&near), HashSet::from([id(0)]));

    let line = geo::line_string![(x: 127_000.0, y: 504_500.0), (x: 131_000.0, y: 504_500.0)];
    let along = collection.select_with_lines(&[line], 1.0, false);
    assert_eq!(
        header_ids(&along),
        HashSet::from([id(2), id(8), id(9)])
    );
}

#[test]
fn value_selection_keeps_whole_objects() {
    let collection = boreholes();
    let with_peat = collection
        .select_by_values("lith", &values(["V"]), SelectionMode::Or)
        .unwrap();
    let expected: HashSet<String> = (0..13).filter(|i| i % 3 != 0).map(id).collect();
    assert_eq!(header_ids(&with_peat), expected);
    assert_eq!(data_ids(&with_peat), expected);
    assert_eq!(with_peat.data().object(&id(1)).len(), 7);

    let all_of = collection
        .select_by_values("lith", &values(["V", "G"]), SelectionMode::And)
        .unwrap();
    let expected: HashSet<String> = (0..13).filter(|i| i % 3 == 2).map(id).collect();
    assert_eq!(header_ids(&all_of), expected);

    let err = collection
        .select_by_values("colour", &values(["grey"]), SelectionMode::Or)
        .unwrap_err();
    assert!(matches!(err, StratumError::UnknownColumn(_)));
}

#[test]
fn slicing_values_and_depth_intervals() {
    let collection = boreholes();

    let no_sand = collection.slice_by_values("lith", &values(["Z"]), true).unwrap();
    assert!(no_sand
        .data()
        .records()
        .iter()
        .all(|l| l.attributes["lith"] != Value::from("Z")));
    assert_eq!(no_sand.n_points(), 13);

    let sliced = collection.slice_depth_interval(&DepthInterval::depth(1.0, 2.0));
    assert_eq!(sliced.n_points(), 13);
    assert_eq!(sliced.data().len(), 26);
    assert!(sliced.data().records().iter().all(|l| l.top >= 1.0 && l.bottom <= 2.0));

    let below_everything = collection.slice_depth_interval(&DepthInterval::depth(10.0, 20.0));
    assert!(below_everything.is_empty());
    assert!(below_everything.data().is_empty());
}

#[test]
fn cumulative_thickness_and_layer_top_become_header_columns() {
    let collection = boreholes();
    let with_columns = collection
        .with_cumulative_layer_thickness("lith", &values(["Z", "V"]))
        .unwrap()
        .with_layer_top("lith", &values(["V"]), 0.0, 0.0)
        .unwrap();

    let header = with_columns.header();
    assert!(header.column("Z_thickness").unwrap().iter().all(|v| *v == Value::Float(1.5)));

    let peat = header.column("V_thickness").unwrap();
    let peat_top = header.column("V_top").unwrap();
    for (i, (thickness, top)) in peat.iter().zip(&peat_top).enumerate() {
        if i % 3 == 0 {
            assert_eq!(*thickness, Value::Float(0.0));
            assert!(top.is_null());
        } else {
            assert_eq!(*thickness, Value::Float(0.5));
            assert_eq!(*top, Value::Float(3.0));
        }
    }
    assert_eq!(with_columns.data(), collection.data());
}

#[test]
fn header_columns_broadcast_to_data() {
    let collection = boreholes().add_header_column_to_data("source").unwrap();
    assert!(collection
        .data()
        .records()
        .iter()
        .all(|l| l.attributes["source"] == Value::from("synthetic")));
}

#[test]
fn vertical_reference_round_trip_is_exact() {
    let collection = boreholes();
    let datum = collection.change_vertical_reference(VerticalReference::Datum);
    assert_eq!(datum.vertical_reference(), VerticalReference::Datum);
    assert_eq!(datum.header().vertical_reference(), VerticalReference::Datum);

    let first = &datum.data().records()[0];
    assert_eq!(first.top, first.surface);

    let back = datum
        .change_vertical_reference(VerticalReference::SurfaceLevel)
        .change_vertical_reference(VerticalReference::Depth);
    assert_eq!(back.data(), collection.data());
    assert_eq!(back.header(), collection.header());
}

#[test]
fn horizontal_reprojection_round_trip() {
    let collection = boreholes();
    let wgs84 = collection
        .change_horizontal_reference(HorizontalReference::WGS84, false)
        .unwrap();
    let first = &wgs84.header().records()[0];
    assert!((4.0..7.0).contains(&first.x), "longitude {}", first.x);
    assert!((52.0..54.0).contains(&first.y), "latitude {}", first.y);
    assert_eq!(wgs84.data().records()[0].x, first.x);

    let back = wgs84
        .change_horizontal_reference(HorizontalReference::RD_NEW, false)
        .unwrap();
    for (a, b) in back.header().records().iter().zip(collection.header().records()) {
        assert!((a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3);
    }
}

#[test]
fn lookups_by_id_and_column() {
    let collection = boreholes();
    let two = collection.get([id(0), id(12)]).unwrap();
    assert_eq!(two.n_points(), 2);
    assert!(matches!(collection.get(["nope"]), Err(StratumError::KeyNotFound(_))));

    let none = collection.get_by("source", &values(["real"])).unwrap();
    assert!(none.is_empty());
}

#[test]
fn reset_header_rebuilds_from_data() {
    let collection = boreholes();
    let reset = collection.reset_header().unwrap();
    assert_eq!(header_ids(&reset), header_ids(&collection));
    assert_eq!(reset.header().records()[0].end, collection.header().records()[0].end);
}
