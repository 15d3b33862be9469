use std::collections::HashSet;

use proptest::prelude::*;

use stratum::{
    BoreholeCollection, DataTable, DepthInterval, HorizontalReference, Layer, SelectionMode, Value, VerticalReference,
};

/// (x, y, surface, layer thicknesses) per object.
fn objects() -> impl Strategy<Value = Vec<(f64, f64, f64, Vec<f64>)>> {
    prop::collection::vec(
        (
            0.0f64..100.0,
            0.0f64..100.0,
            -5.0f64..5.0,
            prop::collection::vec(0.1f64..3.0, 1..6),
        ),
        1..12,
    )
}

fn collection(objects: &[(f64, f64, f64, Vec<f64>)]) -> BoreholeCollection {
    let mut layers = Vec::new();
    for (i, (x, y, surface, thicknesses)) in objects.iter().enumerate() {
        let end: f64 = thicknesses.iter().sum();
        let mut top = 0.0;
        for (j, thickness) in thicknesses.iter().enumerate() {
            let lith = if j % 2 == 0 { "Z" } else { "K" };
            layers.push(
                Layer::new(format!("obj-{i}"), top, top + thickness)
                    .at(*x, *y, *surface, end)
                    .with("lith", lith),
            );
            top += thickness;
        }
    }
    DataTable::new(layers, VerticalReference::Depth).to_collection(HorizontalReference::RD_NEW)
}

fn header_ids(c: &BoreholeCollection) -> HashSet<String> {
    c.header().ids().map(str::to_string).collect()
}

fn data_ids(c: &BoreholeCollection) -> HashSet<String> {
    c.data().ids().into_iter().map(str::to_string).collect()
}

proptest! {
    /// Property: spatial selections leave header and data on the same ids.
    #[test]
    fn prop_bbox_selection_stays_aligned(
        objects in objects(),
        xmin in 0.0f64..100.0,
        ymin in 0.0f64..100.0,
        width in 0.0f64..100.0,
        invert in any::<bool>(),
    ) {
        let c = collection(&objects);
        let selected = c.select_within_bbox(xmin, xmin + width, ymin, ymin + width, invert);
        prop_assert!(selected.check_header_to_data_alignment().is_ok());
        prop_assert_eq!(header_ids(&selected), data_ids(&selected));

        let inside = objects
            .iter()
            .filter(|(x, y, _, _)| *x >= xmin && *x <= xmin + width && *y >= ymin && *y <= ymin + width)
            .count();
        let expected = if invert { objects.len() - inside } else { inside };
        prop_assert_eq!(selected.n_points(), expected);
    }

    /// Property: depth slices keep alignment and only rows inside the interval.
    #[test]
    fn prop_depth_slice_stays_aligned(
        objects in objects(),
        upper in 0.0f64..10.0,
        span in 0.1f64..10.0,
        keep in any::<bool>(),
    ) {
        let c = collection(&objects);
        let mut interval = DepthInterval::depth(upper, upper + span);
        if keep {
            interval = interval.keep_boundaries();
        }
        let sliced = c.slice_depth_interval(&interval);
        prop_assert!(sliced.check_header_to_data_alignment().is_ok());
        for layer in sliced.data().records() {
            prop_assert!(layer.bottom > upper && layer.top < upper + span);
            if !keep {
                prop_assert!(layer.top >= upper - 1e-9 && layer.bottom <= upper + span + 1e-9);
            }
        }
    }

    /// Property: value and mask selections keep alignment.
    #[test]
    fn prop_value_and_mask_selections_stay_aligned(
        objects in objects(),
        seed in prop::collection::vec(any::<bool>(), 0..64),
        invert in any::<bool>(),
    ) {
        let c = collection(&objects);
        let by_value = c.select_by_values("lith", &[Value::from("K")], SelectionMode::Or).unwrap();
        prop_assert!(by_value.check_header_to_data_alignment().is_ok());
        let with_clay = objects.iter().filter(|(_, _, _, t)| t.len() > 1).count();
        prop_assert_eq!(by_value.n_points(), with_clay);

        let mask: Vec<bool> = (0..c.data().len()).map(|i| seed.get(i).copied().unwrap_or(true)).collect();
        let masked = c.select_by_mask(&mask, invert).unwrap();
        prop_assert!(masked.check_header_to_data_alignment().is_ok());
        let kept = mask.iter().filter(|m| **m != invert).count();
        prop_assert_eq!(masked.data().len(), kept);
    }

    /// Property: converting through any vertical reference and back restores
    /// the values.
    #[test]
    fn prop_vertical_round_trip(
        objects in objects(),
        via in prop::sample::select(VerticalReference::ALL.to_vec()),
    ) {
        let c = collection(&objects);
        let back = c
            .change_vertical_reference(via)
            .change_vertical_reference(VerticalReference::Depth);
        prop_assert_eq!(back.vertical_reference(), VerticalReference::Depth);
        for (a, b) in back.data().records().iter().zip(c.data().records()) {
            prop_assert!((a.top - b.top).abs() < 1e-9);
            prop_assert!((a.bottom - b.bottom).abs() < 1e-9);
            prop_assert!((a.end - b.end).abs() < 1e-9);
        }
        for (a, b) in back.header().records().iter().zip(c.header().records()) {
            prop_assert!((a.end - b.end).abs() < 1e-9);
            prop_assert_eq!(a.surface, b.surface);
        }
    }
}
