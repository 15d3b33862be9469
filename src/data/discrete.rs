use super::records::{DataRecord, Measurement};
use super::table::{DepthInterval, DepthSlice, DiscreteData};

impl DiscreteData {
    /// Numeric values of `column` for one object, shallow first, paired with
    /// the depth below the surface. Non-numeric cells are skipped.
    pub fn profile(&self, id: &str, column: &str) -> Vec<(f64, f64)> {
        let reference = self.vertical_reference();
        self.object(id)
            .iter()
            .filter_map(|m| {
                m.get(column)
                    .and_then(|v| v.as_f64())
                    .map(|v| (m.sort_depth(reference), v))
            })
            .collect()
    }
}

impl DepthSlice for DiscreteData {
    /// Keep measurements whose depth lies in the interval, bounds inclusive.
    /// Measurements are points, so `update_layer_boundaries` has no effect.
    fn slice_depth_interval(&self, interval: &DepthInterval) -> DiscreteData {
        let reference = self.vertical_reference();
        let records: Vec<Measurement> = self
            .records()
            .iter()
            .filter(|m| {
                let (upper, lower) = interval.in_depth(m.surface);
                let depth = m.sort_depth(reference);
                depth >= upper && depth <= lower
            })
            .cloned()
            .collect();
        log::debug!("depth slice kept {} of {} measurements", records.len(), self.len());
        DiscreteData::from_sorted(records, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::VerticalReference;

    fn cpt() -> DiscreteData {
        let rows = (0..10)
            .map(|i| {
                Measurement::new("CPT-1", i as f64 * 0.5)
                    .at(0.0, 0.0, -1.0, 4.5)
                    .with("qc", i as f64)
            })
            .collect();
        DiscreteData::new(rows, VerticalReference::Depth)
    }

    #[test]
    fn inclusive_bounds() {
        let sliced = cpt().slice_depth_interval(&DepthInterval::depth(1.0, 2.0));
        let depths: Vec<f64> = sliced.records().iter().map(|m| m.depth).collect();
        assert_eq!(depths, vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn datum_interval_on_depth_table() {
        // Surface at -1: datum -2 is 1 m deep, datum -3 is 2 m deep.
        let sliced = cpt().slice_depth_interval(&DepthInterval::datum(-2.0, -3.0));
        assert_eq!(sliced.len(), 3);
    }

    #[test]
    fn profile_pairs_depth_and_value() {
        let profile = cpt().profile("CPT-1", "qc");
        assert_eq!(profile.len(), 10);
        assert_eq!(profile[2], (1.0, 2.0));
        assert!(cpt().profile("missing", "qc").is_empty());
    }
}
