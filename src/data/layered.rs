use super::records::Layer;
use super::table::{DepthInterval, DepthSlice, LayeredData};
use crate::reference::{convert_vertical, VerticalReference};

impl Layer {
    /// Top and bottom as depth below the surface, shallow first.
    pub fn depth_range(&self, reference: VerticalReference) -> (f64, f64) {
        let top = convert_vertical(self.top, self.surface, reference, VerticalReference::Depth);
        let bottom = convert_vertical(self.bottom, self.surface, reference, VerticalReference::Depth);
        (top.min(bottom), top.max(bottom))
    }

    /// Copy of the layer with the given depth range written back in
    /// `reference`.
    fn with_depth_range(&self, top_depth: f64, bottom_depth: f64, reference: VerticalReference) -> Layer {
        let mut layer = self.clone();
        layer.top = convert_vertical(top_depth, self.surface, VerticalReference::Depth, reference);
        layer.bottom = convert_vertical(bottom_depth, self.surface, VerticalReference::Depth, reference);
        layer
    }
}

impl DepthSlice for LayeredData {
    /// Keep layers overlapping the interval. With `update_layer_boundaries`
    /// a straddling layer is cut at the interval bounds; otherwise it keeps
    /// its original boundaries. Layers only touching a bound are dropped.
    fn slice_depth_interval(&self, interval: &DepthInterval) -> LayeredData {
        let reference = self.vertical_reference();
        let records: Vec<Layer> = self
            .records()
            .iter()
            .filter_map(|layer| {
                let (upper, lower) = interval.in_depth(layer.surface);
                let (top, bottom) = layer.depth_range(reference);
                if bottom <= upper || top >= lower {
                    return None;
                }
                if interval.update_layer_boundaries {
                    Some(layer.with_depth_range(top.max(upper), bottom.min(lower), reference))
                } else {
                    Some(layer.clone())
                }
            })
            .collect();
        log::debug!(
            "depth slice kept {} of {} layers",
            records.len(),
            self.len()
        );
        LayeredData::from_sorted(records, reference)
    }
}
