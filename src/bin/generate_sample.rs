//! Write a synthetic borehole collection as `sample_header.parquet` and
//! `sample_data.parquet` (EPSG:28992, depth below surface).
//!
//! Usage: `generate_sample [N_BOREHOLES] [SEED]`

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use stratum::io::convert::reference_metadata;
use stratum::{HorizontalReference, VerticalReference};

/// Lithology codes with their relative weight and mean thickness (m).
const LITHOLOGIES: &[(&str, f64, f64)] = &[
    ("Z", 0.40, 1.6), // sand
    ("K", 0.30, 0.9), // clay
    ("L", 0.15, 0.7), // loam
    ("V", 0.10, 0.5), // peat
    ("G", 0.05, 1.2), // gravel
];

fn gauss(rng: &mut impl Rng, mean: f64, std_dev: f64) -> Result<f64> {
    let normal = Normal::new(mean, std_dev).with_context(|| format!("normal({mean}, {std_dev})"))?;
    Ok(normal.sample(rng))
}

fn pick_lithology(rng: &mut impl Rng) -> (&'static str, f64) {
    let mut r: f64 = rng.gen();
    for &(code, weight, thickness) in LITHOLOGIES {
        if r < weight {
            return (code, thickness);
        }
        r -= weight;
    }
    ("Z", 1.6)
}

#[derive(Default)]
struct Columns {
    id: Vec<String>,
    x: Vec<f64>,
    y: Vec<f64>,
    surface: Vec<f64>,
    end: Vec<f64>,
}

impl Columns {
    fn push(&mut self, id: &str, x: f64, y: f64, surface: f64, end: f64) {
        self.id.push(id.to_string());
        self.x.push(x);
        self.y.push(y);
        self.surface.push(surface);
        self.end.push(end);
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("x", DataType::Float64, false),
            Field::new("y", DataType::Float64, false),
            Field::new("surface", DataType::Float64, false),
            Field::new("end", DataType::Float64, false),
        ]
    }

    fn arrays(&self) -> Vec<Arc<dyn arrow::array::Array>> {
        vec![
            Arc::new(StringArray::from(self.id.iter().map(|s| s.as_str()).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(self.x.clone())),
            Arc::new(Float64Array::from(self.y.clone())),
            Arc::new(Float64Array::from(self.surface.clone())),
            Arc::new(Float64Array::from(self.end.clone())),
        ]
    }
}

fn write_batch(path: &str, batch: &RecordBatch) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let n_boreholes: usize = match args.next() {
        Some(n) => n.parse().context("N_BOREHOLES must be a positive integer")?,
        None => 25,
    };
    let seed: u64 = match args.next() {
        Some(s) => s.parse().context("SEED must be an integer")?,
        None => 42,
    };
    let mut rng = StdRng::seed_from_u64(seed);

    let mut header = Columns::default();
    let mut data = Columns::default();
    let mut top = Vec::new();
    let mut bottom = Vec::new();
    let mut lith = Vec::new();

    for i in 0..n_boreholes {
        let id = format!("B{:05}", i + 1);
        let x = rng.gen_range(127_500.0..131_000.0_f64).round();
        let y = rng.gen_range(503_000.0..506_000.0_f64).round();
        let surface = (gauss(&mut rng, 0.5, 0.8)? * 100.0).round() / 100.0;
        let length = rng.gen_range(3.0..12.0_f64).round();

        let mut depth = 0.0;
        while depth < length {
            let (code, mean_thickness) = pick_lithology(&mut rng);
            let thickness = gauss(&mut rng, mean_thickness, 0.3 * mean_thickness)?.clamp(0.1, 4.0);
            let next = ((depth + thickness) * 10.0).round() / 10.0;
            let next = next.max(depth + 0.1).min(length);
            data.push(&id, x, y, surface, length);
            top.push(depth);
            bottom.push(next);
            lith.push(code);
            depth = next;
        }
        header.push(&id, x, y, surface, length);
    }

    let metadata = reference_metadata(HorizontalReference::RD_NEW, VerticalReference::Depth);

    let header_schema = Arc::new(Schema::new(header.fields()).with_metadata(metadata.clone()));
    let header_batch = RecordBatch::try_new(header_schema, header.arrays())?;
    write_batch("sample_header.parquet", &header_batch)?;

    let mut fields = data.fields();
    fields.push(Field::new("top", DataType::Float64, false));
    fields.push(Field::new("bottom", DataType::Float64, false));
    fields.push(Field::new("lith", DataType::Utf8, false));
    let mut arrays = data.arrays();
    arrays.push(Arc::new(Float64Array::from(top)));
    arrays.push(Arc::new(Float64Array::from(bottom)));
    arrays.push(Arc::new(StringArray::from(lith)));
    let data_schema = Arc::new(Schema::new(fields).with_metadata(metadata));
    let data_batch = RecordBatch::try_new(data_schema, arrays)?;
    write_batch("sample_data.parquet", &data_batch)?;

    println!(
        "Wrote {n_boreholes} boreholes ({} layers) to sample_header.parquet and sample_data.parquet",
        data.id.len()
    );
    Ok(())
}
