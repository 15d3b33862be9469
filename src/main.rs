//! `stratum` – inspect, subset and convert borehole / CPT collections.
//!
//! Usage: `stratum <command> --data FILE [--header FILE] [options]`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use stratum::io::{self, convert, writer, References, TableRecord};
use stratum::{
    Collection, DepthInterval, DepthSlice, HorizontalReference, Layer, Measurement, PolygonPredicate, PolygonSet,
    Settings, VerticalReference,
};

#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(about = "Select, slice and convert geo-referenced borehole and CPT collections")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a summary of a collection
    Info {
        #[command(flatten)]
        input: InputArgs,

        /// Number of header rows to print
        #[arg(long, default_value_t = 5)]
        head: usize,
    },
    /// Keep objects inside (or outside) a bounding box
    Bbox {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, allow_hyphen_values = true)]
        xmin: f64,
        #[arg(long, allow_hyphen_values = true)]
        xmax: f64,
        #[arg(long, allow_hyphen_values = true)]
        ymin: f64,
        #[arg(long, allow_hyphen_values = true)]
        ymax: f64,
        #[arg(long)]
        invert: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Keep objects inside (or outside) polygons from a JSON file
    Polygons {
        #[command(flatten)]
        input: InputArgs,

        /// Polygon file (GeoJSON-like feature collection)
        #[arg(long)]
        polygons: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        buffer: f64,
        /// Also keep objects on a polygon boundary
        #[arg(long)]
        intersects: bool,
        #[arg(long)]
        invert: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Cut the data to a vertical interval
    Slice {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, allow_hyphen_values = true)]
        upper: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lower: Option<f64>,
        /// Reference of the bounds: datum, surface-level or depth
        #[arg(long, default_value = "depth")]
        reference: String,
        /// Keep original layer boundaries instead of clipping
        #[arg(long)]
        keep_boundaries: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Cumulative thickness of layers matching values (layered data only)
    Thickness {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        column: String,
        #[arg(long, num_args = 1.., required = true)]
        values: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Change the horizontal and/or vertical reference
    Reproject {
        #[command(flatten)]
        input: InputArgs,
        /// Target EPSG code, e.g. `EPSG:4326`
        #[arg(long)]
        to_crs: Option<String>,
        /// Target vertical reference
        #[arg(long)]
        to_vertical: Option<String>,
        /// Only transform the header geometries
        #[arg(long)]
        only_geometries: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Layered,
    Discrete,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Data table (.csv, .parquet, .json)
    #[arg(long)]
    data: PathBuf,

    /// Header table; derived from the data when omitted
    #[arg(long)]
    header: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Kind::Layered)]
    kind: Kind,

    /// Horizontal reference of the input (default: from file metadata)
    #[arg(long)]
    crs: Option<String>,

    /// Vertical reference of the input (default: from file metadata)
    #[arg(long)]
    vertical: Option<String>,

    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Columns to read as text, added to those in the settings file
    #[arg(long, num_args = 1..)]
    text_columns: Vec<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output header file (.csv or .parquet)
    #[arg(long)]
    out_header: PathBuf,

    /// Output data file (.csv or .parquet)
    #[arg(long)]
    out_data: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match command_kind(&cli.command) {
        Kind::Layered => run::<Layer>(cli.command),
        Kind::Discrete => run::<Measurement>(cli.command),
    }
}

fn command_kind(command: &Command) -> Kind {
    match command {
        Command::Info { input, .. }
        | Command::Bbox { input, .. }
        | Command::Polygons { input, .. }
        | Command::Slice { input, .. }
        | Command::Thickness { input, .. }
        | Command::Reproject { input, .. } => input.kind,
    }
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

fn references(input: &InputArgs) -> Result<Option<References>> {
    match (&input.crs, &input.vertical) {
        (None, None) => Ok(None),
        (crs, vertical) => {
            let hr: HorizontalReference = match crs {
                Some(s) => s.parse().with_context(|| format!("invalid --crs '{s}'"))?,
                None => HorizontalReference::default(),
            };
            let vr: VerticalReference = match vertical {
                Some(s) => s.parse().with_context(|| format!("invalid --vertical '{s}'"))?,
                None => VerticalReference::Depth,
            };
            Ok(Some((hr, vr)))
        }
    }
}

fn load<R: TableRecord>(input: &InputArgs) -> Result<Collection<R>> {
    let settings = match &input.config {
        Some(path) => Settings::from_json_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => Settings::default(),
    };
    let refs = references(input)?;
    let text_columns: Vec<&str> = settings
        .text_columns
        .iter()
        .chain(&input.text_columns)
        .map(String::as_str)
        .collect();
    let collection = match &input.header {
        Some(header) => {
            io::read_collection_with_text_columns::<R>(header, &input.data, refs, &settings.validation, &text_columns)
        }
        None => io::read_data_table_with_text_columns::<R>(&input.data, refs, &settings.validation, &text_columns),
    }
    .with_context(|| format!("loading {}", input.data.display()))?;
    log::info!(
        "loaded {} objects ({} rows, {})",
        collection.n_points(),
        collection.data().len(),
        R::KIND
    );
    Ok(collection)
}

fn is_parquet(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("parquet" | "pq"))
}

fn save<R: TableRecord>(collection: &Collection<R>, output: &OutputArgs) -> Result<()> {
    if is_parquet(&output.out_header) != is_parquet(&output.out_data) {
        bail!("--out-header and --out-data must use the same format");
    }
    if is_parquet(&output.out_data) {
        collection.to_parquet(&output.out_header, &output.out_data)
    } else {
        collection.to_csv(&output.out_header, &output.out_data)
    }
    .context("writing output")?;
    println!(
        "{} objects written to {} and {}",
        collection.n_points(),
        output.out_header.display(),
        output.out_data.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run<R: TableRecord>(command: Command) -> Result<()>
where
    stratum::DataTable<R>: DepthSlice,
{
    match command {
        Command::Info { input, head } => {
            let collection = load::<R>(&input)?;
            print_info(&collection, head)
        }
        Command::Bbox {
            input,
            xmin,
            xmax,
            ymin,
            ymax,
            invert,
            output,
        } => {
            let collection = load::<R>(&input)?;
            save(&collection.select_within_bbox(xmin, xmax, ymin, ymax, invert), &output)
        }
        Command::Polygons {
            input,
            polygons,
            buffer,
            intersects,
            invert,
            output,
        } => {
            let collection = load::<R>(&input)?;
            let set = PolygonSet::from_json_file(&polygons).with_context(|| format!("reading {}", polygons.display()))?;
            let predicate = if intersects {
                PolygonPredicate::Intersects
            } else {
                PolygonPredicate::Within
            };
            save(&collection.select_within_polygons(&set, buffer, predicate, invert)?, &output)
        }
        Command::Slice {
            input,
            upper,
            lower,
            reference,
            keep_boundaries,
            output,
        } => {
            let collection = load::<R>(&input)?;
            let reference: VerticalReference = reference.parse().context("invalid --reference")?;
            let mut interval = DepthInterval::new(upper, lower, reference);
            if keep_boundaries {
                interval = interval.keep_boundaries();
            }
            save(&collection.slice_depth_interval(&interval), &output)
        }
        Command::Thickness {
            input,
            column,
            values: cells,
            output,
        } => {
            if R::KIND != stratum::DataKind::Layered {
                bail!("thickness needs layered data (--kind layered)");
            }
            let collection = load::<Layer>(&input)?;
            let cells: Vec<_> = cells.iter().map(|s| stratum::Value::infer(s)).collect();
            save(&collection.with_cumulative_layer_thickness(&column, &cells)?, &output)
        }
        Command::Reproject {
            input,
            to_crs,
            to_vertical,
            only_geometries,
            output,
        } => {
            let mut collection = load::<R>(&input)?;
            if let Some(crs) = to_crs {
                let target: HorizontalReference = crs.parse().context("invalid --to-crs")?;
                collection = collection.change_horizontal_reference(target, only_geometries)?;
            }
            if let Some(vertical) = to_vertical {
                let target: VerticalReference = vertical.parse().context("invalid --to-vertical")?;
                collection = collection.change_vertical_reference(target);
            }
            save(&collection, &output)
        }
    }
}

fn print_info<R: TableRecord>(collection: &Collection<R>, head: usize) -> Result<()> {
    let header = collection.header();
    println!("{}: {} objects, {} rows", R::KIND, collection.n_points(), collection.data().len());
    let crs = collection.horizontal_reference();
    println!(
        "references: {crs}{} / {}",
        if crs.is_known() { "" } else { " (no transform available)" },
        collection.vertical_reference()
    );
    if header.xy_reference() != crs {
        println!("x/y columns: {}", header.xy_reference());
    }
    if let Some(rect) = header.bounding_rect() {
        let decimals = if crs.is_geographic() { 6 } else { 2 };
        println!(
            "extent: x {:.*} – {:.*}, y {:.*} – {:.*}",
            decimals,
            rect.min().x,
            decimals,
            rect.max().x,
            decimals,
            rect.min().y,
            decimals,
            rect.max().y
        );
    }
    println!("header columns: {}", header.columns().join(", "));
    println!("data columns: {}", collection.data().columns().join(", "));

    let mut table = convert::header_to_table(header);
    for column in &mut table.columns {
        column.truncate(head);
    }
    let batch = writer::to_record_batch(&table, &Default::default())?;
    println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
    Ok(())
}
