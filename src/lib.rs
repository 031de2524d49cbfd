//! Labelforge: annotation validation and dataset export.
//!
//! Labelforge pairs an images tree with a tree of YOLO label files, reports
//! every mismatch and unreadable file, and re-exports the usable pairs as a
//! seeded train/valid/test split in YOLO, Roboflow-flavored YOLO, COCO or
//! Pascal VOC layout.
//!
//! # Modules
//!
//! - [`ir`]: Canonical annotation model and the per-format codecs
//! - [`validation`]: Image/label matching and the validation report
//! - [`split`]: Deterministic train/valid/test splitting
//! - [`export`]: Writing split datasets to disk
//! - [`relabel`]: Replacing the boxes of one image after review
//! - [`error`]: Error types for labelforge operations

pub mod error;
pub mod export;
pub mod ir;
pub mod relabel;
pub mod split;
pub mod validation;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

pub use error::LabelforgeError;

use crate::export::{ExportFormat, ExportOptions};
use crate::ir::ClassNames;
use crate::relabel::NewObjects;
use crate::split::{Split, SplitRatios, DEFAULT_SEED};
use crate::validation::{ValidateOptions, ValidationOutcome};

/// The labelforge CLI application.
#[derive(Parser)]
#[command(name = "labelforge")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Match images against YOLO labels and report defects.
    Validate(ValidateArgs),
    /// Split a canonical annotations file into train/valid/test.
    Split(SplitArgs),
    /// Validate, split and write a dataset in a target format.
    Export(ExportArgs),
    /// Replace the boxes of one image in a canonical annotations file.
    Relabel(RelabelArgs),
}

/// Input trees shared by validate and export.
#[derive(clap::Args)]
struct SourceArgs {
    /// Directory searched recursively for images.
    images: PathBuf,

    /// Directory searched recursively for YOLO label files.
    labels: PathBuf,

    /// Class names file (classes.txt-style or data.yaml); overrides any
    /// classes.txt found among the labels.
    #[arg(long)]
    names: Option<PathBuf>,

    /// Do not count classes.txt as a label file.
    #[arg(long)]
    exclude_classes_txt: bool,
}

/// Split configuration shared by split and export.
#[derive(clap::Args)]
struct RatioArgs {
    /// Shuffle seed.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Fraction of annotated images assigned to train.
    #[arg(long, default_value_t = 0.7)]
    train: f64,

    /// Fraction of annotated images assigned to valid.
    #[arg(long, default_value_t = 0.2)]
    val: f64,

    /// Fraction of annotated images assigned to test.
    #[arg(long, default_value_t = 0.1)]
    test: f64,
}

impl RatioArgs {
    fn ratios(&self) -> SplitRatios {
        SplitRatios::new(self.train, self.val, self.test)
    }
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Exit non-zero if any defect is found.
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,

    /// Also write the canonical annotation list to this JSON file.
    #[arg(long)]
    annotations_out: Option<PathBuf>,
}

/// Arguments for the split subcommand.
#[derive(clap::Args)]
struct SplitArgs {
    /// Canonical annotations JSON file.
    annotations: PathBuf,

    #[command(flatten)]
    ratios: RatioArgs,

    /// Output format ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the export subcommand.
#[derive(clap::Args)]
struct ExportArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output format ('yolo', 'roboflow', 'coco' or 'voc').
    #[arg(long, default_value = "yolo")]
    format: String,

    /// Output directory; replaced if it exists.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    ratios: RatioArgs,

    /// Augmentation output (canonical annotations with image_path) to merge
    /// before splitting.
    #[arg(long)]
    augmented: Option<PathBuf>,

    /// Dataset name recorded in Roboflow metadata.
    #[arg(long, default_value = "dataset")]
    dataset_name: String,

    /// Refuse to export if validation finds any defect.
    #[arg(long)]
    strict: bool,
}

/// Arguments for the relabel subcommand.
#[derive(clap::Args)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["objects", "yolo"])))]
struct RelabelArgs {
    /// Canonical annotations JSON file, rewritten in place.
    annotations: PathBuf,

    /// Stem of the image to relabel.
    image_name: String,

    /// JSON array of pixel-space boxes ({class_id, xmin, ymin, xmax, ymax}).
    #[arg(long)]
    objects: Option<PathBuf>,

    /// YOLO label file with the new boxes.
    #[arg(long)]
    yolo: Option<PathBuf>,

    /// Also rewrite <image_name>.txt in this labels directory.
    #[arg(long)]
    labels_dir: Option<PathBuf>,
}

/// Run the labelforge CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabelforgeError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::Export(args)) => run_export(args),
        Some(Commands::Relabel(args)) => run_relabel(args),
        None => {
            println!("labelforge {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Annotation validation and dataset export.");
            println!();
            println!("Run 'labelforge --help' for usage information.");
            Ok(())
        }
    }
}

/// Runs the matcher and applies a `--names` override.
fn validate_source(source: &SourceArgs) -> Result<ValidationOutcome, LabelforgeError> {
    let opts = ValidateOptions {
        classes_txt_is_label: !source.exclude_classes_txt,
    };
    let mut outcome = validation::validate_dataset(&source.images, &source.labels, &opts)?;

    if let Some(names_path) = &source.names {
        outcome.class_names = ClassNames::read(names_path)?;
    }
    Ok(outcome)
}

fn ensure_clean(outcome: &ValidationOutcome) -> Result<(), LabelforgeError> {
    if outcome.report.is_clean() {
        Ok(())
    } else {
        Err(LabelforgeError::ValidationFailed {
            defect_count: outcome.report.defect_count(),
            report: Box::new(outcome.report.clone()),
        })
    }
}

fn print_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<(), LabelforgeError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| {
        LabelforgeError::AnnotationsJsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })?;
    println!("{json}");
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), LabelforgeError> {
    let outcome = validate_source(&args.source)?;

    if let Some(path) = &args.annotations_out {
        ir::io_json::write_annotations_json(path, &outcome.dataset.annotations)?;
    }

    match args.output.as_str() {
        "json" => print_json(&outcome.report, Path::new("<stdout>"))?,
        _ => print!("{}", outcome.report),
    }

    if args.strict {
        ensure_clean(&outcome)?;
    }
    Ok(())
}

/// Execute the split subcommand.
fn run_split(args: SplitArgs) -> Result<(), LabelforgeError> {
    let annotations = ir::io_json::read_annotations_json(&args.annotations)?;
    let result = split::split_annotations(&annotations, &args.ratios.ratios(), args.ratios.seed)?;

    match args.output.as_str() {
        "json" => {
            let stems: std::collections::BTreeMap<&str, Vec<&str>> = Split::ALL
                .into_iter()
                .map(|split| (split.dir_name(), result.stems(split)))
                .collect();
            print_json(&stems, Path::new("<stdout>"))?;
        }
        _ => {
            for (split, members) in result.iter() {
                println!("{} ({}):", split, members.len());
                for member in members {
                    println!("  {}", member.image_name);
                }
            }
        }
    }
    Ok(())
}

/// Execute the export subcommand.
fn run_export(args: ExportArgs) -> Result<(), LabelforgeError> {
    let format: ExportFormat = args.format.parse()?;
    let outcome = validate_source(&args.source)?;

    if args.strict {
        ensure_clean(&outcome)?;
    } else if !outcome.report.is_clean() {
        log::warn!(
            "exporting despite {} validation defect(s)",
            outcome.report.defect_count()
        );
    }

    let dataset = match &args.augmented {
        Some(path) => outcome
            .dataset
            .merge_augmented(ir::io_json::read_augmented_records(path)?),
        None => outcome.dataset,
    };

    let opts = ExportOptions {
        format,
        output_dir: args.out,
        seed: args.ratios.seed,
        ratios: args.ratios.ratios(),
        class_names: outcome.class_names,
        dataset_name: args.dataset_name,
    };
    let summary = export::export_dataset(&dataset, &opts)?;

    println!(
        "Exported {} to {}: train {}, valid {}, test {} ({} image(s) copied)",
        summary.format,
        opts.output_dir.display(),
        summary.train,
        summary.valid,
        summary.test,
        summary.copied_images
    );
    Ok(())
}

/// Execute the relabel subcommand.
fn run_relabel(args: RelabelArgs) -> Result<(), LabelforgeError> {
    let new_objects = match (&args.objects, &args.yolo) {
        (Some(path), _) => NewObjects::Pixel(ir::io_json::read_objects_json(path)?),
        (None, Some(path)) => NewObjects::YoloText(std::fs::read_to_string(path)?),
        // clap's required group guarantees one of the two.
        (None, None) => NewObjects::Pixel(Vec::new()),
    };

    let summary = relabel::relabel_annotations_file(
        &args.annotations,
        &args.image_name,
        new_objects,
        args.labels_dir.as_deref(),
    )?;

    println!(
        "Relabelled {}: {} object(s), {} dropped",
        summary.image_name, summary.objects, summary.dropped
    );
    if let Some(path) = &summary.label_path {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
