//! Writes a split canonical dataset to disk in one of the target layouts.
//!
//! The tree is built in a staging directory next to `output_dir` and only
//! renamed into place once every file has been written, so `output_dir`
//! either holds a complete export or is left as it was.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::LabelforgeError;
use crate::ir::io_coco_json::write_coco_json;
use crate::ir::io_voc_xml::{self, write_image_sets, write_voc_annotations};
use crate::ir::io_yolo::{write_data_yaml, write_roboflow_metadata, write_yolo_labels};
use crate::ir::{CanonicalDataset, ClassNames, EncodeContext, ImageAnnotation};
use crate::split::{split_annotations, Split, SplitRatios, SplitResult, DEFAULT_SEED};

const COCO_ANNOTATIONS_FILE: &str = "annotations.json";
const STAGE_PREFIX: &str = ".labelforge-stage-";

/// Target layout of an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Yolo,
    Roboflow,
    Coco,
    Voc,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Yolo,
        ExportFormat::Roboflow,
        ExportFormat::Coco,
        ExportFormat::Voc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExportFormat::Yolo => "yolo",
            ExportFormat::Roboflow => "roboflow",
            ExportFormat::Coco => "coco",
            ExportFormat::Voc => "voc",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = LabelforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yolo" | "yolov8" => Ok(ExportFormat::Yolo),
            "roboflow" => Ok(ExportFormat::Roboflow),
            "coco" | "coco-json" => Ok(ExportFormat::Coco),
            "voc" | "pascal-voc" => Ok(ExportFormat::Voc),
            other => Err(LabelforgeError::UnsupportedFormat(format!(
                "'{}' (supported: yolo, roboflow, coco, voc)",
                other
            ))),
        }
    }
}

/// Options for [`export_dataset`].
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub format: ExportFormat,

    /// Final location of the tree. Replaced if it already exists.
    pub output_dir: PathBuf,

    pub seed: u64,
    pub ratios: SplitRatios,
    pub class_names: ClassNames,

    /// Name recorded in Roboflow metadata.
    pub dataset_name: String,
}

impl ExportOptions {
    pub fn new(format: ExportFormat, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            output_dir: output_dir.into(),
            seed: DEFAULT_SEED,
            ratios: SplitRatios::default(),
            class_names: ClassNames::default(),
            dataset_name: "dataset".to_string(),
        }
    }
}

/// What an export wrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub format: ExportFormat,
    pub train: usize,
    pub valid: usize,
    pub test: usize,
    pub copied_images: usize,
}

/// Splits `dataset` and writes it to `opts.output_dir` in `opts.format`.
///
/// # Errors
/// Fails on a record with an unsafe name, a zero-sized image or a repeated
/// stem, on invalid split ratios, and on any write failure. Missing source
/// images are logged and skipped.
pub fn export_dataset(
    dataset: &CanonicalDataset,
    opts: &ExportOptions,
) -> Result<ExportSummary, LabelforgeError> {
    dataset.check_records()?;
    let splits = split_annotations(&dataset.annotations, &opts.ratios, opts.seed)?;
    let class_ids = dataset.class_ids();
    let ctx = EncodeContext {
        class_ids: &class_ids,
        class_names: &opts.class_names,
        image_paths: &dataset.image_paths,
    };

    let parent = staging_parent(&opts.output_dir);
    fs::create_dir_all(&parent)
        .map_err(|source| LabelforgeError::write_failed(&parent, source))?;
    let stage = tempfile::Builder::new()
        .prefix(STAGE_PREFIX)
        .tempdir_in(&parent)
        .map_err(|source| LabelforgeError::ExportWrite {
            path: parent.clone(),
            message: format!("cannot create staging directory: {source}"),
        })?;

    let copied_images = match opts.format {
        ExportFormat::Yolo => write_yolo_tree(stage.path(), &splits, &ctx)?,
        ExportFormat::Roboflow => {
            let copied = write_yolo_tree(stage.path(), &splits, &ctx)?;
            write_roboflow_metadata(stage.path(), &opts.dataset_name)?;
            copied
        }
        ExportFormat::Coco => write_coco_tree(stage.path(), &splits, &ctx)?,
        ExportFormat::Voc => write_voc_tree(stage.path(), &dataset.annotations, &splits, &ctx)?,
    };

    publish(stage, &opts.output_dir)?;

    let summary = ExportSummary {
        format: opts.format,
        train: splits.train.len(),
        valid: splits.valid.len(),
        test: splits.test.len(),
        copied_images,
    };
    log::info!(
        "exported {} to {}: train {}, valid {}, test {}, {} image(s) copied",
        summary.format,
        opts.output_dir.display(),
        summary.train,
        summary.valid,
        summary.test,
        summary.copied_images
    );
    Ok(summary)
}

fn write_yolo_tree(
    root: &Path,
    splits: &SplitResult<'_>,
    ctx: &EncodeContext<'_>,
) -> Result<usize, LabelforgeError> {
    let mut copied = 0;
    for (split, members) in splits.iter() {
        if members.is_empty() {
            continue;
        }
        let split_dir = root.join(split.dir_name());
        write_yolo_labels(&split_dir.join("labels"), members)?;
        copied += copy_images(&split_dir.join("images"), members, ctx)?;
    }

    write_data_yaml(root, &splits.present_splits(), ctx.class_ids, ctx.class_names)?;
    Ok(copied)
}

fn write_coco_tree(
    root: &Path,
    splits: &SplitResult<'_>,
    ctx: &EncodeContext<'_>,
) -> Result<usize, LabelforgeError> {
    let mut copied = 0;
    for (split, members) in splits.iter() {
        if members.is_empty() {
            continue;
        }
        let split_dir = root.join(split.dir_name());
        copied += copy_images(&split_dir.join("images"), members, ctx)?;
        write_coco_json(&split_dir.join(COCO_ANNOTATIONS_FILE), members, ctx)?;
    }
    Ok(copied)
}

fn write_voc_tree(
    root: &Path,
    annotations: &[ImageAnnotation],
    splits: &SplitResult<'_>,
    ctx: &EncodeContext<'_>,
) -> Result<usize, LabelforgeError> {
    let everything: Vec<&ImageAnnotation> = annotations.iter().collect();
    let copied = copy_images(&root.join(io_voc_xml::IMAGES_DIR), &everything, ctx)?;

    write_voc_annotations(root, annotations, ctx)?;

    let sets: Vec<(Split, Vec<&ImageAnnotation>)> = splits
        .iter()
        .map(|(split, members)| (split, members.to_vec()))
        .collect();
    write_image_sets(root, &sets)?;

    Ok(copied)
}

/// Copies the source image of each member into `images_dir` as
/// `<image_name>.<source extension>`, returning how many were copied.
fn copy_images(
    images_dir: &Path,
    members: &[&ImageAnnotation],
    ctx: &EncodeContext<'_>,
) -> Result<usize, LabelforgeError> {
    fs::create_dir_all(images_dir)
        .map_err(|source| LabelforgeError::write_failed(images_dir, source))?;

    let mut copied = 0;
    for member in members {
        let Some(source) = ctx.image_paths.get(&member.image_name) else {
            log::warn!("no source image known for '{}'", member.image_name);
            continue;
        };
        if !source.is_file() {
            log::warn!(
                "source image {} for '{}' is missing",
                source.display(),
                member.image_name
            );
            continue;
        }

        let destination = images_dir.join(ctx.file_name_for(&member.image_name));
        fs::copy(source, &destination).map_err(|err| LabelforgeError::ExportWrite {
            path: destination.clone(),
            message: format!("failed to copy {}: {err}", source.display()),
        })?;
        copied += 1;
    }

    log::debug!("copied {} image(s) into {}", copied, images_dir.display());
    Ok(copied)
}

fn staging_parent(output_dir: &Path) -> PathBuf {
    match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Replaces `output_dir` with the finished stage.
fn publish(stage: tempfile::TempDir, output_dir: &Path) -> Result<(), LabelforgeError> {
    if output_dir.exists() {
        fs::remove_dir_all(output_dir).map_err(|source| LabelforgeError::ExportWrite {
            path: output_dir.to_path_buf(),
            message: format!("cannot replace previous export: {source}"),
        })?;
    }

    let stage_path = stage.keep();
    fs::rename(&stage_path, output_dir).map_err(|source| {
        let _ = fs::remove_dir_all(&stage_path);
        LabelforgeError::ExportWrite {
            path: output_dir.to_path_buf(),
            message: format!("cannot move staged export into place: {source}"),
        }
    })
}
