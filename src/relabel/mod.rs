//! Replacing the objects of one image in a canonical annotation list.
//!
//! Used after a review step corrects the boxes of a single image: the
//! interchange JSON is rewritten and, optionally, so is the image's YOLO
//! label file.

use std::path::{Path, PathBuf};

use crate::error::LabelforgeError;
use crate::ir::io_json::{read_annotations_json, write_annotations_json};
use crate::ir::io_yolo::{decode_label_text, write_yolo_labels, LABEL_EXTENSION};
use crate::ir::{BoundingBox, ImageAnnotation};

/// Replacement objects for one image.
#[derive(Clone, Debug, PartialEq)]
pub enum NewObjects {
    /// Pixel-space boxes in the interchange shape.
    Pixel(Vec<BoundingBox>),
    /// A YOLO label file body, decoded against the image's size.
    YoloText(String),
}

/// What [`relabel_annotations_file`] changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelabelSummary {
    pub image_name: String,
    pub objects: usize,
    /// Boxes discarded because they fell outside the image.
    pub dropped: usize,
    pub label_path: Option<PathBuf>,
}

/// Returns a copy of `annotations` where the record named `image_name`
/// (compared case-insensitively) carries `objects` instead of its old ones.
///
/// Boxes outside the image are dropped. If no record matches, the copy is
/// identical to the input.
pub fn replace_objects(
    annotations: &[ImageAnnotation],
    image_name: &str,
    objects: Vec<BoundingBox>,
) -> Vec<ImageAnnotation> {
    let mut updated = annotations.to_vec();
    let Some(index) = position_of(&updated, image_name) else {
        return updated;
    };

    let target = &mut updated[index];
    target.objects = objects;
    let dropped = target.retain_in_frame();
    if dropped > 0 {
        log::warn!(
            "'{}': dropped {} out-of-frame box(es)",
            target.image_name,
            dropped
        );
    }
    updated
}

/// Replaces the objects of `image_name` in the annotation file at `path`
/// and writes the file back. With `labels_dir`, also rewrites
/// `<labels_dir>/<image_name>.txt`.
///
/// # Errors
/// Fails if `path` cannot be read or written, if no record is named
/// `image_name`, or if the label file cannot be written.
pub fn relabel_annotations_file(
    path: &Path,
    image_name: &str,
    new_objects: NewObjects,
    labels_dir: Option<&Path>,
) -> Result<RelabelSummary, LabelforgeError> {
    let annotations = read_annotations_json(path)?;
    let index = position_of(&annotations, image_name).ok_or_else(|| {
        LabelforgeError::ImageNotFound {
            path: path.to_path_buf(),
            image_name: image_name.to_string(),
        }
    })?;

    let current = &annotations[index];
    let (objects, mut dropped) = match new_objects {
        NewObjects::Pixel(objects) => (objects, 0),
        NewObjects::YoloText(text) => {
            let decoded = decode_label_text(&text, current.width, current.height);
            if decoded.skipped_lines > 0 {
                log::warn!(
                    "'{}': skipped {} malformed label line(s)",
                    current.image_name,
                    decoded.skipped_lines
                );
            }
            (decoded.objects, decoded.dropped_boxes)
        }
    };
    let requested = objects.len();

    let updated = replace_objects(&annotations, image_name, objects);
    let record = &updated[index];
    dropped += requested - record.objects.len();

    write_annotations_json(path, &updated)?;

    let label_path = match labels_dir {
        Some(dir) => {
            write_yolo_labels(dir, &[record])?;
            Some(dir.join(format!("{}.{LABEL_EXTENSION}", record.image_name)))
        }
        None => None,
    };

    log::info!(
        "relabelled '{}' in {}: {} object(s)",
        record.image_name,
        path.display(),
        record.objects.len()
    );
    Ok(RelabelSummary {
        image_name: record.image_name.clone(),
        objects: record.objects.len(),
        dropped,
        label_path,
    })
}

fn position_of(annotations: &[ImageAnnotation], image_name: &str) -> Option<usize> {
    let wanted = image_name.to_lowercase();
    annotations
        .iter()
        .position(|ann| ann.image_name.to_lowercase() == wanted)
}
