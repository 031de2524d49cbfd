//! JSON interchange for canonical annotations.
//!
//! The canonical list is a JSON array of `{image_name, width, height,
//! objects: [{class_id, xmin, ymin, xmax, ymax}]}` objects. It is what the
//! validator hands to downstream steps and what an augmentation step reads
//! back. Augmentation output uses the same objects with an extra
//! `image_path` field.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;

use super::model::{AugmentedRecord, BoundingBox, ImageAnnotation, RecordFilter};
use crate::error::LabelforgeError;

/// Reads a canonical annotation list from a JSON file.
///
/// Records with an unsafe `image_name`, a zero-sized image or a stem that
/// repeats case-insensitively are skipped with a warning, and boxes that fall
/// outside their image are dropped, so every returned record satisfies the
/// same invariants as the validator's output.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_annotations_json(path: &Path) -> Result<Vec<ImageAnnotation>, LabelforgeError> {
    let annotations: Vec<ImageAnnotation> = read_json_array(path)?;
    let origin = path.display().to_string();
    let mut filter = RecordFilter::default();

    Ok(annotations
        .into_iter()
        .filter_map(|mut annotation| filter.admit(&mut annotation, &origin).then_some(annotation))
        .collect())
}

/// Writes a canonical annotation list as pretty-printed JSON.
pub fn write_annotations_json(
    path: &Path,
    annotations: &[ImageAnnotation],
) -> Result<(), LabelforgeError> {
    let file = File::create(path).map_err(|source| LabelforgeError::write_failed(path, source))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, annotations).map_err(|source| {
        LabelforgeError::AnnotationsJsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Reads augmentation output: canonical annotations with an `image_path`.
///
/// Applies the same record checks as [`read_annotations_json`].
pub fn read_augmented_records(path: &Path) -> Result<Vec<AugmentedRecord>, LabelforgeError> {
    let records: Vec<AugmentedRecord> = read_json_array(path)?;
    let origin = path.display().to_string();
    let mut filter = RecordFilter::default();

    Ok(records
        .into_iter()
        .filter_map(|mut record| filter.admit(&mut record.annotation, &origin).then_some(record))
        .collect())
}

/// Reads a bare JSON array of objects in the interchange box shape.
pub fn read_objects_json(path: &Path) -> Result<Vec<BoundingBox>, LabelforgeError> {
    read_json_array(path)
}

/// Parses a canonical annotation list from a string.
pub fn from_json_str(json: &str) -> Result<Vec<ImageAnnotation>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Renders a canonical annotation list as pretty-printed JSON.
pub fn to_json_string(annotations: &[ImageAnnotation]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(annotations)
}

/// Fuzz-only entrypoint: parse, then apply the record checks.
#[cfg(feature = "fuzzing")]
pub fn fuzz_annotations_json(bytes: &[u8]) {
    if let Ok(annotations) = serde_json::from_slice::<Vec<ImageAnnotation>>(bytes) {
        let mut filter = RecordFilter::default();
        for mut annotation in annotations {
            filter.admit(&mut annotation, "fuzz");
        }
    }
}

fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LabelforgeError> {
    let file = File::open(path).map_err(LabelforgeError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| LabelforgeError::AnnotationsJsonParse {
        path: path.to_path_buf(),
        source,
    })
}
