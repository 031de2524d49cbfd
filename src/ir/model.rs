//! Canonical dataset model.
//!
//! The validator produces these records, augmentation appends to them, and
//! every encoder reads from them. Boxes are always stored in pixel-space XYXY
//! and always lie inside their image.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::bbox::BBoxXYXY;
use super::class_names::ClassNames;
use super::space::Pixel;
use crate::error::LabelforgeError;

/// One labelled object: a class id and a pixel-space box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub class_id: u32,
    pub bbox: BBoxXYXY<Pixel>,
}

impl BoundingBox {
    pub fn new(class_id: u32, bbox: BBoxXYXY<Pixel>) -> Self {
        Self { class_id, bbox }
    }

    pub fn from_xyxy(class_id: u32, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self::new(class_id, BBoxXYXY::from_xyxy(xmin, ymin, xmax, ymax))
    }

    /// Clamps the box into a `width` x `height` image and returns it only if
    /// the result is a non-degenerate box.
    pub fn clamped(class_id: u32, bbox: BBoxXYXY<Pixel>, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as f64, height as f64);
        let clamped = bbox.clamp_to(w, h);
        clamped
            .is_within(w, h)
            .then_some(Self::new(class_id, clamped))
    }
}

// Serialized flat as {class_id, xmin, ymin, xmax, ymax}; this shape is the
// interchange contract between validation, augmentation and export.
impl Serialize for BoundingBox {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BoundingBox", 5)?;
        state.serialize_field("class_id", &self.class_id)?;
        state.serialize_field("xmin", &self.bbox.xmin())?;
        state.serialize_field("ymin", &self.bbox.ymin())?;
        state.serialize_field("xmax", &self.bbox.xmax())?;
        state.serialize_field("ymax", &self.bbox.ymax())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct BoxData {
            class_id: u32,
            xmin: f64,
            ymin: f64,
            xmax: f64,
            ymax: f64,
        }
        let data = BoxData::deserialize(deserializer)?;
        Ok(BoundingBox::from_xyxy(
            data.class_id,
            data.xmin,
            data.ymin,
            data.xmax,
            data.ymax,
        ))
    }
}

/// The validated, dimension-resolved record for one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    /// Lower-cased file stem shared by the image and its label file.
    pub image_name: String,

    pub width: u32,

    pub height: u32,

    /// Objects in label-file line order.
    pub objects: Vec<BoundingBox>,
}

impl ImageAnnotation {
    pub fn new(
        image_name: impl Into<String>,
        width: u32,
        height: u32,
        objects: Vec<BoundingBox>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            width,
            height,
            objects,
        }
    }

    pub fn has_objects(&self) -> bool {
        !self.objects.is_empty()
    }

    /// Drops objects that do not satisfy the in-frame invariant and returns
    /// how many were removed.
    ///
    /// Records read from outside the validator (interchange JSON,
    /// augmentation output) pass through here before use.
    pub fn retain_in_frame(&mut self) -> usize {
        let (w, h) = (self.width as f64, self.height as f64);
        let before = self.objects.len();
        self.objects.retain(|object| object.bbox.is_within(w, h));
        before - self.objects.len()
    }

    /// Why this record cannot be part of a canonical dataset, or `None` if
    /// it can.
    pub fn defect(&self) -> Option<String> {
        if !is_safe_stem(&self.image_name) {
            return Some(format!(
                "image_name {:?} is not a plain file stem",
                self.image_name
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Some(format!(
                "image size {}x{} is not positive",
                self.width, self.height
            ));
        }
        None
    }
}

/// Whether `name` can be joined onto an output directory without leaving it.
pub fn is_safe_stem(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Admission checks for records that arrive from outside the validator.
///
/// Rejects unsafe names, zero-sized images and stems already seen
/// (case-insensitively), and drops out-of-frame boxes from what it admits.
#[derive(Debug, Default)]
pub(crate) struct RecordFilter {
    seen: BTreeSet<String>,
}

impl RecordFilter {
    pub(crate) fn with_existing<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            seen: names.into_iter().map(str::to_lowercase).collect(),
        }
    }

    /// Returns `false` if `annotation` must be skipped. Every skip and every
    /// dropped box is logged against `origin`.
    pub(crate) fn admit(&mut self, annotation: &mut ImageAnnotation, origin: &str) -> bool {
        if let Some(defect) = annotation.defect() {
            log::warn!("{origin}: skipping record: {defect}");
            return false;
        }
        if !self.seen.insert(annotation.image_name.to_lowercase()) {
            log::warn!(
                "{origin}: skipping '{}': stem already present",
                annotation.image_name
            );
            return false;
        }

        let dropped = annotation.retain_in_frame();
        if dropped > 0 {
            log::warn!(
                "{origin}: dropped {} out-of-frame box(es) from '{}'",
                dropped,
                annotation.image_name
            );
        }
        true
    }
}

/// An augmented record handed over by an external augmentation step: a new
/// canonical annotation plus the path of the synthesized image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentedRecord {
    #[serde(flatten)]
    pub annotation: ImageAnnotation,

    pub image_path: PathBuf,
}

/// Canonical annotations plus the stem to image-path map used when copying
/// images into an export tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanonicalDataset {
    pub annotations: Vec<ImageAnnotation>,
    pub image_paths: BTreeMap<String, PathBuf>,
}

impl CanonicalDataset {
    pub fn new(annotations: Vec<ImageAnnotation>, image_paths: BTreeMap<String, PathBuf>) -> Self {
        Self {
            annotations,
            image_paths,
        }
    }

    /// Sorted distinct class ids across all objects.
    pub fn class_ids(&self) -> Vec<u32> {
        class_ids_of(&self.annotations)
    }

    /// Returns a new dataset with `records` appended after the existing
    /// annotations.
    ///
    /// Existing records are never replaced: a record whose stem is already
    /// present (case-insensitively) is skipped, as is one with an unsafe
    /// name or a zero-sized image.
    pub fn merge_augmented(&self, records: Vec<AugmentedRecord>) -> Self {
        let mut merged = self.clone();
        let mut filter = RecordFilter::with_existing(
            merged.annotations.iter().map(|ann| ann.image_name.as_str()),
        );

        for record in records {
            let AugmentedRecord {
                mut annotation,
                image_path,
            } = record;

            if !filter.admit(&mut annotation, "augmented records") {
                continue;
            }

            merged
                .image_paths
                .insert(annotation.image_name.clone(), image_path);
            merged.annotations.push(annotation);
        }

        merged
    }

    /// Fails on the first record that could not have come out of the
    /// validator: an unsafe name, a zero-sized image or a stem that repeats
    /// case-insensitively.
    pub fn check_records(&self) -> Result<(), LabelforgeError> {
        let mut seen = BTreeSet::new();
        for annotation in &self.annotations {
            if let Some(message) = annotation.defect() {
                return Err(LabelforgeError::InvalidAnnotation {
                    image_name: annotation.image_name.clone(),
                    message,
                });
            }
            if !seen.insert(annotation.image_name.to_lowercase()) {
                return Err(LabelforgeError::InvalidAnnotation {
                    image_name: annotation.image_name.clone(),
                    message: "stem appears more than once".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Dataset-wide facts every encoder needs besides the annotations
/// themselves.
#[derive(Clone, Copy, Debug)]
pub struct EncodeContext<'a> {
    /// Sorted distinct class ids for the whole dataset, not just one split.
    pub class_ids: &'a [u32],
    pub class_names: &'a ClassNames,
    pub image_paths: &'a BTreeMap<String, PathBuf>,
}

impl EncodeContext<'_> {
    /// Output file name of the image for `stem`: the stem plus the source
    /// image's extension, so it always pairs with `<stem>.txt`. Falls back to
    /// the bare stem when the source is unknown or has no extension.
    pub fn file_name_for(&self, stem: &str) -> String {
        match self.image_paths.get(stem).and_then(|path| path.extension()) {
            Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
            None => stem.to_string(),
        }
    }
}

/// Sorted distinct class ids across `annotations`.
pub fn class_ids_of(annotations: &[ImageAnnotation]) -> Vec<u32> {
    annotations
        .iter()
        .flat_map(|ann| ann.objects.iter().map(|object| object.class_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
