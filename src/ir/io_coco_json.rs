//! COCO JSON writer.
//!
//! COCO bounding boxes use `[x, y, width, height]` in absolute pixels, with
//! `(x, y)` the top-left corner.
//!
//! # Deterministic Output
//!
//! Image ids follow annotation-list order and annotation ids come from one
//! counter for the whole document, both starting at 1. Nothing depends on
//! time or hashing, so the same input always renders to the same bytes.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use super::model::{EncodeContext, ImageAnnotation};
use super::synthesized_name;
use crate::error::LabelforgeError;

// ============================================================================
// COCO Schema Types
// ============================================================================

/// Top-level COCO document.
#[derive(Debug, Serialize)]
pub struct CocoDataset {
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,

    /// `[x, y, width, height]` with `(x, y)` as top-left corner.
    pub bbox: [f64; 4],

    pub area: f64,

    /// Always 0: every object is an individual instance.
    pub iscrowd: u8,
}

#[derive(Debug, Serialize)]
pub struct CocoCategory {
    pub id: u32,
    pub name: String,
}

// ============================================================================
// Public API
// ============================================================================

/// Builds the COCO document for one subset of annotations.
pub fn to_coco(annotations: &[&ImageAnnotation], ctx: &EncodeContext<'_>) -> CocoDataset {
    let mut images = Vec::with_capacity(annotations.len());
    let mut coco_annotations = Vec::new();
    let mut next_annotation_id: u64 = 1;

    for (index, annotation) in annotations.iter().enumerate() {
        let image_id = (index + 1) as u64;
        images.push(CocoImage {
            id: image_id,
            file_name: ctx.file_name_for(&annotation.image_name),
            width: annotation.width,
            height: annotation.height,
        });

        for object in &annotation.objects {
            let (x, y, w, h) = object.bbox.to_xywh();
            coco_annotations.push(CocoAnnotation {
                id: next_annotation_id,
                image_id,
                category_id: object.class_id,
                bbox: [x, y, w, h],
                area: w * h,
                iscrowd: 0,
            });
            next_annotation_id += 1;
        }
    }

    // Category names are always synthesized; the class table only feeds
    // data.yaml and VOC.
    let categories = ctx
        .class_ids
        .iter()
        .map(|&id| CocoCategory {
            id,
            name: synthesized_name(id),
        })
        .collect();

    CocoDataset {
        images,
        annotations: coco_annotations,
        categories,
    }
}

/// Renders the COCO document as pretty-printed JSON.
pub fn to_coco_string(
    annotations: &[&ImageAnnotation],
    ctx: &EncodeContext<'_>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&to_coco(annotations, ctx))
}

/// Writes the COCO document to `path`.
pub fn write_coco_json(
    path: &Path,
    annotations: &[&ImageAnnotation],
    ctx: &EncodeContext<'_>,
) -> Result<(), LabelforgeError> {
    let file = File::create(path).map_err(|source| LabelforgeError::write_failed(path, source))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, &to_coco(annotations, ctx)).map_err(|source| {
        LabelforgeError::CocoJsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::ir::{BoundingBox, ClassNames};

    fn sample_annotations() -> Vec<ImageAnnotation> {
        vec![
            ImageAnnotation::new(
                "a",
                640,
                480,
                vec![
                    BoundingBox::from_xyxy(0, 10.0, 20.0, 100.0, 80.0),
                    BoundingBox::from_xyxy(2, 0.0, 0.0, 5.5, 4.0),
                ],
            ),
            ImageAnnotation::new(
                "b",
                100,
                100,
                vec![BoundingBox::from_xyxy(2, 1.0, 1.0, 11.0, 21.0)],
            ),
        ]
    }

    #[test]
    fn test_ids_are_positional() {
        let anns = sample_annotations();
        let refs: Vec<&ImageAnnotation> = anns.iter().collect();
        let paths = BTreeMap::from([("a".to_string(), PathBuf::from("/raw/imgs/A.JPG"))]);
        let names = ClassNames::default();
        let ctx = EncodeContext {
            class_ids: &[0, 2],
            class_names: &names,
            image_paths: &paths,
        };

        let coco = to_coco(&refs, &ctx);

        assert_eq!(coco.images.len(), 2);
        assert_eq!(coco.images[0].id, 1);
        assert_eq!(coco.images[0].file_name, "a.JPG");
        assert_eq!(coco.images[1].id, 2);
        assert_eq!(coco.images[1].file_name, "b");

        let ids: Vec<(u64, u64)> = coco
            .annotations
            .iter()
            .map(|ann| (ann.id, ann.image_id))
            .collect();
        assert_eq!(ids, vec![(1, 1), (2, 1), (3, 2)]);

        assert_eq!(coco.categories.len(), 2);
        assert_eq!(coco.categories[1].id, 2);
        assert_eq!(coco.categories[1].name, "class_2");
    }

    #[test]
    fn test_bbox_is_xywh_with_area() {
        let anns = sample_annotations();
        let refs: Vec<&ImageAnnotation> = anns.iter().collect();
        let names = ClassNames::default();
        let paths = BTreeMap::new();
        let ctx = EncodeContext {
            class_ids: &[0, 2],
            class_names: &names,
            image_paths: &paths,
        };

        let json = to_coco_string(&refs, &ctx).expect("serialize failed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        let first = &parsed["annotations"][0];

        assert_eq!(first["bbox"], serde_json::json!([10.0, 20.0, 90.0, 60.0]));
        assert_eq!(first["area"], 5400.0);
        assert_eq!(first["iscrowd"], 0);
        assert_eq!(first["category_id"], 0);
    }

    #[test]
    fn test_categories_ignore_class_table() {
        let names = ClassNames::new(vec!["cat".into(), "dog".into(), "bird".into()]);
        let paths = BTreeMap::new();
        let ctx = EncodeContext {
            class_ids: &[0, 2],
            class_names: &names,
            image_paths: &paths,
        };

        let coco = to_coco(&[], &ctx);
        let names: Vec<&str> = coco.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["class_0", "class_2"]);
        assert!(coco.images.is_empty());
        assert!(coco.annotations.is_empty());
    }
}
