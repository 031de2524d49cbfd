#![allow(dead_code)]

use labelforge::ir::{BoundingBox, ImageAnnotation};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Tolerance on normalized coordinates after a YOLO encode/decode cycle.
pub const EPS_YOLO_NORMALIZED: f64 = 1e-4;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// A box at least one pixel wide and tall that lies inside the image.
pub fn arb_object_within(width: u32, height: u32, max_class: u32) -> BoxedStrategy<BoundingBox> {
    (
        0u32..=max_class,
        0.0f64..1.0,
        0.0f64..1.0,
        0.0f64..1.0,
        0.0f64..1.0,
    )
        .prop_map(move |(class_id, a, b, c, d)| {
            let (w, h) = (width as f64, height as f64);
            let xmin = a * (w - 1.0);
            let ymin = b * (h - 1.0);
            let xmax = xmin + 1.0 + c * (w - xmin - 1.0);
            let ymax = ymin + 1.0 + d * (h - ymin - 1.0);
            BoundingBox::from_xyxy(class_id, xmin, ymin, xmax, ymax)
        })
        .boxed()
}

pub fn arb_annotation(stem: String, max_objects: usize) -> BoxedStrategy<ImageAnnotation> {
    (2u32..=4096, 2u32..=4096)
        .prop_flat_map(move |(width, height)| {
            let stem = stem.clone();
            proptest::collection::vec(arb_object_within(width, height, 9), 0..=max_objects)
                .prop_map(move |objects| ImageAnnotation::new(stem.clone(), width, height, objects))
        })
        .boxed()
}

/// Annotations with unique stems `img_0000`, `img_0001`, ...
pub fn arb_annotations(
    max_images: usize,
    max_objects: usize,
) -> BoxedStrategy<Vec<ImageAnnotation>> {
    (0usize..=max_images)
        .prop_flat_map(move |count| {
            (0..count)
                .map(|i| arb_annotation(format!("img_{i:04}"), max_objects))
                .collect::<Vec<_>>()
        })
        .boxed()
}

/// Normalized corners of `object` inside a `width` x `height` image.
pub fn normalized_corners(object: &BoundingBox, width: u32, height: u32) -> [f64; 4] {
    let (w, h) = (width as f64, height as f64);
    [
        object.bbox.xmin() / w,
        object.bbox.ymin() / h,
        object.bbox.xmax() / w,
        object.bbox.ymax() / h,
    ]
}

pub fn assert_objects_close(
    expected: &ImageAnnotation,
    actual: &ImageAnnotation,
    eps: f64,
) -> Result<(), String> {
    if expected.objects.len() != actual.objects.len() {
        return Err(format!(
            "{}: object count mismatch: expected={} actual={}",
            expected.image_name,
            expected.objects.len(),
            actual.objects.len()
        ));
    }

    for (index, (e, a)) in expected.objects.iter().zip(&actual.objects).enumerate() {
        if e.class_id != a.class_id {
            return Err(format!(
                "{}[{index}]: class mismatch {} vs {}",
                expected.image_name, e.class_id, a.class_id
            ));
        }
        let left = normalized_corners(e, expected.width, expected.height);
        let right = normalized_corners(a, actual.width, actual.height);
        for (l, r) in left.iter().zip(&right) {
            if (l - r).abs() > eps {
                return Err(format!(
                    "{}[{index}]: corners {:?} vs {:?} exceed {eps}",
                    expected.image_name, left, right
                ));
            }
        }
    }

    Ok(())
}
