//! YOLO label codec.
//!
//! Decoding turns normalized `class cx cy w h` rows into clamped pixel-space
//! boxes; encoding is the inverse. Every row is parsed on its own: a bad row
//! is skipped and never stops the rest of the file.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::model::{BoundingBox, ImageAnnotation};
use super::{BBoxXYXY, ClassNames, Normalized};
use crate::error::LabelforgeError;
use crate::split::Split;

pub const LABEL_EXTENSION: &str = "txt";
pub const DATA_YAML: &str = "data.yaml";

/// A syntactically valid label row, still in normalized space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloLabelRow {
    pub class_id: u32,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl YoloLabelRow {
    pub fn to_normalized_bbox(&self) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_cxcywh(self.cx, self.cy, self.w, self.h)
    }
}

/// Why a label line produced no row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    TooFewTokens { found: usize },
    InvalidClassId,
    InvalidNumber { field: &'static str },
}

/// Outcome of parsing one label line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LineParse {
    Row(YoloLabelRow),
    Skip(SkipReason),
}

/// Parses one label line. Tokens after the fifth are ignored.
pub fn parse_label_line(line: &str) -> LineParse {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineParse::Skip(SkipReason::Blank);
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().take(5).collect();
    if tokens.len() < 5 {
        return LineParse::Skip(SkipReason::TooFewTokens {
            found: tokens.len(),
        });
    }

    let Ok(class_id) = tokens[0].parse::<u32>() else {
        return LineParse::Skip(SkipReason::InvalidClassId);
    };

    let mut values = [0.0f64; 4];
    for (slot, (raw, field)) in values.iter_mut().zip(
        tokens[1..]
            .iter()
            .zip(["x_center", "y_center", "width", "height"]),
    ) {
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => *slot = value,
            _ => return LineParse::Skip(SkipReason::InvalidNumber { field }),
        }
    }

    let [cx, cy, w, h] = values;
    LineParse::Row(YoloLabelRow {
        class_id,
        cx,
        cy,
        w,
        h,
    })
}

/// Boxes decoded from one label file, plus bookkeeping for logs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedLabels {
    pub objects: Vec<BoundingBox>,
    /// Non-blank lines that did not parse.
    pub skipped_lines: usize,
    /// Rows that parsed but collapsed to nothing after clamping.
    pub dropped_boxes: usize,
}

/// Decodes a whole label file body against a `width` x `height` image.
pub fn decode_label_text(text: &str, width: u32, height: u32) -> DecodedLabels {
    let mut decoded = DecodedLabels::default();

    for line in text.lines() {
        match parse_label_line(line) {
            LineParse::Row(row) => {
                let pixel = row
                    .to_normalized_bbox()
                    .to_pixel(width as f64, height as f64);
                match BoundingBox::clamped(row.class_id, pixel, width, height) {
                    Some(object) => decoded.objects.push(object),
                    None => decoded.dropped_boxes += 1,
                }
            }
            LineParse::Skip(SkipReason::Blank) => {}
            LineParse::Skip(_) => decoded.skipped_lines += 1,
        }
    }

    decoded
}

/// Formats one object as a YOLO row with 6 decimal places.
pub fn encode_object(object: &BoundingBox, width: u32, height: u32) -> String {
    let (cx, cy, w, h) = object
        .bbox
        .to_normalized(width as f64, height as f64)
        .to_cxcywh();
    format!("{} {:.6} {:.6} {:.6} {:.6}", object.class_id, cx, cy, w, h)
}

/// Renders the label file body for one annotation.
pub fn to_yolo_label_string(annotation: &ImageAnnotation) -> String {
    let mut out = String::new();
    for object in &annotation.objects {
        out.push_str(&encode_object(
            object,
            annotation.width,
            annotation.height,
        ));
        out.push('\n');
    }
    out
}

/// Writes `<labels_dir>/<image_name>.txt` for every annotation.
pub fn write_yolo_labels(
    labels_dir: &Path,
    annotations: &[&ImageAnnotation],
) -> Result<(), LabelforgeError> {
    fs::create_dir_all(labels_dir)
        .map_err(|source| LabelforgeError::write_failed(labels_dir, source))?;

    for annotation in annotations {
        // Stems may contain dots, so the extension is appended rather than swapped.
        let label_path =
            labels_dir.join(format!("{}.{LABEL_EXTENSION}", annotation.image_name));
        fs::write(&label_path, to_yolo_label_string(annotation))
            .map_err(|source| LabelforgeError::write_failed(&label_path, source))?;
    }

    Ok(())
}

/// Renders the `data.yaml` descriptor.
///
/// Only splits in `present_splits` get a path entry; `nc` is the number of
/// distinct class ids.
pub fn data_yaml_string(present_splits: &[Split], class_ids: &[u32], names: &ClassNames) -> String {
    let mut yaml = String::new();
    for split in present_splits {
        writeln!(yaml, "{}: {}/images", split.yaml_key(), split.dir_name())
            .expect("write to string");
    }

    writeln!(yaml, "nc: {}", class_ids.len()).expect("write to string");

    let quoted: Vec<String> = names
        .resolve(class_ids)
        .iter()
        .map(|name| yaml_single_quoted(name))
        .collect();
    writeln!(yaml, "names: [{}]", quoted.join(", ")).expect("write to string");
    yaml
}

pub fn write_data_yaml(
    output_root: &Path,
    present_splits: &[Split],
    class_ids: &[u32],
    names: &ClassNames,
) -> Result<(), LabelforgeError> {
    let path = output_root.join(DATA_YAML);
    fs::write(&path, data_yaml_string(present_splits, class_ids, names))
        .map_err(|source| LabelforgeError::write_failed(&path, source))
}

/// Writes the Roboflow-style sidecar files next to `data.yaml`.
pub fn write_roboflow_metadata(
    output_root: &Path,
    dataset_name: &str,
) -> Result<(), LabelforgeError> {
    let readme = format!(
        "Dataset Name: {dataset_name}\nExported via labelforge {}.\n",
        env!("CARGO_PKG_VERSION")
    );
    let readme_path = output_root.join("README.roboflow.txt");
    fs::write(&readme_path, readme)
        .map_err(|source| LabelforgeError::write_failed(&readme_path, source))?;

    let metadata = serde_json::json!({
        "name": dataset_name,
        "version": 1,
        "format": "yolov8",
    });
    let path = output_root.join("metadata.json");
    let body =
        serde_json::to_string_pretty(&metadata).map_err(|source| LabelforgeError::ExportWrite {
            path: path.clone(),
            message: source.to_string(),
        })?;
    fs::write(&path, body).map_err(|source| LabelforgeError::write_failed(&path, source))
}

fn yaml_single_quoted(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// Fuzz-only entrypoint for single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) {
    let _ = parse_label_line(input);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_label_line_accepts_valid_rows() {
        assert_eq!(
            parse_label_line("2 0.5 0.25 0.3 0.1"),
            LineParse::Row(YoloLabelRow {
                class_id: 2,
                cx: 0.5,
                cy: 0.25,
                w: 0.3,
                h: 0.1,
            })
        );
    }

    #[test]
    fn parse_label_line_ignores_extra_tokens() {
        assert!(matches!(
            parse_label_line("0 0.5 0.5 0.2 0.2 0.9 0.1"),
            LineParse::Row(YoloLabelRow { class_id: 0, .. })
        ));
    }

    #[test]
    fn parse_label_line_skips_bad_rows() {
        assert_eq!(
            parse_label_line("   "),
            LineParse::Skip(SkipReason::Blank)
        );
        assert_eq!(
            parse_label_line("0 0.1 0.2"),
            LineParse::Skip(SkipReason::TooFewTokens { found: 3 })
        );
        assert_eq!(
            parse_label_line("-1 0.5 0.5 0.1 0.1"),
            LineParse::Skip(SkipReason::InvalidClassId)
        );
        assert_eq!(
            parse_label_line("1.0 0.5 0.5 0.1 0.1"),
            LineParse::Skip(SkipReason::InvalidClassId)
        );
        assert_eq!(
            parse_label_line("1 0.5 abc 0.1 0.1"),
            LineParse::Skip(SkipReason::InvalidNumber { field: "y_center" })
        );
        assert_eq!(
            parse_label_line("1 0.5 0.5 NaN 0.1"),
            LineParse::Skip(SkipReason::InvalidNumber { field: "width" })
        );
    }

    #[test]
    fn decode_clamps_oversized_box_to_image() {
        let decoded = decode_label_text("2 0.5 0.5 2.0 2.0\n", 100, 100);
        assert_eq!(
            decoded.objects,
            vec![BoundingBox::from_xyxy(2, 0.0, 0.0, 100.0, 100.0)]
        );
    }

    #[test]
    fn decode_keeps_going_after_bad_lines() {
        let text = "0 0.5 0.5 0.5 0.5\ngarbage\n\n1 0.1 0.1\n1 0.25 0.25 0.1 0.1\n";
        let decoded = decode_label_text(text, 200, 100);

        assert_eq!(decoded.objects.len(), 2);
        assert_eq!(decoded.skipped_lines, 2);
        assert_eq!(decoded.objects[0].class_id, 0);
        assert_eq!(
            decoded.objects[0].bbox,
            BBoxXYXY::from_xyxy(50.0, 25.0, 150.0, 75.0)
        );
        assert_eq!(decoded.objects[1].class_id, 1);
    }

    #[test]
    fn decode_drops_boxes_entirely_outside_the_image() {
        let decoded = decode_label_text("0 1.5 0.5 0.2 0.2\n0 0.5 0.5 0.0 0.3\n", 100, 100);
        assert!(decoded.objects.is_empty());
        assert_eq!(decoded.dropped_boxes, 2);
    }

    #[test]
    fn encode_inverts_decode() {
        let object = BoundingBox::from_xyxy(4, 10.0, 20.0, 110.0, 60.0);
        assert_eq!(
            encode_object(&object, 200, 100),
            "4 0.300000 0.400000 0.500000 0.400000"
        );
    }

    #[test]
    fn data_yaml_lists_only_present_splits() {
        let names = ClassNames::new(vec!["cat".into(), "dog's".into()]);
        let yaml = data_yaml_string(&[Split::Train, Split::Valid], &[0, 1], &names);
        assert_eq!(
            yaml,
            "train: train/images\nval: valid/images\nnc: 2\nnames: ['cat', 'dog''s']\n"
        );
    }

    #[test]
    fn data_yaml_synthesizes_names_when_table_is_short() {
        let names = ClassNames::new(vec!["cat".into()]);
        let yaml = data_yaml_string(&[Split::Test], &[0, 4], &names);
        assert!(yaml.starts_with("test: test/images\n"));
        assert!(yaml.contains("names: ['class_0', 'class_4']"));
    }

    #[test]
    fn write_labels_creates_one_file_per_annotation() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let ann = ImageAnnotation::new(
            "img_001",
            100,
            50,
            vec![BoundingBox::from_xyxy(1, 0.0, 0.0, 50.0, 50.0)],
        );

        write_yolo_labels(&temp.path().join("labels"), &[&ann]).expect("write labels");

        let body = fs::read_to_string(temp.path().join("labels/img_001.txt")).expect("read label");
        assert_eq!(body, "1 0.250000 0.500000 0.500000 1.000000\n");
    }

    #[test]
    fn write_labels_reports_the_failing_path() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let ann = ImageAnnotation::new("img_001", 10, 10, vec![]);
        // A directory already sits where the label file would go.
        let blocker = temp.path().join("labels/img_001.txt");
        fs::create_dir_all(&blocker).expect("create blocker");

        let err = write_yolo_labels(&temp.path().join("labels"), &[&ann]).expect_err("should fail");
        assert!(matches!(err, LabelforgeError::ExportWrite { ref path, .. } if path == &blocker));
    }
}
