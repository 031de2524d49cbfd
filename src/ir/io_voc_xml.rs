//! Pascal VOC XML writer.
//!
//! Writes one `Annotations/<stem>.xml` per image and one
//! `ImageSets/Main/<split>.txt` per non-empty split. Images without objects
//! still get a complete document (folder, filename and size) with no
//! `<object>` children.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::model::{EncodeContext, ImageAnnotation};
use super::synthesized_name;
use crate::error::LabelforgeError;
use crate::split::Split;

pub const ANNOTATIONS_DIR: &str = "Annotations";
pub const IMAGES_DIR: &str = "JPEGImages";
const VOC_XML_EXTENSION: &str = "xml";
const IMAGE_DEPTH: u32 = 3;

/// Renders the VOC document for one image.
pub fn to_voc_xml_string(
    annotation: &ImageAnnotation,
    class_names: &BTreeMap<u32, String>,
    file_name: &str,
) -> String {
    let mut xml = String::new();

    writeln!(xml, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").expect("write to string");
    writeln!(xml, "<annotation>").expect("write to string");
    writeln!(xml, "  <folder>{IMAGES_DIR}</folder>").expect("write to string");
    writeln!(xml, "  <filename>{}</filename>", xml_escape(file_name)).expect("write to string");
    writeln!(xml, "  <size>").expect("write to string");
    writeln!(xml, "    <width>{}</width>", annotation.width).expect("write to string");
    writeln!(xml, "    <height>{}</height>", annotation.height).expect("write to string");
    writeln!(xml, "    <depth>{IMAGE_DEPTH}</depth>").expect("write to string");
    writeln!(xml, "  </size>").expect("write to string");

    for object in &annotation.objects {
        let name = class_names
            .get(&object.class_id)
            .cloned()
            .unwrap_or_else(|| synthesized_name(object.class_id));

        writeln!(xml, "  <object>").expect("write to string");
        writeln!(xml, "    <name>{}</name>", xml_escape(&name)).expect("write to string");
        writeln!(xml, "    <pose>Unspecified</pose>").expect("write to string");
        writeln!(xml, "    <truncated>0</truncated>").expect("write to string");
        writeln!(xml, "    <difficult>0</difficult>").expect("write to string");
        writeln!(xml, "    <bndbox>").expect("write to string");
        // VOC stores integer pixel corners; fractions are truncated.
        writeln!(xml, "      <xmin>{}</xmin>", object.bbox.xmin() as i64).expect("write to string");
        writeln!(xml, "      <ymin>{}</ymin>", object.bbox.ymin() as i64).expect("write to string");
        writeln!(xml, "      <xmax>{}</xmax>", object.bbox.xmax() as i64).expect("write to string");
        writeln!(xml, "      <ymax>{}</ymax>", object.bbox.ymax() as i64).expect("write to string");
        writeln!(xml, "    </bndbox>").expect("write to string");
        writeln!(xml, "  </object>").expect("write to string");
    }

    writeln!(xml, "</annotation>").expect("write to string");
    xml
}

/// Writes `<root>/Annotations/<stem>.xml` for every annotation.
pub fn write_voc_annotations(
    root: &Path,
    annotations: &[ImageAnnotation],
    ctx: &EncodeContext<'_>,
) -> Result<(), LabelforgeError> {
    let annotations_dir = root.join(ANNOTATIONS_DIR);
    fs::create_dir_all(&annotations_dir)
        .map_err(|source| LabelforgeError::write_failed(&annotations_dir, source))?;

    let class_names = ctx.class_names.resolve_map(ctx.class_ids);

    for annotation in annotations {
        let xml_path =
            annotations_dir.join(format!("{}.{VOC_XML_EXTENSION}", annotation.image_name));
        let xml = to_voc_xml_string(
            annotation,
            &class_names,
            &ctx.file_name_for(&annotation.image_name),
        );
        fs::write(&xml_path, xml)
            .map_err(|source| LabelforgeError::write_failed(&xml_path, source))?;
    }

    Ok(())
}

/// Writes `<root>/ImageSets/Main/<split>.txt` for each non-empty split,
/// one member stem per line.
pub fn write_image_sets(
    root: &Path,
    splits: &[(Split, Vec<&ImageAnnotation>)],
) -> Result<(), LabelforgeError> {
    let main_dir = root.join("ImageSets").join("Main");
    fs::create_dir_all(&main_dir)
        .map_err(|source| LabelforgeError::write_failed(&main_dir, source))?;

    for (split, members) in splits {
        if members.is_empty() {
            continue;
        }

        let mut body = String::new();
        for member in members {
            body.push_str(&member.image_name);
            body.push('\n');
        }

        let set_path = main_dir.join(format!("{}.txt", split.dir_name()));
        fs::write(&set_path, body)
            .map_err(|source| LabelforgeError::write_failed(&set_path, source))?;
    }

    Ok(())
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
