//! Image/label matching and validation.
//!
//! Walks an images tree and a labels tree, pairs files by lower-cased stem,
//! reads image headers for dimensions and decodes YOLO label files into the
//! canonical model. Per-file problems never abort the run: they are recorded
//! in the [`ValidationReport`] and logged.

mod report;

pub use report::ValidationReport;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LabelforgeError;
use crate::ir::io_yolo::{decode_label_text, LABEL_EXTENSION};
use crate::ir::{class_ids_of, is_safe_stem, CanonicalDataset, ClassNames, ImageAnnotation};

/// Image extensions the matcher recognises (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

const CLASSES_TXT: &str = "classes.txt";

/// Options for matcher behavior.
#[derive(Clone, Debug)]
pub struct ValidateOptions {
    /// If true, a `classes.txt` among the labels stays a label-set member and
    /// is reported as an orphan when no image shares its stem. If false it is
    /// only read as the class-name table.
    pub classes_txt_is_label: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            classes_txt_is_label: true,
        }
    }
}

/// Everything one validation run produces.
#[derive(Clone, Debug, Default)]
pub struct ValidationOutcome {
    pub report: ValidationReport,

    /// Matched, decodable pairs in ascending stem order, plus the stem to
    /// image-path map for those pairs.
    pub dataset: CanonicalDataset,

    /// Stem to label-path map for the same pairs as `dataset`.
    pub label_paths: BTreeMap<String, PathBuf>,

    /// Names read from `classes.txt`; empty when there is none.
    pub class_names: ClassNames,
}

/// Matches `images_root` against `labels_root` and decodes every usable pair.
///
/// # Errors
/// Only a root that is not a readable directory is fatal. Unreadable
/// images, unreadable label files and malformed label lines are recorded in
/// the report instead.
pub fn validate_dataset(
    images_root: &Path,
    labels_root: &Path,
    opts: &ValidateOptions,
) -> Result<ValidationOutcome, LabelforgeError> {
    ensure_directory(images_root)?;
    ensure_directory(labels_root)?;

    let image_files = collect_files_with_extensions(images_root, IMAGE_EXTENSIONS)?;
    let label_files = collect_files_with_extensions(labels_root, &[LABEL_EXTENSION])?;

    let class_names = read_classes_txt(&label_files);
    let label_files: Vec<PathBuf> = if opts.classes_txt_is_label {
        label_files
    } else {
        label_files
            .into_iter()
            .filter(|path| !is_classes_txt(path))
            .collect()
    };

    let images = stem_map(image_files);
    let labels = stem_map(label_files);
    log::debug!(
        "found {} image stem(s) under {} and {} label stem(s) under {}",
        images.len(),
        images_root.display(),
        labels.len(),
        labels_root.display()
    );

    let mut report = ValidationReport {
        total_images: images.len(),
        total_labels: labels.len(),
        ..Default::default()
    };
    let mut outcome_annotations = Vec::new();
    let mut image_paths = BTreeMap::new();
    let mut label_paths = BTreeMap::new();

    for (stem, image_path) in &images {
        let Some(label_path) = labels.get(stem) else {
            report.missing_label_images.push(file_name_of(image_path));
            if read_image_dimensions(image_path).is_none() {
                report.corrupted_image_files.push(file_name_of(image_path));
            }
            continue;
        };

        let Some((width, height)) = read_image_dimensions(image_path) else {
            report.corrupted_image_files.push(file_name_of(image_path));
            continue;
        };

        let annotation = decode_label_file(stem, label_path, width, height);
        if !annotation.has_objects() {
            report.empty_label_files.push(file_name_of(label_path));
        }

        outcome_annotations.push(annotation);
        image_paths.insert(stem.clone(), image_path.clone());
        label_paths.insert(stem.clone(), label_path.clone());
    }

    for (stem, label_path) in &labels {
        if !images.contains_key(stem) {
            report.orphan_label_files.push(file_name_of(label_path));
        }
    }

    report.class_ids_found = class_ids_of(&outcome_annotations);
    finalize_report(&mut report);

    log::info!(
        "validated {} pair(s): {} missing, {} orphan, {} empty, {} corrupted",
        outcome_annotations.len(),
        report.missing_labels,
        report.orphan_labels,
        report.empty_labels,
        report.corrupted_images
    );

    Ok(ValidationOutcome {
        report,
        dataset: CanonicalDataset::new(outcome_annotations, image_paths),
        label_paths,
        class_names,
    })
}

fn ensure_directory(root: &Path) -> Result<(), LabelforgeError> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(LabelforgeError::RootNotDirectory {
            path: root.to_path_buf(),
        })
    }
}

/// Recursively collects files with one of `extensions`, deduplicated by
/// resolved path.
fn collect_files_with_extensions(
    root: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, LabelforgeError> {
    let mut seen = BTreeSet::new();
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(LabelforgeError::Walk {
                    path: root.to_path_buf(),
                    message: source.to_string(),
                });
            }
            Err(source) => {
                log::warn!("skipping unreadable entry under {}: {}", root.display(), source);
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }

        let resolved =
            fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
        if seen.insert(resolved) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// Builds a lower-cased stem map. On a stem collision the smallest path
/// string wins so the result never depends on directory-scan order.
fn stem_map(files: Vec<PathBuf>) -> BTreeMap<String, PathBuf> {
    let mut map: BTreeMap<String, PathBuf> = BTreeMap::new();

    for path in files {
        let Some(stem) = path.file_stem() else {
            continue;
        };
        let key = stem.to_string_lossy().to_lowercase();
        if !is_safe_stem(&key) {
            log::warn!("skipping {}: stem cannot name an output file", path.display());
            continue;
        }

        match map.get_mut(&key) {
            Some(existing) => {
                log::warn!(
                    "stem '{}' is shared by {} and {}",
                    key,
                    existing.display(),
                    path.display()
                );
                if path.to_string_lossy() < existing.to_string_lossy() {
                    *existing = path;
                }
            }
            None => {
                map.insert(key, path);
            }
        }
    }

    map
}

fn is_classes_txt(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.eq_ignore_ascii_case(CLASSES_TXT))
}

fn read_classes_txt(label_files: &[PathBuf]) -> ClassNames {
    let Some(path) = label_files
        .iter()
        .filter(|path| is_classes_txt(path))
        .min_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()))
    else {
        return ClassNames::default();
    };

    match fs::read_to_string(path) {
        Ok(text) => {
            let names = ClassNames::from_lines(&text);
            log::debug!("read {} class name(s) from {}", names.len(), path.display());
            names
        }
        Err(source) => {
            log::warn!("failed to read {}: {}", path.display(), source);
            ClassNames::default()
        }
    }
}

/// Reads the image header. A zero dimension counts as unreadable.
fn read_image_dimensions(path: &Path) -> Option<(u32, u32)> {
    let size = match imagesize::size(path) {
        Ok(size) => size,
        Err(source) => {
            log::warn!("cannot read dimensions of {}: {}", path.display(), source);
            return None;
        }
    };

    let width = u32::try_from(size.width).ok().filter(|w| *w > 0);
    let height = u32::try_from(size.height).ok().filter(|h| *h > 0);
    match (width, height) {
        (Some(width), Some(height)) => Some((width, height)),
        _ => {
            log::warn!(
                "{} has unusable dimensions {}x{}",
                path.display(),
                size.width,
                size.height
            );
            None
        }
    }
}

fn decode_label_file(stem: &str, label_path: &Path, width: u32, height: u32) -> ImageAnnotation {
    let text = match fs::read_to_string(label_path) {
        Ok(text) => text,
        Err(source) => {
            log::warn!("cannot read {}: {}", label_path.display(), source);
            String::new()
        }
    };

    let decoded = decode_label_text(&text, width, height);
    if decoded.skipped_lines > 0 || decoded.dropped_boxes > 0 {
        log::debug!(
            "{}: skipped {} malformed line(s), dropped {} degenerate box(es)",
            label_path.display(),
            decoded.skipped_lines,
            decoded.dropped_boxes
        );
    }

    ImageAnnotation::new(stem, width, height, decoded.objects)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn finalize_report(report: &mut ValidationReport) {
    report.missing_label_images.sort();
    report.orphan_label_files.sort();
    report.empty_label_files.sort();
    report.corrupted_image_files.sort();

    report.missing_labels = report.missing_label_images.len();
    report.orphan_labels = report.orphan_label_files.len();
    report.empty_labels = report.empty_label_files.len();
    report.corrupted_images = report.corrupted_image_files.len();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BoundingBox;

    /// Header-only BMP; enough to read dimensions.
    fn write_bmp(path: &Path, width: u32, height: u32) {
        let mut bytes = Vec::with_capacity(54);
        bytes.extend_from_slice(b"BM");
        bytes.extend_from_slice(&54u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&54u32.to_le_bytes());
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&(width as i32).to_le_bytes());
        bytes.extend_from_slice(&(height as i32).to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.resize(54, 0);

        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(path, bytes).expect("write bmp");
    }

    fn write_label(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(path, body).expect("write label");
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        images: PathBuf,
        labels: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("create temp dir");
        let images = temp.path().join("images");
        let labels = temp.path().join("labels");
        fs::create_dir_all(&images).expect("images dir");
        fs::create_dir_all(&labels).expect("labels dir");
        Fixture {
            _temp: temp,
            images,
            labels,
        }
    }

    #[test]
    fn set_algebra_over_stems() {
        let fx = fixture();
        write_bmp(&fx.images.join("a.bmp"), 100, 100);
        write_bmp(&fx.images.join("nested/B.BMP"), 100, 100);
        write_bmp(&fx.images.join("c.bmp"), 100, 100);
        write_label(&fx.labels.join("a.txt"), "0 0.5 0.5 0.2 0.2\n");
        write_label(&fx.labels.join("b.txt"), "1 0.5 0.5 0.2 0.2\n");
        write_label(&fx.labels.join("d.txt"), "0 0.5 0.5 0.2 0.2\n");

        let outcome =
            validate_dataset(&fx.images, &fx.labels, &ValidateOptions::default()).expect("run");
        let report = &outcome.report;

        assert_eq!(report.total_images, 3);
        assert_eq!(report.total_labels, 3);
        assert_eq!(report.missing_label_images, vec!["c.bmp"]);
        assert_eq!(report.orphan_label_files, vec!["d.txt"]);
        assert_eq!(report.class_ids_found, vec![0, 1]);

        let stems: Vec<&str> = outcome
            .dataset
            .annotations
            .iter()
            .map(|ann| ann.image_name.as_str())
            .collect();
        assert_eq!(stems, vec!["a", "b"]);
        assert_eq!(
            outcome.dataset.image_paths.get("b"),
            Some(&fx.images.join("nested/B.BMP"))
        );
        assert_eq!(outcome.label_paths.get("a"), Some(&fx.labels.join("a.txt")));
    }

    #[test]
    fn corrupted_and_empty_are_tracked() {
        let fx = fixture();
        write_bmp(&fx.images.join("good.bmp"), 200, 100);
        fs::write(fx.images.join("broken.png"), b"not an image").expect("write");
        fs::write(fx.images.join("lonely.jpg"), b"junk").expect("write");
        write_bmp(&fx.images.join("flat.bmp"), 0, 10);
        write_label(&fx.labels.join("good.txt"), "garbage\n\n");
        write_label(&fx.labels.join("broken.txt"), "0 0.5 0.5 0.1 0.1\n");
        write_label(&fx.labels.join("flat.txt"), "0 0.5 0.5 0.1 0.1\n");

        let outcome =
            validate_dataset(&fx.images, &fx.labels, &ValidateOptions::default()).expect("run");
        let report = &outcome.report;

        assert_eq!(
            report.corrupted_image_files,
            vec!["broken.png", "flat.bmp", "lonely.jpg"]
        );
        assert_eq!(report.missing_label_images, vec!["lonely.jpg"]);
        assert_eq!(report.empty_label_files, vec!["good.txt"]);
        assert!(report.orphan_label_files.is_empty());

        assert_eq!(outcome.dataset.annotations.len(), 1);
        let good = &outcome.dataset.annotations[0];
        assert_eq!((good.width, good.height), (200, 100));
        assert!(!good.has_objects());
    }

    #[test]
    fn classes_txt_is_orphan_by_default() {
        let fx = fixture();
        write_bmp(&fx.images.join("x.bmp"), 10, 10);
        write_label(&fx.labels.join("x.txt"), "1 0.5 0.5 1.0 1.0\n");
        write_label(&fx.labels.join("classes.txt"), "cat\n\ndog\n");

        let outcome =
            validate_dataset(&fx.images, &fx.labels, &ValidateOptions::default()).expect("run");
        assert_eq!(outcome.report.orphan_label_files, vec!["classes.txt"]);
        assert_eq!(outcome.report.total_labels, 2);
        assert_eq!(
            outcome.class_names,
            ClassNames::new(vec!["cat".into(), "dog".into()])
        );
        assert_eq!(
            outcome.dataset.annotations[0].objects,
            vec![BoundingBox::from_xyxy(1, 0.0, 0.0, 10.0, 10.0)]
        );

        let opts = ValidateOptions {
            classes_txt_is_label: false,
        };
        let outcome = validate_dataset(&fx.images, &fx.labels, &opts).expect("run");
        assert!(outcome.report.orphan_label_files.is_empty());
        assert_eq!(outcome.report.total_labels, 1);
        assert_eq!(outcome.class_names.len(), 2);
    }

    #[test]
    fn duplicate_stems_pick_smallest_path() {
        let fx = fixture();
        write_bmp(&fx.images.join("b_dir/img.bmp"), 30, 30);
        write_bmp(&fx.images.join("a_dir/IMG.png"), 20, 20);
        write_label(&fx.labels.join("img.txt"), "0 0.5 0.5 0.5 0.5\n");

        let outcome =
            validate_dataset(&fx.images, &fx.labels, &ValidateOptions::default()).expect("run");

        assert_eq!(outcome.report.total_images, 1);
        assert_eq!(
            outcome.dataset.image_paths.get("img"),
            Some(&fx.images.join("a_dir/IMG.png"))
        );
    }

    #[test]
    fn dot_only_stems_never_reach_the_dataset() {
        let fx = fixture();
        write_bmp(&fx.images.join("...bmp"), 10, 10);
        write_label(&fx.labels.join("...txt"), "0 0.5 0.5 0.5 0.5\n");
        write_bmp(&fx.images.join("ok.bmp"), 10, 10);
        write_label(&fx.labels.join("ok.txt"), "0 0.5 0.5 0.5 0.5\n");

        let outcome =
            validate_dataset(&fx.images, &fx.labels, &ValidateOptions::default()).expect("run");

        let names: Vec<&str> = outcome
            .dataset
            .annotations
            .iter()
            .map(|ann| ann.image_name.as_str())
            .collect();
        assert_eq!(names, vec!["ok"]);
        assert!(outcome.dataset.check_records().is_ok());
    }

    #[test]
    fn missing_root_is_fatal() {
        let fx = fixture();
        let err = validate_dataset(
            &fx.images.join("nope"),
            &fx.labels,
            &ValidateOptions::default(),
        )
        .expect_err("should fail");
        assert!(matches!(err, LabelforgeError::RootNotDirectory { .. }));
    }
}
