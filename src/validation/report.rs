//! Validation report for one matcher run.
//!
//! The report is plain data: counts, the class ids seen, and sorted file
//! name lists for every defect category. It serializes to JSON with exactly
//! these field names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Aggregate outcome of matching an images tree against a labels tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Distinct image stems found.
    pub total_images: usize,

    /// Distinct label stems found.
    pub total_labels: usize,

    pub missing_labels: usize,
    pub orphan_labels: usize,
    pub empty_labels: usize,
    pub corrupted_images: usize,

    /// Sorted distinct class ids across all decoded boxes.
    pub class_ids_found: Vec<u32>,

    pub missing_label_images: Vec<String>,
    pub orphan_label_files: Vec<String>,
    pub empty_label_files: Vec<String>,
    pub corrupted_image_files: Vec<String>,
}

impl ValidationReport {
    /// Total number of defect entries across all categories.
    pub fn defect_count(&self) -> usize {
        self.missing_labels + self.orphan_labels + self.empty_labels + self.corrupted_images
    }

    /// Returns true if no defect of any kind was found.
    pub fn is_clean(&self) -> bool {
        self.defect_count() == 0
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Images: {}  Labels: {}  Classes: {}",
            self.total_images,
            self.total_labels,
            format_class_ids(&self.class_ids_found)
        )?;

        if self.is_clean() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation found {} issue(s):",
            self.defect_count()
        )?;

        write_section(f, "missing labels", &self.missing_label_images)?;
        write_section(f, "orphan labels", &self.orphan_label_files)?;
        write_section(f, "empty labels", &self.empty_label_files)?;
        write_section(f, "corrupted images", &self.corrupted_image_files)?;

        Ok(())
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, title: &str, files: &[String]) -> fmt::Result {
    if files.is_empty() {
        return Ok(());
    }

    writeln!(f)?;
    writeln!(f, "  {} ({}):", title, files.len())?;
    for file in files {
        writeln!(f, "    {}", file)?;
    }
    Ok(())
}

fn format_class_ids(ids: &[u32]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
