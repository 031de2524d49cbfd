//! Positional class-name tables.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LabelforgeError;

/// Largest table a `data.yaml` index mapping may expand to; gaps are filled
/// with synthesized names, so a sparse high key would otherwise allocate
/// without bound.
const MAX_MAPPED_CLASSES: usize = 1 << 16;

/// An ordered list of class names where position `i` names class id `i`.
///
/// The table is only trusted when it covers every class id in use; otherwise
/// every id gets a synthesized `class_<id>` name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassNames(Vec<String>);

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Parses a `classes.txt` body: one name per non-empty line, trimmed.
    pub fn from_lines(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        )
    }

    /// Reads a class table from `path`.
    ///
    /// `.yaml`/`.yml` files are read as a YOLO `data.yaml` (`names:` as a list
    /// or an index mapping); anything else is read as `classes.txt`.
    pub fn read(path: &Path) -> Result<Self, LabelforgeError> {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let text = fs::read_to_string(path).map_err(LabelforgeError::Io)?;
        if is_yaml {
            Self::from_data_yaml(&text, path)
        } else {
            Ok(Self::from_lines(&text))
        }
    }

    fn from_data_yaml(text: &str, path: &Path) -> Result<Self, LabelforgeError> {
        #[derive(Deserialize)]
        struct DataYaml {
            names: DataYamlNames,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DataYamlNames {
            Sequence(Vec<String>),
            Mapping(BTreeMap<usize, String>),
        }

        let parsed: DataYaml =
            serde_yaml::from_str(text).map_err(|source| LabelforgeError::ClassNamesParse {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?;

        let names = match parsed.names {
            DataYamlNames::Sequence(names) => names,
            DataYamlNames::Mapping(mapping) => {
                let len = match mapping.keys().next_back() {
                    None => 0,
                    Some(&max) => max
                        .checked_add(1)
                        .filter(|&len| len <= MAX_MAPPED_CLASSES)
                        .ok_or_else(|| LabelforgeError::ClassNamesParse {
                            path: path.to_path_buf(),
                            message: format!(
                                "class index {max} exceeds the limit of {}",
                                MAX_MAPPED_CLASSES - 1
                            ),
                        })?,
                };
                let mut names: Vec<String> = (0..len).map(synthesized_name_usize).collect();
                for (index, name) in mapping {
                    if !name.trim().is_empty() {
                        names[index] = name;
                    }
                }
                names
            }
        };

        Ok(Self(names))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// True when every id in `class_ids` has a positional entry.
    pub fn covers(&self, class_ids: &[u32]) -> bool {
        class_ids
            .iter()
            .all(|&id| (id as usize) < self.0.len())
    }

    /// Names for `class_ids`, in the same order.
    pub fn resolve(&self, class_ids: &[u32]) -> Vec<String> {
        let trusted = self.covers(class_ids);
        class_ids
            .iter()
            .map(|&id| {
                if trusted {
                    self.0[id as usize].clone()
                } else {
                    synthesized_name(id)
                }
            })
            .collect()
    }

    /// `(class_id, name)` pairs for `class_ids`.
    pub fn resolve_map(&self, class_ids: &[u32]) -> BTreeMap<u32, String> {
        class_ids
            .iter()
            .copied()
            .zip(self.resolve(class_ids))
            .collect()
    }
}

/// The placeholder name used when no table entry can be trusted.
pub fn synthesized_name(class_id: u32) -> String {
    format!("class_{class_id}")
}

fn synthesized_name_usize(index: usize) -> String {
    format!("class_{index}")
}
