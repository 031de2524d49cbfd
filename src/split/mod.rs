//! Deterministic train/valid/test splitting.
//!
//! Only annotations with at least one object take part. The eligible list is
//! shuffled with a generator seeded per call, then cut at
//! `floor(N * train)` and `floor(N * train) + floor(N * val)`; everything
//! after the second cut is test.

use std::fmt;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::LabelforgeError;
use crate::ir::ImageAnnotation;

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 42;

const RATIO_SUM_TOLERANCE: f64 = 1e-6;

/// One of the three output subsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    /// Directory name in export trees.
    pub fn dir_name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }

    /// Key used in `data.yaml`.
    pub fn yaml_key(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Fractions of the eligible list assigned to each split.
///
/// `test` only takes part in validation: the test split always receives the
/// remainder after the train and valid cuts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.2,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Self {
        Self { train, val, test }
    }

    /// Rejects non-finite or negative ratios and ratios not summing to 1.
    pub fn validate(&self) -> Result<(), LabelforgeError> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !value.is_finite() || value < 0.0 {
                return Err(LabelforgeError::InvalidSplitRatios {
                    message: format!("{name} ratio must be a finite non-negative number, got {value}"),
                });
            }
        }

        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(LabelforgeError::InvalidSplitRatios {
                message: format!("ratios must sum to 1.0, got {sum}"),
            });
        }

        Ok(())
    }
}

/// The three subsets, each in shuffled order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitResult<'a> {
    pub train: Vec<&'a ImageAnnotation>,
    pub valid: Vec<&'a ImageAnnotation>,
    pub test: Vec<&'a ImageAnnotation>,
}

impl<'a> SplitResult<'a> {
    pub fn get(&self, split: Split) -> &[&'a ImageAnnotation] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    /// Member stems of `split` in split order.
    pub fn stems(&self, split: Split) -> Vec<&'a str> {
        self.get(split)
            .iter()
            .map(|ann| ann.image_name.as_str())
            .collect()
    }

    /// `(split, members)` pairs for every split, empty ones included.
    pub fn iter(&self) -> impl Iterator<Item = (Split, &'_ [&'a ImageAnnotation])> + '_ {
        Split::ALL.into_iter().map(move |split| (split, self.get(split)))
    }

    /// Splits with at least one member, in train/valid/test order.
    pub fn present_splits(&self) -> Vec<Split> {
        self.iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(split, _)| split)
            .collect()
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }
}

/// Splits `annotations` into train/valid/test with a fixed seed.
///
/// The same input list and seed always produce the same three subsets.
pub fn split_annotations<'a>(
    annotations: &'a [ImageAnnotation],
    ratios: &SplitRatios,
    seed: u64,
) -> Result<SplitResult<'a>, LabelforgeError> {
    ratios.validate()?;

    let mut eligible: Vec<&ImageAnnotation> =
        annotations.iter().filter(|ann| ann.has_objects()).collect();
    let skipped = annotations.len() - eligible.len();

    let mut rng = StdRng::seed_from_u64(seed);
    eligible.shuffle(&mut rng);

    let total = eligible.len();
    let train_end = cut(total, ratios.train);
    let val_end = (train_end + cut(total, ratios.val)).min(total);

    let test = eligible.split_off(val_end);
    let valid = eligible.split_off(train_end);
    let train = eligible;

    log::info!(
        "split {} annotation(s) with seed {}: train {}, valid {}, test {} ({} without objects skipped)",
        total,
        seed,
        train.len(),
        valid.len(),
        test.len(),
        skipped
    );

    Ok(SplitResult { train, valid, test })
}

fn cut(total: usize, ratio: f64) -> usize {
    ((total as f64 * ratio).floor() as usize).min(total)
}
