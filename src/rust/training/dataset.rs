use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierError;

/// One labeled row of the training set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    #[serde(rename = "type", alias = "label", alias = "intent")]
    pub label: String,
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }
}

/// A validated, non-empty collection of training examples.
#[derive(Debug, Clone)]
pub struct Dataset {
    examples: Vec<TrainingExample>,
}

impl Dataset {
    /// Builds a dataset, rejecting empty input and rows with an empty text or label.
    pub fn new(examples: Vec<TrainingExample>) -> Result<Self, ClassifierError> {
        if examples.is_empty() {
            return Err(ClassifierError::DatasetError("Dataset is empty".into()));
        }
        for (i, example) in examples.iter().enumerate() {
            if example.text.trim().is_empty() {
                return Err(ClassifierError::DatasetError(format!("Example {} has an empty text", i + 1)));
            }
            if example.label.trim().is_empty() {
                return Err(ClassifierError::DatasetError(format!("Example {} has an empty label", i + 1)));
            }
        }
        Ok(Self { examples })
    }

    /// Reads a CSV file whose header names a `text` column and a `type` (or `label`,
    /// `intent`) column. Other columns are ignored.
    pub fn from_csv_path(path: &Path) -> Result<Self, ClassifierError> {
        let file = File::open(path).map_err(|e| {
            ClassifierError::DatasetError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ClassifierError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut examples = Vec::new();
        for (i, record) in reader.deserialize::<TrainingExample>().enumerate() {
            let example = record.map_err(|e| {
                // Line 1 is the header
                ClassifierError::DatasetError(format!("Invalid row on line {}: {}", i + 2, e))
            })?;
            examples.push(example);
        }
        Self::new(examples)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn texts(&self) -> Vec<String> {
        self.examples.iter().map(|e| e.text.clone()).collect()
    }

    /// Number of examples per label, ordered by label.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for example in &self.examples {
            *counts.entry(example.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted distinct labels and each example's index into them.
    pub fn encode_labels(&self) -> (Vec<String>, Vec<usize>) {
        let labels: Vec<String> = self.label_counts().keys().map(|l| l.to_string()).collect();
        let targets = self
            .examples
            .iter()
            .map(|e| labels.binary_search(&e.label).unwrap_or_default())
            .collect();
        (labels, targets)
    }

    /// Checks that a stratified split can place every label in both partitions.
    pub fn validate_for_split(&self) -> Result<(), ClassifierError> {
        let counts = self.label_counts();
        if counts.len() < 2 {
            return Err(ClassifierError::DatasetError(format!(
                "At least two distinct labels are required, found {}",
                counts.len()
            )));
        }
        let too_small: Vec<String> = counts
            .iter()
            .filter(|(_, &count)| count < 2)
            .map(|(label, count)| format!("'{}' ({})", label, count))
            .collect();
        if !too_small.is_empty() {
            return Err(ClassifierError::DatasetError(format!(
                "Every label needs at least 2 examples for a stratified split; too few for {}",
                too_small.join(", ")
            )));
        }
        Ok(())
    }
}
