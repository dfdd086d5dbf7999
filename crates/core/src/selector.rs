//! Turns per-label probabilities into the labels a document is filed under.

use crate::error::TriageError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Every label at or above the threshold; argmax when none qualifies.
    #[default]
    Threshold,
    /// Always the single most probable label.
    Argmax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Selection {
    ThresholdMatch { labels: Vec<usize> },
    BestGuess { label: usize },
}

impl Selection {
    /// Label indices in ascending order; never empty.
    pub fn labels(&self) -> Vec<usize> {
        match self {
            Selection::ThresholdMatch { labels } => labels.clone(),
            Selection::BestGuess { label } => vec![*label],
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            Selection::ThresholdMatch { .. } => "threshold_match",
            Selection::BestGuess { .. } => "best_guess",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LabelSelector {
    threshold: f32,
    policy: SelectionPolicy,
}

impl LabelSelector {
    pub fn new(threshold: f32, policy: SelectionPolicy) -> Result<Self, TriageError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(TriageError::Config(format!(
                "acceptance threshold {threshold} outside [0, 1]"
            )));
        }
        Ok(Self { threshold, policy })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn select(&self, probabilities: &[f32]) -> Result<Selection, TriageError> {
        if probabilities.is_empty() {
            return Err(TriageError::Classification(
                "no probabilities to select from".into(),
            ));
        }
        if self.policy == SelectionPolicy::Threshold {
            let labels: Vec<usize> = probabilities
                .iter()
                .enumerate()
                .filter(|(_, p)| **p >= self.threshold)
                .map(|(i, _)| i)
                .collect();
            if !labels.is_empty() {
                return Ok(Selection::ThresholdMatch { labels });
            }
        }
        Ok(Selection::BestGuess {
            label: argmax(probabilities),
        })
    }
}

/// First index of the maximum; NaN never wins.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, v) in values.iter().enumerate() {
        let v = if v.is_nan() { f32::NEG_INFINITY } else { *v };
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
