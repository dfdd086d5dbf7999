//! One-vs-rest linear classifier: one logistic model per label.

use crate::{LabelModel, ProviderError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearArtifact {
    pub labels: Vec<String>,
    /// One row of input weights per label.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OneVsRestLinear {
    labels: Vec<String>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    dim: usize,
}

impl OneVsRestLinear {
    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::model_load(display.clone(), e))?;
        let artifact: LinearArtifact =
            serde_json::from_str(&raw).map_err(|e| ProviderError::model_load(display.clone(), e))?;
        Self::from_artifact(artifact).map_err(|e| ProviderError::model_load(display, e))
    }

    pub fn from_artifact(artifact: LinearArtifact) -> Result<Self, ProviderError> {
        let k = artifact.labels.len();
        if k == 0 {
            return Err(ProviderError::Encoding("classifier has no labels".into()));
        }
        if artifact.weights.len() != k || artifact.bias.len() != k {
            return Err(ProviderError::Encoding(format!(
                "expected {k} weight rows and biases, got {} and {}",
                artifact.weights.len(),
                artifact.bias.len()
            )));
        }
        let dim = artifact.weights[0].len();
        if let Some(row) = artifact.weights.iter().find(|r| r.len() != dim) {
            return Err(ProviderError::DimensionMismatch {
                expected: dim,
                actual: row.len(),
            });
        }
        Ok(Self {
            labels: artifact.labels,
            weights: artifact.weights,
            bias: artifact.bias,
            dim,
        })
    }

    /// Reorders the per-label models to follow `order`.
    ///
    /// Fails when the two label sets differ: a label outside `order` could
    /// never be routed, and a missing one could never be predicted.
    pub fn aligned_to(self, order: &[String]) -> Result<Self, ProviderError> {
        if let Some(extra) = self.labels.iter().find(|l| !order.contains(l)) {
            return Err(ProviderError::Encoding(format!(
                "classifier label {extra:?} is not part of the taxonomy"
            )));
        }
        let mut weights = Vec::with_capacity(order.len());
        let mut bias = Vec::with_capacity(order.len());
        for label in order {
            let idx = self
                .labels
                .iter()
                .position(|l| l == label)
                .ok_or_else(|| {
                    ProviderError::Encoding(format!("classifier has no model for label {label:?}"))
                })?;
            weights.push(self.weights[idx].clone());
            bias.push(self.bias[idx]);
        }
        Ok(Self {
            labels: order.to_vec(),
            weights,
            bias,
            dim: self.dim,
        })
    }
}

impl LabelModel for OneVsRestLinear {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_dimension(&self) -> usize {
        self.dim
    }

    fn predict_proba(&self, vector: &[f32]) -> Result<Vec<f32>, ProviderError> {
        if vector.len() != self.dim {
            return Err(ProviderError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        Ok(self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z: f32 = row.iter().zip(vector).map(|(w, x)| w * x).sum::<f32>() + b;
                sigmoid(z)
            })
            .collect())
    }
}

fn sigmoid(z: f32) -> f32 {
    if z.is_nan() {
        return 0.0;
    }
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OneVsRestLinear {
        OneVsRestLinear::from_artifact(LinearArtifact {
            labels: vec!["a".into(), "b".into(), "c".into()],
            weights: vec![vec![4.0, 0.0], vec![0.0, 4.0], vec![-4.0, -4.0]],
            bias: vec![-2.0, -2.0, 0.0],
        })
        .unwrap()
    }

    #[test]
    fn probabilities_have_one_entry_per_label_in_unit_range() {
        let m = model();
        for v in [[0.0, 0.0], [1.0, 0.0], [1e6, -1e6]] {
            let p = m.predict_proba(&v).unwrap();
            assert_eq!(p.len(), 3);
            assert!(p.iter().all(|x| (0.0..=1.0).contains(x)));
        }
    }

    #[test]
    fn rejects_wrong_dimension() {
        let err = model().predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::DimensionMismatch { expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn alignment_reorders_rows() {
        let order = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let m = model().aligned_to(&order).unwrap();
        assert_eq!(m.labels(), order.as_slice());
        let p = m.predict_proba(&[1.0, 0.0]).unwrap();
        assert!(p[1] > 0.8);
    }

    #[test]
    fn alignment_rejects_foreign_label() {
        let order = vec!["a".to_string(), "b".to_string()];
        assert!(model().aligned_to(&order).is_err());
    }

    #[test]
    fn alignment_rejects_missing_label() {
        let order = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(model().aligned_to(&order).is_err());
    }

    #[test]
    fn ragged_weights_are_rejected() {
        let artifact = LinearArtifact {
            labels: vec!["a".into(), "b".into()],
            weights: vec![vec![1.0, 2.0], vec![1.0]],
            bias: vec![0.0, 0.0],
        };
        assert!(OneVsRestLinear::from_artifact(artifact).is_err());
    }
}
