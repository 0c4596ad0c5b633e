// src/agent/policy.rs

//! Policy abstraction for the learned agent.
//!
//! A policy is an opaque decision function trained elsewhere. The agent only
//! needs "last observation in, sample index out"; how the policy was trained
//! and what it computes internally is not our concern.
//!
//! - [`Policy`]: the decision function the learned agent forwards to
//! - [`PolicyLoader`]: turns a model-artifact location into a `Policy`
//! - [`PolicyArtifact`]: the JSON artifact format shipped with trained models
//!   (tabular lookup or a small dense network)
//! - [`FnPolicy`]: wraps a closure, for callers that already hold a policy in
//!   memory

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::measurement::{Observation, SampleIndex};

/// A trained decision function.
///
/// Implementations should be pure: the same observation gives the same
/// answer. Output is *not* guaranteed to be a valid sample index; the learned
/// agent checks it.
pub trait Policy: Send + Sync {
    /// Version or checkpoint identifier, for logging.
    fn version(&self) -> &str;

    /// Pick the next sample. `None` means no measurement has been made yet.
    fn decide(&self, last: Option<Observation>) -> SampleIndex;
}

/// Loads a policy from a model-artifact location.
pub trait PolicyLoader {
    /// Load and shape-check the artifact at `path` for `sample_count` samples.
    fn load(&self, path: &Path, sample_count: usize) -> Result<Box<dyn Policy>, AgentError>;
}

/// Loader for JSON [`PolicyArtifact`] files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPolicyLoader;

impl PolicyLoader for JsonPolicyLoader {
    fn load(&self, path: &Path, sample_count: usize) -> Result<Box<dyn Policy>, AgentError> {
        let model_load = |reason: String| AgentError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| model_load(e.to_string()))?;
        let artifact: PolicyArtifact =
            serde_json::from_str(&raw).map_err(|e| model_load(format!("malformed artifact: {e}")))?;
        artifact.validate(sample_count).map_err(model_load)?;

        tracing::info!(
            path = %path.display(),
            version = %artifact.version,
            model = artifact.model.type_name(),
            "Loaded policy artifact"
        );
        Ok(Box::new(artifact))
    }
}

/// Serialized trained policy.
///
/// ```json
/// {
///   "version": "ppo-xrd-2024-03",
///   "model": {
///     "type": "table",
///     "bin_edges": [0.1, 0.5],
///     "actions": [[1, 1, 2], [2, 0, 0], [0, 1, 1]]
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyArtifact {
    /// Checkpoint identifier.
    pub version: String,
    /// The decision function.
    pub model: PolicyModel,
}

/// Model family stored in a [`PolicyArtifact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyModel {
    /// Lookup table indexed by `[current_sample][quality_bin]`.
    ///
    /// `bin_edges` must be ascending; a quality falls in bin `k` where `k` is
    /// the number of edges less than or equal to it.
    Table {
        /// Quality bin boundaries.
        bin_edges: Vec<f64>,
        /// Next sample per `[current_sample][quality_bin]`.
        actions: Vec<Vec<SampleIndex>>,
        /// Action taken before any measurement exists.
        #[serde(default)]
        initial: SampleIndex,
    },
    /// Feed-forward network. Input is one-hot(current sample) followed by the
    /// quality; hidden layers use ReLU; the output is an argmax over samples.
    Dense {
        /// Layers from input to output.
        layers: Vec<DenseLayer>,
    },
}

/// One fully connected layer, `weights[out][in]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Row-major weight matrix.
    pub weights: Vec<Vec<f64>>,
    /// One bias per output.
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn input_width(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

impl PolicyModel {
    fn type_name(&self) -> &'static str {
        match self {
            PolicyModel::Table { .. } => "table",
            PolicyModel::Dense { .. } => "dense",
        }
    }
}

impl PolicyArtifact {
    /// Check that the artifact's shapes fit `sample_count` samples.
    ///
    /// Action *values* are not range-checked here; a table that names a
    /// nonexistent sample is a model bug and is reported when it is used.
    pub fn validate(&self, sample_count: usize) -> Result<(), String> {
        match &self.model {
            PolicyModel::Table {
                bin_edges, actions, ..
            } => {
                if bin_edges.iter().any(|e| !e.is_finite()) {
                    return Err("bin edges must be finite".into());
                }
                if bin_edges.windows(2).any(|w| w[0] > w[1]) {
                    return Err("bin edges must be ascending".into());
                }
                if actions.len() != sample_count {
                    return Err(format!(
                        "table has {} rows, expected one per sample ({sample_count})",
                        actions.len()
                    ));
                }
                let bins = bin_edges.len() + 1;
                if let Some((row, _)) = actions.iter().enumerate().find(|(_, r)| r.len() != bins) {
                    return Err(format!("table row {row} must have {bins} entries"));
                }
            }
            PolicyModel::Dense { layers } => {
                if layers.is_empty() {
                    return Err("dense model has no layers".into());
                }
                let mut width = sample_count + 1;
                for (index, layer) in layers.iter().enumerate() {
                    if layer.weights.is_empty() || layer.weights.len() != layer.bias.len() {
                        return Err(format!("layer {index}: weights and bias disagree"));
                    }
                    if layer.weights.iter().any(|row| row.len() != width) {
                        return Err(format!("layer {index}: expected input width {width}"));
                    }
                    width = layer.weights.len();
                }
                if width != sample_count {
                    return Err(format!(
                        "output width {width} does not match sample count {sample_count}"
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Policy for PolicyArtifact {
    fn version(&self) -> &str {
        &self.version
    }

    fn decide(&self, last: Option<Observation>) -> SampleIndex {
        match &self.model {
            PolicyModel::Table {
                bin_edges,
                actions,
                initial,
            } => match last {
                None => *initial,
                Some(obs) => {
                    let bin = bin_edges.partition_point(|edge| *edge <= obs.quality);
                    actions
                        .get(obs.sample)
                        .and_then(|row| row.get(bin))
                        .copied()
                        // Unreachable for validated tables; an out-of-range
                        // index is reported by the agent.
                        .unwrap_or(actions.len())
                }
            },
            PolicyModel::Dense { layers } => {
                let width = layers.first().map_or(0, DenseLayer::input_width);
                let mut activation = vec![0.0; width];
                if let Some(obs) = last {
                    if let Some(slot) = activation.get_mut(obs.sample) {
                        *slot = 1.0;
                    }
                    if let Some(q) = activation.last_mut() {
                        *q = obs.quality;
                    }
                }
                let last_layer = layers.len().saturating_sub(1);
                for (index, layer) in layers.iter().enumerate() {
                    activation = layer.forward(&activation);
                    if index < last_layer {
                        activation.iter_mut().for_each(|v| *v = v.max(0.0));
                    }
                }
                argmax(&activation)
            }
        }
    }
}

/// First index of the maximum value; NaNs never win.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (index, value) in values.iter().enumerate() {
        if *value > best_value {
            best = index;
            best_value = *value;
        }
    }
    best
}

/// Adapts a closure into a [`Policy`].
pub struct FnPolicy<F> {
    version: String,
    decide: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(Option<Observation>) -> SampleIndex + Send + Sync,
{
    /// Wrap `decide` under the given version string.
    pub fn new(version: impl Into<String>, decide: F) -> Self {
        Self {
            version: version.into(),
            decide,
        }
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(Option<Observation>) -> SampleIndex + Send + Sync,
{
    fn version(&self) -> &str {
        &self.version
    }

    fn decide(&self, last: Option<Observation>) -> SampleIndex {
        (self.decide)(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table() -> PolicyArtifact {
        PolicyArtifact {
            version: "test-table".into(),
            model: PolicyModel::Table {
                bin_edges: vec![0.1, 0.5],
                actions: vec![vec![1, 1, 2], vec![2, 0, 0], vec![0, 1, 1]],
                initial: 2,
            },
        }
    }

    #[test]
    fn test_table_bins() {
        let policy = table();
        assert!(policy.validate(3).is_ok());
        assert_eq!(policy.decide(None), 2);
        let obs = |sample, quality| Some(Observation { sample, quality });
        assert_eq!(policy.decide(obs(0, 0.05)), 1);
        assert_eq!(policy.decide(obs(0, 0.1)), 1);
        assert_eq!(policy.decide(obs(0, 0.9)), 2);
        assert_eq!(policy.decide(obs(1, 0.3)), 0);
    }

    #[test]
    fn test_table_shape_mismatch() {
        assert!(table().validate(4).is_err());
    }

    #[test]
    fn test_dense_forward() {
        // Two samples: output prefers "the other" sample once quality is high.
        let artifact = PolicyArtifact {
            version: "test-dense".into(),
            model: PolicyModel::Dense {
                layers: vec![
                    DenseLayer {
                        weights: vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                        bias: vec![0.0, 0.0],
                    },
                    DenseLayer {
                        weights: vec![vec![0.0, 1.0], vec![1.0, 0.0]],
                        bias: vec![0.1, 0.0],
                    },
                ],
            },
        };
        assert!(artifact.validate(2).is_ok());
        assert_eq!(artifact.decide(None), 0);
        let at = |sample| {
            Some(Observation {
                sample,
                quality: 0.5,
            })
        };
        assert_eq!(artifact.decide(at(0)), 1);
        assert_eq!(artifact.decide(at(1)), 0);
    }

    #[test]
    fn test_dense_output_width_checked() {
        let artifact = PolicyArtifact {
            version: "bad".into(),
            model: PolicyModel::Dense {
                layers: vec![DenseLayer {
                    weights: vec![vec![0.0; 3]; 3],
                    bias: vec![0.0; 3],
                }],
            },
        };
        assert!(artifact.validate(2).is_err());
    }

    #[test]
    fn test_loader_reads_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&table()).unwrap()).unwrap();

        let policy = JsonPolicyLoader.load(file.path(), 3).unwrap();
        assert_eq!(policy.version(), "test-table");
    }

    #[test]
    fn test_loader_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not a model").unwrap();

        let err = JsonPolicyLoader.load(file.path(), 3).err().unwrap();
        assert!(matches!(err, AgentError::ModelLoad { .. }));
    }

    #[test]
    fn test_fn_policy() {
        let policy = FnPolicy::new("fn", |last: Option<Observation>| {
            last.map_or(0, |o| o.sample + 1)
        });
        assert_eq!(policy.decide(None), 0);
        assert_eq!(
            policy.decide(Some(Observation {
                sample: 4,
                quality: 0.0
            })),
            5
        );
    }
}
