use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::frame::Frame;

/// Where the artifact lives unless `MODEL_DIR` says otherwise.
pub const DEFAULT_MODEL_DIR: &str = "/opt/ml/model";

const MANIFEST_FILE: &str = "predictor.json";

/// `predictor.json` at the root of the model directory: the feature order
/// the graphs were trained with, the class labels, and the constituent
/// sub-models with their ensemble weights.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorManifest {
    pub feature_columns: Vec<String>,
    pub class_labels: Vec<String>,
    pub models: Vec<SubModelSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubModelSpec {
    pub file: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

type RunnablePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

struct SubModel {
    plan: RunnablePlan,
    weight: f32,
}

/// Anything that can turn a feature frame into per-class probabilities.
pub trait ProbabilityModel: Send + Sync {
    fn predict_proba(&self, frame: &Frame) -> Result<Frame>;
}

/// The loaded artifact. Immutable once constructed; share it by reference.
pub struct TabularPredictor {
    feature_columns: Vec<String>,
    class_labels: Vec<String>,
    models: Vec<SubModel>,
}

impl TabularPredictor {
    /// Loads the manifest and builds an optimized runnable plan for every
    /// sub-model up front, so no graph loads lazily mid-request.
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let manifest_path = model_dir.join(MANIFEST_FILE);
        let manifest = fs::read_to_string(&manifest_path)
            .with_context(|| format!("reading {}", manifest_path.display()))?;
        let manifest: PredictorManifest = serde_json::from_str(&manifest)
            .with_context(|| format!("decoding {}", manifest_path.display()))?;

        if manifest.feature_columns.is_empty() {
            bail!("manifest lists no feature columns");
        }
        if manifest.class_labels.len() < 2 {
            bail!(
                "manifest lists {} class labels, need at least 2",
                manifest.class_labels.len()
            );
        }
        if manifest.models.is_empty() {
            bail!("manifest lists no sub-models");
        }
        let weights = normalized(manifest.models.iter().map(|m| m.weight).collect())?;

        let n_features = manifest.feature_columns.len();
        let mut models = Vec::with_capacity(manifest.models.len());
        for (spec, weight) in manifest.models.iter().zip(weights) {
            let path = model_dir.join(&spec.file);
            let plan = tract_onnx::onnx()
                .model_for_path(&path)
                .with_context(|| format!("reading {}", path.display()))?
                .with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, n_features)),
                )?
                .into_optimized()?
                .into_runnable()?;
            models.push(SubModel { plan, weight });
        }

        Ok(Self {
            feature_columns: manifest.feature_columns,
            class_labels: manifest.class_labels,
            models,
        })
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    fn predict_row(&self, row: &[f32]) -> Result<Vec<f32>> {
        let mut blended = vec![0.0f32; self.class_labels.len()];
        for model in &self.models {
            let input = Tensor::from_shape(&[1, row.len()], row)?;
            let outputs = model.plan.run(tvec!(input.into()))?;
            let raw: Vec<f32> = outputs[0].to_array_view::<f32>()?.iter().copied().collect();
            let probs = to_probabilities(&raw, self.class_labels.len())?;
            for (acc, p) in blended.iter_mut().zip(probs) {
                *acc += model.weight * p;
            }
        }
        Ok(blended)
    }
}

impl ProbabilityModel for TabularPredictor {
    fn predict_proba(&self, frame: &Frame) -> Result<Frame> {
        let rows = feature_matrix(&self.feature_columns, frame)?;
        let mut data: Vec<Vec<f32>> = self
            .class_labels
            .iter()
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();
        for row in &rows {
            let probs = self.predict_row(row)?;
            for (column, p) in data.iter_mut().zip(probs) {
                column.push(p);
            }
        }
        Frame::from_parts(self.class_labels.clone(), frame.index().to_vec(), data)
    }
}

/// The frame's rows restricted to `columns`, in that order.
fn feature_matrix(columns: &[String], frame: &Frame) -> Result<Vec<Vec<f32>>> {
    let mut selected = Vec::with_capacity(columns.len());
    for name in columns {
        match frame.column(name) {
            Some(column) => selected.push(column),
            None => bail!("request frame has no \"{}\" column", name),
        }
    }
    Ok((0..frame.n_rows())
        .map(|r| selected.iter().map(|column| column[r]).collect())
        .collect())
}

/// Single-output binary graphs emit one logit for the positive class;
/// everything else emits one logit per class.
fn to_probabilities(raw: &[f32], n_classes: usize) -> Result<Vec<f32>> {
    if raw.len() == 1 && n_classes == 2 {
        let p = logistic(raw[0]);
        Ok(vec![1.0 - p, p])
    } else if raw.len() == n_classes {
        Ok(softmax(raw))
    } else {
        bail!(
            "sub-model produced {} outputs for {} class labels",
            raw.len(),
            n_classes
        )
    }
}

fn logistic(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(raw: &[f32]) -> Vec<f32> {
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|x| (x - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn normalized(weights: Vec<f32>) -> Result<Vec<f32>> {
    let total: f32 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        bail!("ensemble weights sum to {}, expected a positive total", total);
    }
    Ok(weights.into_iter().map(|w| w / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_weight_defaults_to_one() {
        let manifest: PredictorManifest = serde_json::from_str(
            r#"{
                "feature_columns": ["age", "income"],
                "class_labels": ["no", "yes"],
                "models": [{"file": "gbm.onnx"}, {"file": "nn.onnx", "weight": 3.0}]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.models[0].weight, 1.0);
        assert_eq!(manifest.models[1].weight, 3.0);
    }

    #[test]
    fn weights_normalize_to_a_unit_total() {
        let weights = normalized(vec![1.0, 3.0]).unwrap();
        assert_eq!(weights, [0.25, 0.75]);
    }

    #[test]
    fn degenerate_weights_are_rejected() {
        assert!(normalized(vec![0.0, 0.0]).is_err());
        assert!(normalized(vec![f32::NAN]).is_err());
    }

    #[test]
    fn softmax_sums_to_one_and_preserves_order() {
        let probs = softmax(&[1.0, 2.0, 0.5]);
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
        assert!(probs.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn softmax_survives_large_logits() {
        let probs = softmax(&[1000.0, 0.0]);
        assert!((probs[0] - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn lone_logit_maps_to_binary_probabilities() {
        let probs = to_probabilities(&[0.0], 2).unwrap();
        assert_eq!(probs, [0.5, 0.5]);
        let probs = to_probabilities(&[4.0], 2).unwrap();
        assert!(probs[1] > 0.95);
        assert!((probs[0] + probs[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn output_width_must_match_class_count() {
        assert!(to_probabilities(&[0.1, 0.2], 3).is_err());
        assert!(to_probabilities(&[0.1], 3).is_err());
    }

    #[test]
    fn feature_matrix_follows_manifest_order() {
        let frame = Frame::from_json(r#"[{"income": 50000, "age": 34}]"#).unwrap();
        let columns = vec!["age".to_string(), "income".to_string()];
        let rows = feature_matrix(&columns, &frame).unwrap();
        assert_eq!(rows, [[34.0, 50000.0]]);
    }

    #[test]
    fn feature_matrix_rejects_missing_columns() {
        let frame = Frame::from_json(r#"[{"age": 34}]"#).unwrap();
        let columns = vec!["age".to_string(), "income".to_string()];
        let err = feature_matrix(&columns, &frame).unwrap_err();
        assert!(err.to_string().contains("income"));
    }

    #[test]
    fn missing_artifact_fails_to_load() {
        assert!(TabularPredictor::load("/nonexistent/model/dir").is_err());
    }
}
