//! Trained classifier behind a narrow adapter.
//!
//! Artifacts live in a model directory:
//!
//! - `model.json`: a random forest with named feature columns, global feature
//!   importances, and trees of split/leaf nodes. Leaves hold `[p_fail, p_pass]`.
//! - `encoders.json`: categorical vocabularies (see [`EncoderFile`]).
//!
//! A missing or rejected model leaves the adapter unavailable; every call then
//! returns `None` and callers fall back to the rule-based path.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ModelError;
use crate::features::{
    feature_index, CategoricalEncoders, EncoderFile, FeatureVector, ENCODER_VERSION, FEATURE_COUNT,
};

pub const MODEL_VERSION: u32 = 1;
pub const MODEL_FILE: &str = "model.json";
pub const ENCODERS_FILE: &str = "encoders.json";

/// Class probabilities as `(p_pass, p_fail)`.
pub type ClassProbabilities = (f64, f64);

pub trait Classifier: Send + Sync {
    /// One `[p_fail, p_pass]` row per input row, in input order.
    fn predict_proba(&self, rows: &[FeatureVector]) -> Vec<[f64; 2]>;

    /// Global importance per canonical feature position.
    fn feature_importances(&self) -> &FeatureVector;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceEntry {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeFile {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: [f64; 2],
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeFile {
    pub nodes: Vec<NodeFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestFile {
    pub version: u32,
    pub feature_columns: Vec<String>,
    #[serde(default)]
    pub feature_importance: Vec<ImportanceEntry>,
    pub trees: Vec<TreeFile>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf([f64; 2]),
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf(&self, row: &FeatureVector) -> [f64; 2] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Averaged-probability decision forest over the canonical feature order.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<Tree>,
    importances: FeatureVector,
}

impl RandomForest {
    pub fn from_file(file: ForestFile) -> Result<Self, ModelError> {
        if file.version != MODEL_VERSION {
            return Err(ModelError::Version {
                found: file.version,
                expected: MODEL_VERSION,
            });
        }

        // Artifact column i -> canonical vector position.
        let mapping = file
            .feature_columns
            .iter()
            .map(|column| {
                feature_index(column).ok_or_else(|| ModelError::UnknownFeature(column.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut importances = [0.0; FEATURE_COUNT];
        for entry in &file.feature_importance {
            let index = feature_index(&entry.feature)
                .ok_or_else(|| ModelError::UnknownFeature(entry.feature.clone()))?;
            importances[index] = entry.importance;
        }

        if file.trees.is_empty() {
            return Err(ModelError::MalformedTree {
                tree: 0,
                reason: "forest has no trees".to_string(),
            });
        }

        let trees = file
            .trees
            .into_iter()
            .enumerate()
            .map(|(tree_index, tree)| convert_tree(tree_index, tree, &mapping))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { trees, importances })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: &FeatureVector) -> [f64; 2] {
        let mut totals = [0.0, 0.0];
        for tree in &self.trees {
            let leaf = tree.leaf(row);
            totals[0] += leaf[0];
            totals[1] += leaf[1];
        }
        let count = self.trees.len() as f64;
        [totals[0] / count, totals[1] / count]
    }
}

// Children must point forward so traversal always terminates.
fn convert_tree(tree_index: usize, tree: TreeFile, mapping: &[usize]) -> Result<Tree, ModelError> {
    let malformed = |reason: String| ModelError::MalformedTree {
        tree: tree_index,
        reason,
    };

    if tree.nodes.is_empty() {
        return Err(malformed("tree has no nodes".to_string()));
    }

    let len = tree.nodes.len();
    let mut nodes = Vec::with_capacity(len);
    for (index, node) in tree.nodes.into_iter().enumerate() {
        let node = match node {
            NodeFile::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let feature = *mapping.get(feature).ok_or_else(|| {
                    malformed(format!("node {index} splits on unknown column {feature}"))
                })?;
                if left <= index || right <= index || left >= len || right >= len {
                    return Err(malformed(format!("node {index} has invalid children")));
                }
                if !threshold.is_finite() {
                    return Err(malformed(format!("node {index} has a non-finite threshold")));
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }
            }
            NodeFile::Leaf { value } => {
                let total = value[0] + value[1];
                if !(total > 0.0) || value[0] < 0.0 || value[1] < 0.0 {
                    return Err(malformed(format!("node {index} has an invalid distribution")));
                }
                Node::Leaf([value[0] / total, value[1] / total])
            }
        };
        nodes.push(node);
    }

    Ok(Tree { nodes })
}

impl Classifier for RandomForest {
    fn predict_proba(&self, rows: &[FeatureVector]) -> Vec<[f64; 2]> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    fn feature_importances(&self) -> &FeatureVector {
        &self.importances
    }
}

/// Optional classifier; `None` from any call means "use rules only".
#[derive(Default)]
pub struct ClassifierAdapter {
    model: Option<Box<dyn Classifier>>,
}

impl std::fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("available", &self.is_available())
            .finish()
    }
}

impl ClassifierAdapter {
    pub fn new(model: impl Classifier + 'static) -> Self {
        Self {
            model: Some(Box::new(model)),
        }
    }

    pub fn unavailable() -> Self {
        Self { model: None }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn feature_importances(&self) -> Option<&FeatureVector> {
        self.model.as_ref().map(|model| model.feature_importances())
    }

    pub fn predict_one(&self, vector: &FeatureVector) -> Option<ClassProbabilities> {
        let model = self.model.as_ref()?;
        let row = model.predict_proba(std::slice::from_ref(vector)).into_iter().next()?;
        Some((row[1], row[0]))
    }

    /// All vectors go to the model as one matrix in a single call.
    pub fn predict_batch(&self, vectors: &[FeatureVector]) -> Option<Vec<ClassProbabilities>> {
        let model = self.model.as_ref()?;
        let rows = model.predict_proba(vectors);
        if rows.len() != vectors.len() {
            warn!(
                expected = vectors.len(),
                got = rows.len(),
                "classifier returned a mismatched batch, ignoring it"
            );
            return None;
        }
        Some(rows.into_iter().map(|row| (row[1], row[0])).collect())
    }
}

/// Classifier plus encoders as loaded at startup.
#[derive(Debug, Default)]
pub struct ModelArtifacts {
    pub classifier: ClassifierAdapter,
    pub encoders: CategoricalEncoders,
}

impl ModelArtifacts {
    /// Never fails: anything missing or malformed is logged once and the
    /// corresponding part degrades.
    pub fn load_dir(dir: &Path) -> Self {
        let model_path = dir.join(MODEL_FILE);
        let classifier = if !model_path.exists() {
            warn!(path = %model_path.display(), "ML model not found, predictions will use rule-based only");
            ClassifierAdapter::unavailable()
        } else {
            match read_json::<ForestFile>(&model_path).and_then(RandomForest::from_file) {
                Ok(forest) => {
                    info!(trees = forest.tree_count(), path = %model_path.display(), "ML model loaded");
                    ClassifierAdapter::new(forest)
                }
                Err(err) => {
                    warn!(error = %err, "failed to load ML model, predictions will use rule-based only");
                    ClassifierAdapter::unavailable()
                }
            }
        };

        let encoders_path = dir.join(ENCODERS_FILE);
        let encoders = if !encoders_path.exists() {
            if classifier.is_available() {
                warn!(path = %encoders_path.display(), "categorical encoders not found, all categories encode as unknown");
            }
            CategoricalEncoders::default()
        } else {
            match read_json::<EncoderFile>(&encoders_path).and_then(check_encoder_version) {
                Ok(file) => CategoricalEncoders::from(file),
                Err(err) => {
                    warn!(error = %err, "failed to load categorical encoders, all categories encode as unknown");
                    CategoricalEncoders::default()
                }
            }
        };

        Self {
            classifier,
            encoders,
        }
    }
}

fn check_encoder_version(file: EncoderFile) -> Result<EncoderFile, ModelError> {
    if file.version != ENCODER_VERSION {
        return Err(ModelError::Version {
            found: file.version,
            expected: ENCODER_VERSION,
        });
    }
    Ok(file)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let raw = fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ModelError::Json {
        path: path.display().to_string(),
        source,
    })
}
