//! Decision tree implementation

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Impurity decrease below which a split is not worth making
const MIN_GAIN: f64 = 1e-12;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
        /// Class frequencies (classification only)
        distribution: Vec<f64>,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Shannon entropy (classification)
    Entropy,
    /// Log loss; splits exactly like `Entropy` (classification)
    LogLoss,
    /// Mean squared error (regression)
    MSE,
}

/// Number of features examined at each split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`
    Sqrt,
    /// `floor(log2(n_features))`
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    /// Concrete feature count for `n_features`, at least 1
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n * f).floor() as usize,
            MaxFeatures::Fixed(k) => *k,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Label statistics of a set of rows
#[derive(Debug, Clone)]
enum LabelStats {
    Classes(Vec<usize>),
    Moments { sum: f64, sq_sum: f64 },
}

impl LabelStats {
    fn add(&mut self, label: f64, class: usize) {
        match self {
            LabelStats::Classes(counts) => counts[class] += 1,
            LabelStats::Moments { sum, sq_sum } => {
                *sum += label;
                *sq_sum += label * label;
            }
        }
    }

    fn remove(&mut self, label: f64, class: usize) {
        match self {
            LabelStats::Classes(counts) => counts[class] -= 1,
            LabelStats::Moments { sum, sq_sum } => {
                *sum -= label;
                *sq_sum -= label * label;
            }
        }
    }

    fn impurity(&self, criterion: Criterion, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        match (self, criterion) {
            (LabelStats::Classes(counts), Criterion::Gini) => {
                1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
            }
            (LabelStats::Classes(counts), _) => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.log2()
                })
                .sum::<f64>(),
            (LabelStats::Moments { sum, sq_sum }, _) => (sq_sum / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

/// Training data shared by every node of one fit
struct FitContext<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    /// Class index of each row (classification only)
    class_idx: Vec<usize>,
    n_classes: usize,
}

impl FitContext<'_> {
    fn stats(&self, indices: &[usize]) -> LabelStats {
        let mut stats = if self.n_classes > 0 {
            LabelStats::Classes(vec![0; self.n_classes])
        } else {
            LabelStats::Moments { sum: 0.0, sq_sum: 0.0 }
        };
        for &i in indices {
            stats.add(self.y[i], self.class_of(i));
        }
        stats
    }

    fn class_of(&self, row: usize) -> usize {
        if self.n_classes > 0 {
            self.class_idx[row]
        } else {
            0
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features examined per split, drawn afresh at every node
    pub max_features: MaxFeatures,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for the per-node feature draw
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Is classification task
    is_classification: bool,
    /// Classes (for classification), ascending
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the per-split feature budget
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::TrainingError(
                "Cannot fit a tree on an empty matrix".to_string(),
            ));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::TrainingError("Labels must be finite".to_string()));
        }
        if self.is_classification && self.criterion == Criterion::MSE {
            return Err(PipelineError::InvalidParameter {
                name: "criterion".to_string(),
                value: "MSE".to_string(),
                reason: "not a classification criterion".to_string(),
            });
        }

        self.n_features = n_features;

        let (class_idx, n_classes) = if self.is_classification {
            let mut classes: Vec<f64> = y.to_vec();
            classes.sort_by(f64::total_cmp);
            classes.dedup();
            let class_idx = y
                .iter()
                .map(|v| classes.partition_point(|c| c < v))
                .collect();
            let n_classes = classes.len();
            self.classes = classes;
            (class_idx, n_classes)
        } else {
            (Vec::new(), 0)
        };

        let ctx = FitContext {
            x,
            y,
            class_idx,
            n_classes,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(&ctx, &indices, 0, &mut rng));

        Ok(self)
    }

    fn build_tree(
        &self,
        ctx: &FitContext,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = ctx.stats(indices);
        let impurity = stats.impurity(self.criterion, n_samples);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= MIN_GAIN;

        if should_stop {
            return self.make_leaf(&stats, n_samples);
        }

        let features = self.draw_features(rng);
        let Some((feature_idx, threshold, _gain)) =
            self.find_best_split(ctx, indices, &stats, impurity, &features)
        else {
            return self.make_leaf(&stats, n_samples);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| ctx.x[[i, feature_idx]] <= threshold);

        let left = Box::new(self.build_tree(ctx, &left_indices, depth + 1, rng));
        let right = Box::new(self.build_tree(ctx, &right_indices, depth + 1, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    /// Features examined at one node, ascending
    fn draw_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let k = self.max_features.resolve(self.n_features);
        if k >= self.n_features {
            return (0..self.n_features).collect();
        }
        let mut features = sample(rng, self.n_features, k).into_vec();
        features.sort_unstable();
        features
    }

    /// Best `(feature, threshold, gain)` over the given features.
    ///
    /// Each feature is scanned once in sorted order, moving rows from the right
    /// statistics to the left. Thresholds sit halfway between consecutive
    /// distinct values. Ties keep the earlier feature and the lower threshold.
    fn find_best_split(
        &self,
        ctx: &FitContext,
        indices: &[usize],
        parent: &LabelStats,
        parent_impurity: f64,
        features: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let n = indices.len();
        let min_leaf = self.min_samples_leaf.max(1);

        let feature_results: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut sorted: Vec<(f64, usize)> =
                    indices.iter().map(|&i| (ctx.x[[i, feature_idx]], i)).collect();
                sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut left = match parent {
                    LabelStats::Classes(counts) => LabelStats::Classes(vec![0; counts.len()]),
                    LabelStats::Moments { .. } => LabelStats::Moments { sum: 0.0, sq_sum: 0.0 },
                };
                let mut right = parent.clone();
                let mut best: Option<(f64, f64)> = None;

                for pos in 0..n - 1 {
                    let (value, row) = sorted[pos];
                    let label = ctx.y[row];
                    let class = ctx.class_of(row);
                    left.add(label, class);
                    right.remove(label, class);

                    let next = sorted[pos + 1].0;
                    if next <= value {
                        continue;
                    }
                    let n_left = pos + 1;
                    let n_right = n - n_left;
                    if n_left < min_leaf || n_right < min_leaf {
                        continue;
                    }

                    let weighted = (n_left as f64 * left.impurity(self.criterion, n_left)
                        + n_right as f64 * right.impurity(self.criterion, n_right))
                        / n as f64;
                    let gain = parent_impurity - weighted;

                    if gain > MIN_GAIN && best.map_or(true, |(g, _)| gain > g) {
                        let mut threshold = value + (next - value) / 2.0;
                        if threshold >= next {
                            threshold = value;
                        }
                        best = Some((gain, threshold));
                    }
                }

                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        feature_results
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
    }

    fn make_leaf(&self, stats: &LabelStats, n_samples: usize) -> TreeNode {
        match stats {
            LabelStats::Classes(counts) => {
                // majority class; the lowest class wins ties
                let mut best = 0;
                for (k, &c) in counts.iter().enumerate() {
                    if c > counts[best] {
                        best = k;
                    }
                }
                let total = n_samples.max(1) as f64;
                TreeNode::Leaf {
                    value: self.classes.get(best).copied().unwrap_or(0.0),
                    n_samples,
                    distribution: counts.iter().map(|&c| c as f64 / total).collect(),
                }
            }
            LabelStats::Moments { sum, .. } => TreeNode::Leaf {
                value: if n_samples > 0 { sum / n_samples as f64 } else { 0.0 },
                n_samples,
                distribution: Vec::new(),
            },
        }
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(root)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.check_input(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match Self::leaf_for(root, row) {
                TreeNode::Leaf { value, .. } => *value,
                TreeNode::Split { .. } => 0.0,
            })
            .collect())
    }

    /// Class probabilities, one column per entry of [`DecisionTree::classes`]
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_classification {
            return Err(PipelineError::InvalidParameter {
                name: "predict_proba".to_string(),
                value: "regressor".to_string(),
                reason: "only available for classification".to_string(),
            });
        }
        let root = self.check_input(x)?;
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            if let TreeNode::Leaf { distribution, .. } = Self::leaf_for(root, row) {
                for (j, &p) in distribution.iter().enumerate() {
                    proba[[i, j]] = p;
                }
            }
        }
        Ok(proba)
    }

    fn leaf_for<'a>(mut node: &'a TreeNode, sample: ArrayView1<f64>) -> &'a TreeNode {
        while let TreeNode::Split { feature_idx, threshold, left, right, .. } = node {
            node = if sample[*feature_idx] <= *threshold { left } else { right };
        }
        node
    }
}
