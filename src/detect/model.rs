//! Gradient-boosted decision trees for binary anomaly classification.
//!
//! Trees are fitted on the logistic loss using first and second order
//! gradients: each leaf weight is `-G / (H + lambda)` scaled by the learning
//! rate, and a split is kept only when
//! `0.5 * (GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)) - gamma` is positive.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ModelConfig, SingleClassPolicy};
use crate::detect::DetectError;

/// Feature column names, in matrix order.
pub const FEATURE_NAMES: [&str; 9] = [
    "Balance Difference",
    "Balance Difference Lag1",
    "Balance Difference Lag2",
    "Rolling Mean",
    "Rolling Std",
    "Account Encoded",
    "Primary Account Encoded",
    "Secondary Account Encoded",
    "AU Encoded",
];

pub const N_FEATURES: usize = FEATURE_NAMES.len();

pub type FeatureVector = [f64; N_FEATURES];

/// Hessians are floored here so leaves stay finite once predictions saturate.
const MIN_HESSIAN: f64 = 1e-16;

/// Boosting hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for BoostingParams {
    fn from(cfg: &ModelConfig) -> Self {
        Self {
            n_estimators: cfg.n_estimators,
            max_depth: cfg.max_depth,
            learning_rate: cfg.learning_rate,
            lambda: cfg.lambda,
            gamma: cfg.gamma,
            min_child_weight: cfg.min_child_weight,
        }
    }
}

// ---------------------------------------------------------------------------
// Regression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn eval(&self, x: &FeatureVector) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { weight } => return *weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { left } else { right };
                }
            }
        }
    }

    fn leaf_count(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => left.leaf_count() + right.leaf_count(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Fits one tree against fixed gradients.
struct TreeBuilder<'a> {
    params: &'a BoostingParams,
    x: &'a [FeatureVector],
    grad: &'a [f64],
    hess: &'a [f64],
}

impl TreeBuilder<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn leaf(&self, g: f64, h: f64) -> Node {
        Node::Leaf {
            weight: -g / (h + self.params.lambda) * self.params.learning_rate,
        }
    }

    fn grow(&self, rows: Vec<usize>, depth: usize) -> Node {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();

        if depth >= self.params.max_depth || rows.len() < 2 {
            return self.leaf(g, h);
        }

        let Some(best) = self.best_split(&rows, g, h) else {
            return self.leaf(g, h);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[i][best.feature] < best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    /// Exact greedy search over every distinct value boundary of every feature.
    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let parent = self.score(g, h);
        let mut best: Option<Candidate> = None;
        let mut sorted = rows.to_vec();

        for feature in 0..N_FEATURES {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut gl = 0.0;
            let mut hl = 0.0;
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                gl += self.grad[i];
                hl += self.hess[i];

                let here = self.x[i][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let hr = h - hl;
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gr = g - gl;
                let gain =
                    0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > 0.0 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}

// ---------------------------------------------------------------------------
// Ensemble
// ---------------------------------------------------------------------------

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// An additive ensemble of regression trees over the logit.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    base_margin: f64,
    trees: Vec<Node>,
}

impl GradientBoostedTrees {
    /// Fit on `x` against 0/1 targets `y`. The initial prediction is 0.5.
    pub fn fit(x: &[FeatureVector], y: &[bool], params: &BoostingParams) -> Self {
        let base_margin = 0.0;
        let mut margins = vec![base_margin; x.len()];
        let mut grad = vec![0.0; x.len()];
        let mut hess = vec![0.0; x.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..x.len() {
                let p = sigmoid(margins[i]);
                let target = if y[i] { 1.0 } else { 0.0 };
                grad[i] = p - target;
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let builder = TreeBuilder {
                params,
                x,
                grad: &grad,
                hess: &hess,
            };
            let tree = builder.grow((0..x.len()).collect(), 0);

            for (margin, row) in margins.iter_mut().zip(x) {
                *margin += tree.eval(row);
            }
            if round == 0 {
                debug!(leaves = tree.leaf_count(), "fitted first boosting round");
            }
            trees.push(tree);
        }

        Self { base_margin, trees }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, x: &FeatureVector) -> f64 {
        let margin = self.base_margin + self.trees.iter().map(|t| t.eval(x)).sum::<f64>();
        sigmoid(margin)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// The per-batch model: boosted trees, or a constant when the training
/// labels offer nothing to learn.
#[derive(Debug, Clone)]
pub enum Classifier {
    Boosted(GradientBoostedTrees),
    Constant { label: bool },
}

/// Class name used in logs and errors.
pub fn class_name(label: bool) -> &'static str {
    if label {
        "anomaly"
    } else {
        "normal"
    }
}

impl Classifier {
    /// Train on `x`/`y`.
    ///
    /// When every label is identical the outcome depends on `single_class`:
    /// a constant classifier for [`SingleClassPolicy::Majority`], or
    /// [`DetectError::InsufficientLabelDiversity`] for
    /// [`SingleClassPolicy::Fail`].
    pub fn train(
        x: &[FeatureVector],
        y: &[bool],
        params: &BoostingParams,
        single_class: SingleClassPolicy,
    ) -> Result<Self, DetectError> {
        let positives = y.iter().filter(|&&v| v).count();
        if positives == 0 || positives == y.len() {
            let label = positives > 0;
            return match single_class {
                SingleClassPolicy::Majority => {
                    warn!(
                        rows = y.len(),
                        class = class_name(label),
                        "training labels hold a single class, predicting it for every row"
                    );
                    Ok(Classifier::Constant { label })
                }
                SingleClassPolicy::Fail => Err(DetectError::InsufficientLabelDiversity {
                    class: class_name(label),
                    rows: y.len(),
                }),
            };
        }

        let model = GradientBoostedTrees::fit(x, y, params);
        debug!(trees = model.n_trees(), rows = x.len(), positives, "trained classifier");
        Ok(Classifier::Boosted(model))
    }

    pub fn predict_proba(&self, x: &FeatureVector) -> f64 {
        match self {
            Classifier::Boosted(model) => model.predict_proba(x),
            Classifier::Constant { label } => {
                if *label {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Thresholded prediction: positive when the probability exceeds `threshold`.
    pub fn predict(&self, x: &FeatureVector, threshold: f64) -> bool {
        match self {
            Classifier::Constant { label } => *label,
            Classifier::Boosted(_) => self.predict_proba(x) > threshold,
        }
    }
}

/// Summary of held-out performance on the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub support: usize,
    pub positives: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluation {
    /// Compare predictions with the rule labels. Undefined ratios are 0.
    pub fn compute(truth: &[bool], predicted: &[bool]) -> Self {
        let (mut tp, mut fp, mut fn_, mut tn) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => tn += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let support = tp + fp + fn_ + tn;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Self {
            support,
            positives: tp + fn_,
            accuracy: ratio(tp + tn, support),
            precision,
            recall,
            f1,
        }
    }
}
