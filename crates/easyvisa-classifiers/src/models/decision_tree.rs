//! CART decision tree for the binary Certified/Denied outcome.
//!
//! Nodes store weighted class totals so the same tree backs plain trees,
//! bootstrapped forest members and weighted AdaBoost stumps.
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Criterion, MaxFeatures, ModelConfig, ModelType};
use crate::data_handling::CaseStatus;
use crate::error::VisaError;
use crate::models::classifier_trait::{check_fit_inputs, label_from_probability, ClassifierModel};

/// Weighted totals of (Denied, Certified).
type ClassWeights = [f64; 2];

#[derive(Debug, Clone, PartialEq)]
enum TreeNode {
    Leaf {
        weights: ClassWeights,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        weights: ClassWeights,
        n_samples: usize,
    },
}

impl TreeNode {
    fn weights(&self) -> &ClassWeights {
        match self {
            TreeNode::Leaf { weights, .. } | TreeNode::Split { weights, .. } => weights,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
    root: Option<TreeNode>,
    n_features: usize,
    importances: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            seed: 42,
            root: None,
            n_features: 0,
            importances: Vec::new(),
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, VisaError> {
        match &config.model_type {
            ModelType::DecisionTree {
                criterion,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                max_features,
            } => Ok(Self::new()
                .with_criterion(*criterion)
                .with_max_depth(*max_depth)
                .with_min_samples_split(*min_samples_split)
                .with_min_samples_leaf(*min_samples_leaf)
                .with_max_features(*max_features)
                .with_seed(config.seed)),
            other => Err(VisaError::Config(format!(
                "expected DecisionTree parameters, got {}",
                other.kind()
            ))),
        }
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit with per-row sample weights.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &[CaseStatus],
        sample_weight: &[f64],
    ) -> Result<(), VisaError> {
        check_fit_inputs("DecisionTree", x, y)?;
        if sample_weight.len() != y.len() {
            return Err(VisaError::ShapeMismatch {
                expected: y.len(),
                actual: sample_weight.len(),
            });
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let indices: Vec<usize> = (0..y.len()).collect();
        self.fit_rows(x, y, sample_weight, indices, &mut rng);
        Ok(())
    }

    /// Fit on `indices` (repetitions allowed, as produced by bootstrapping).
    pub(crate) fn fit_rows(
        &mut self,
        x: &Array2<f64>,
        y: &[CaseStatus],
        sample_weight: &[f64],
        indices: Vec<usize>,
        rng: &mut StdRng,
    ) {
        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let builder = TreeBuilder {
            tree: self,
            x,
            y,
            w: sample_weight,
            n_candidates: self.max_features.resolve(self.n_features),
        };
        let root = builder.build(indices, 0, rng, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.root = Some(root);
        self.importances = importances;
    }

    fn root(&self) -> Result<&TreeNode, VisaError> {
        self.root
            .as_ref()
            .ok_or_else(|| VisaError::NotFitted("DecisionTree".to_string()))
    }

    fn check_columns(&self, x: &Array2<f64>) -> Result<(), VisaError> {
        if x.ncols() != self.n_features {
            return Err(VisaError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(())
    }

    /// Certified probability of one sample.
    pub(crate) fn proba_row(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        let Some(mut node) = self.root.as_ref() else {
            return 0.0;
        };
        loop {
            match node {
                TreeNode::Leaf { weights, .. } => return certified_share(weights),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map(node_depth).unwrap_or(0)
    }

    pub fn n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map(count).unwrap_or(0)
    }

    /// Normalized impurity decrease per feature.
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Text rendering of the fitted rules, one line per node.
    ///
    /// ```text
    /// |--- education_of_employee <= 1.50
    /// |   |--- class: Denied
    /// |--- education_of_employee >  1.50
    /// |   |--- class: Certified
    /// ```
    pub fn export_text(&self, feature_names: &[String]) -> Result<String, VisaError> {
        let root = self.root()?;
        let mut out = String::new();
        write_node(root, feature_names, 0, &mut out);
        Ok(out)
    }
}

fn write_node(node: &TreeNode, names: &[String], depth: usize, out: &mut String) {
    let indent = "|   ".repeat(depth);
    match node {
        TreeNode::Leaf { weights, n_samples } => {
            let class = label_from_probability(certified_share(weights));
            out.push_str(&format!(
                "{}|--- class: {} (samples = {})\n",
                indent, class, n_samples
            ));
        }
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } => {
            let name = names
                .get(*feature)
                .cloned()
                .unwrap_or_else(|| format!("feature_{}", feature));
            out.push_str(&format!("{}|--- {} <= {:.2}\n", indent, name, threshold));
            write_node(left, names, depth + 1, out);
            out.push_str(&format!("{}|--- {} >  {:.2}\n", indent, name, threshold));
            write_node(right, names, depth + 1, out);
        }
    }
}

fn certified_share(weights: &ClassWeights) -> f64 {
    let total = weights[0] + weights[1];
    if total > 0.0 {
        weights[1] / total
    } else {
        0.0
    }
}

fn impurity(criterion: Criterion, weights: &ClassWeights) -> f64 {
    let total = weights[0] + weights[1];
    if total <= 0.0 {
        return 0.0;
    }
    match criterion {
        Criterion::Gini => 1.0 - weights.iter().map(|w| (w / total).powi(2)).sum::<f64>(),
        Criterion::Entropy => weights
            .iter()
            .filter(|w| **w > 0.0)
            .map(|w| {
                let p = w / total;
                -p * p.log2()
            })
            .sum(),
    }
}

struct TreeBuilder<'a> {
    tree: &'a DecisionTree,
    x: &'a Array2<f64>,
    y: &'a [CaseStatus],
    w: &'a [f64],
    n_candidates: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    improvement: f64,
}

impl<'a> TreeBuilder<'a> {
    fn class_weights(&self, indices: &[usize]) -> ClassWeights {
        let mut totals = [0.0; 2];
        for &i in indices {
            totals[self.y[i].code() as usize] += self.w[i];
        }
        totals
    }

    fn build(
        &self,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> TreeNode {
        let weights = self.class_weights(&indices);
        let n_samples = indices.len();
        let node_impurity = impurity(self.tree.criterion, &weights);

        let depth_reached = self.tree.max_depth.map_or(false, |d| depth >= d);
        if depth_reached
            || n_samples < self.tree.min_samples_split
            || n_samples < 2 * self.tree.min_samples_leaf
            || node_impurity <= 1e-12
        {
            return TreeNode::Leaf { weights, n_samples };
        }

        let Some(best) = self.find_best_split(&indices, &weights, node_impurity, rng) else {
            return TreeNode::Leaf { weights, n_samples };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, best.feature]] <= best.threshold);

        importances[best.feature] += best.improvement;

        let left = self.build(left_idx, depth + 1, rng, importances);
        let right = self.build(right_idx, depth + 1, rng, importances);
        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
            weights,
            n_samples,
        }
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        let n_features = self.x.ncols();
        if self.n_candidates >= n_features {
            return (0..n_features).collect();
        }
        let mut picked = rand::seq::index::sample(rng, n_features, self.n_candidates).into_vec();
        picked.sort_unstable();
        picked
    }

    /// Best threshold over the candidate features; the first feature wins ties.
    fn find_best_split(
        &self,
        indices: &[usize],
        parent: &ClassWeights,
        parent_impurity: f64,
        rng: &mut StdRng,
    ) -> Option<BestSplit> {
        let min_leaf = self.tree.min_samples_leaf;
        let n = indices.len();
        let total_weight = parent[0] + parent[1];
        let mut best: Option<BestSplit> = None;

        for feature in self.candidate_features(rng) {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = [0.0; 2];
            for pos in 0..n - 1 {
                let i = order[pos];
                left[self.y[i].code() as usize] += self.w[i];

                let value = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if next <= value {
                    continue;
                }
                let n_left = pos + 1;
                if n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }

                let right = [
                    (parent[0] - left[0]).max(0.0),
                    (parent[1] - left[1]).max(0.0),
                ];
                let w_left = left[0] + left[1];
                let w_right = right[0] + right[1];
                let child = (w_left * impurity(self.tree.criterion, &left)
                    + w_right * impurity(self.tree.criterion, &right))
                    / total_weight;
                let improvement = total_weight * (parent_impurity - child);

                if best.as_ref().map_or(true, |b| improvement > b.improvement + 1e-12) {
                    best = Some(BestSplit {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        improvement,
                    });
                }
            }
        }
        best
    }
}

impl ClassifierModel for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &[CaseStatus]) -> Result<(), VisaError> {
        let weights = vec![1.0; y.len()];
        self.fit_weighted(x, y, &weights)?;
        log::debug!(
            "DecisionTree fitted: depth {}, {} leaves",
            self.depth(),
            self.n_leaves()
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<CaseStatus>, VisaError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(label_from_probability)
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, VisaError> {
        self.root()?;
        self.check_columns(x)?;
        Ok(x.rows().into_iter().map(|row| self.proba_row(row)).collect())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.root.as_ref().map(|_| self.importances.clone())
    }

    fn rules_text(&self, feature_names: &[String]) -> Option<String> {
        self.export_text(feature_names).ok()
    }

    fn name(&self) -> &str {
        "DecisionTree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use CaseStatus::{Certified, Denied};

    #[test]
    fn separable_data_is_learned_exactly() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = vec![Denied, Denied, Certified, Certified];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn max_depth_is_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = vec![Denied, Certified, Denied, Certified, Denied, Certified, Denied, Certified];

        let mut tree = DecisionTree::new().with_max_depth(Some(2));
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 2, "depth = {}", tree.depth());

        let mut full = DecisionTree::new();
        full.fit(&x, &y).unwrap();
        assert_eq!(full.predict(&x).unwrap(), y);
    }

    #[test]
    fn min_samples_leaf_blocks_small_leaves() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = vec![Certified, Denied, Denied, Denied, Denied, Denied];

        let mut tree = DecisionTree::new().with_min_samples_leaf(3);
        tree.fit(&x, &y).unwrap();
        // the only admissible split is 3 | 3
        assert!(tree.n_leaves() <= 2);
        assert!(tree.predict(&x).unwrap().iter().all(|&p| p == Denied));
    }

    #[test]
    fn entropy_and_gini_agree_on_clean_split() {
        let x = array![[0.0, 5.0], [0.0, 6.0], [1.0, 5.0], [1.0, 6.0]];
        let y = vec![Denied, Denied, Certified, Certified];
        for criterion in [Criterion::Gini, Criterion::Entropy] {
            let mut tree = DecisionTree::new().with_criterion(criterion);
            tree.fit(&x, &y).unwrap();
            assert_eq!(tree.predict(&x).unwrap(), y, "criterion {:?}", criterion);
        }
    }

    #[test]
    fn export_text_names_features_and_classes() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = vec![Denied, Denied, Certified, Certified];
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let text = tree.export_text(&["prevailing_wage".to_string()]).unwrap();
        assert!(text.contains("|--- prevailing_wage <= 2.50"), "{}", text);
        assert!(text.contains("class: Certified"));
        assert!(text.contains("class: Denied"));
    }

    #[test]
    fn unfitted_tree_refuses_to_predict() {
        let tree = DecisionTree::new();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(VisaError::NotFitted(_))
        ));
    }

    #[test]
    fn weighted_fit_follows_heavy_rows() {
        let x = array![[1.0], [1.0], [2.0]];
        let y = vec![Denied, Certified, Certified];
        let mut tree = DecisionTree::new().with_max_depth(Some(1));
        tree.fit_weighted(&x, &y, &[10.0, 1.0, 1.0]).unwrap();
        let pred = tree.predict(&array![[1.0], [2.0]]).unwrap();
        assert_eq!(pred, vec![Denied, Certified]);
    }
}
