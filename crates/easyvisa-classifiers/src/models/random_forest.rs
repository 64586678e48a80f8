use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{Criterion, MaxFeatures, ModelConfig, ModelType};
use crate::data_handling::CaseStatus;
use crate::error::VisaError;
use crate::models::classifier_trait::{check_fit_inputs, label_from_probability, ClassifierModel};
use crate::models::decision_tree::DecisionTree;

/// Bagged ensemble of decision trees, trained in parallel.
///
/// Tree `t` draws its bootstrap sample and split features from a `StdRng`
/// seeded with `seed + t`, so the forest does not depend on thread scheduling.
#[derive(Debug, Clone)]
pub struct RandomForest {
    pub n_estimators: usize,
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, VisaError> {
        match &config.model_type {
            ModelType::RandomForest {
                n_estimators,
                criterion,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                max_features,
                bootstrap,
            } => Ok(Self {
                criterion: *criterion,
                max_depth: *max_depth,
                min_samples_split: *min_samples_split,
                min_samples_leaf: *min_samples_leaf,
                max_features: *max_features,
                bootstrap: *bootstrap,
                ..Self::new(*n_estimators, config.seed)
            }),
            other => Err(VisaError::Config(format!(
                "expected RandomForest parameters, got {}",
                other.kind()
            ))),
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    fn grow_tree(&self, tree_idx: usize, x: &Array2<f64>, y: &[CaseStatus]) -> DecisionTree {
        let n = y.len();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(tree_idx as u64));
        let indices: Vec<usize> = if self.bootstrap {
            (0..n).map(|_| rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        };
        let weights = vec![1.0; n];
        let mut tree = DecisionTree::new()
            .with_criterion(self.criterion)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features);
        tree.fit_rows(x, y, &weights, indices, &mut rng);
        tree
    }
}

impl ClassifierModel for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &[CaseStatus]) -> Result<(), VisaError> {
        check_fit_inputs("RandomForest", x, y)?;
        if self.n_estimators == 0 {
            return Err(VisaError::Fit("RandomForest needs n_estimators > 0".to_string()));
        }
        self.n_features = x.ncols();
        let forest = &*self;
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| forest.grow_tree(t, x, y))
            .collect();
        log::debug!(
            "RandomForest fitted {} trees (mean depth {:.1})",
            trees.len(),
            trees.iter().map(|t| t.depth() as f64).sum::<f64>() / trees.len() as f64
        );
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<CaseStatus>, VisaError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(label_from_probability)
            .collect())
    }

    /// Mean of the trees' leaf probabilities.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, VisaError> {
        if self.trees.is_empty() {
            return Err(VisaError::NotFitted("RandomForest".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(VisaError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        let n_trees = self.trees.len() as f64;
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.proba_row(row)).sum::<f64>() / n_trees
            })
            .collect())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        if self.trees.is_empty() {
            return None;
        }
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (total, v) in totals.iter_mut().zip(tree.importances()) {
                *total += v;
            }
        }
        let n_trees = self.trees.len() as f64;
        Some(totals.into_iter().map(|v| v / n_trees).collect())
    }

    fn name(&self) -> &str {
        "RandomForest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use CaseStatus::{Certified, Denied};

    fn noisy_threshold_data() -> (Array2<f64>, Vec<CaseStatus>) {
        let n = 60;
        let mut values = Vec::with_capacity(n * 3);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            values.push(i as f64);
            values.push((i % 7) as f64);
            values.push((i % 3) as f64);
            labels.push(if i >= 30 { Certified } else { Denied });
        }
        (Array2::from_shape_vec((n, 3), values).unwrap(), labels)
    }

    #[test]
    fn forest_learns_threshold() {
        let (x, y) = noisy_threshold_data();
        let mut rf = RandomForest::new(25, 42);
        rf.fit(&x, &y).unwrap();
        let pred = rf.predict(&x).unwrap();
        let correct = pred.iter().zip(&y).filter(|(p, a)| p == a).count();
        assert!(correct >= 57, "only {} of 60 correct", correct);
        assert_eq!(rf.trees().len(), 25);
    }

    #[test]
    fn same_seed_gives_same_forest() {
        let (x, y) = noisy_threshold_data();
        let mut a = RandomForest::new(10, 7);
        let mut b = RandomForest::new(10, 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn importances_favor_informative_column() {
        let (x, y) = noisy_threshold_data();
        let mut rf = RandomForest::new(30, 1);
        rf.fit(&x, &y).unwrap();
        let imp = rf.feature_importances().unwrap();
        assert!(imp[0] > imp[1] && imp[0] > imp[2], "importances {:?}", imp);
    }

    #[test]
    fn zero_estimators_is_an_error() {
        let (x, y) = noisy_threshold_data();
        let mut rf = RandomForest::new(0, 1);
        assert!(rf.fit(&x, &y).is_err());
    }
}
