//! XGBoost-style boosting with a second-order logistic objective.
//!
//! Each round fits a regression tree to the gradient `p - y` and hessian
//! `p (1 - p)` of the log loss. Leaves carry `-G / (H + lambda)` and a split
//! is kept only when its gain exceeds `gamma`:
//!
//! `gain = 0.5 * [GL^2/(HL+l) + GR^2/(HR+l) - G^2/(H+l)]`
//!
//! Split search is exact and greedy; features are scanned in parallel and the
//! first feature (in column order) with the best gain wins.
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::{ModelConfig, ModelType};
use crate::data_handling::CaseStatus;
use crate::error::VisaError;
use crate::models::classifier_trait::{check_fit_inputs, label_from_probability, ClassifierModel};

#[derive(Debug, Clone)]
enum BoostNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoostNode>,
        right: Box<BoostNode>,
    },
}

impl BoostNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            BoostNode::Leaf { weight } => *weight,
            BoostNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct XGBoostClassifier {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub num_boost_round: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub seed: u64,
    trees: Vec<BoostNode>,
    base_score: f64,
    n_features: usize,
    gains: Vec<f64>,
}

struct GradStats<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
}

impl XGBoostClassifier {
    pub fn from_config(config: &ModelConfig) -> Result<Self, VisaError> {
        match &config.model_type {
            ModelType::XGBoost {
                learning_rate,
                max_depth,
                num_boost_round,
                min_child_weight,
                reg_lambda,
                gamma,
                subsample,
                colsample_bytree,
            } => Ok(Self {
                learning_rate: *learning_rate,
                max_depth: *max_depth,
                num_boost_round: *num_boost_round,
                min_child_weight: *min_child_weight,
                reg_lambda: *reg_lambda,
                gamma: *gamma,
                subsample: *subsample,
                colsample_bytree: *colsample_bytree,
                seed: config.seed,
                trees: Vec::new(),
                base_score: 0.0,
                n_features: 0,
                gains: Vec::new(),
            }),
            other => Err(VisaError::Config(format!(
                "expected XGBoost parameters, got {}",
                other.kind()
            ))),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| tree.predict(row))
                .sum::<f64>()
    }

    fn build(
        &self,
        stats: &GradStats,
        indices: &[usize],
        features: &[usize],
        depth: usize,
        gains: &mut [f64],
    ) -> BoostNode {
        let g_sum: f64 = indices.iter().map(|&i| stats.grad[i]).sum();
        let h_sum: f64 = indices.iter().map(|&i| stats.hess[i]).sum();
        let leaf = BoostNode::Leaf {
            weight: self.learning_rate * (-g_sum / (h_sum + self.reg_lambda)),
        };

        if depth >= self.max_depth || indices.len() < 2 || h_sum < 2.0 * self.min_child_weight {
            return leaf;
        }

        let candidates: Vec<Option<(f64, f64)>> = features
            .par_iter()
            .map(|&f| self.best_split_for_feature(stats, indices, f, g_sum, h_sum))
            .collect();

        let mut best: Option<(usize, f64, f64)> = None;
        for (&feature, candidate) in features.iter().zip(candidates) {
            if let Some((threshold, gain)) = candidate {
                if best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, threshold, gain));
                }
            }
        }

        match best {
            Some((feature, threshold, gain)) if gain > self.gamma => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| stats.x[[i, feature]] <= threshold);
                gains[feature] += gain;
                let left = self.build(stats, &left_idx, features, depth + 1, gains);
                let right = self.build(stats, &right_idx, features, depth + 1, gains);
                BoostNode::Split {
                    feature,
                    threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            _ => leaf,
        }
    }

    /// Best `(threshold, gain)` for one feature, respecting `min_child_weight`.
    fn best_split_for_feature(
        &self,
        stats: &GradStats,
        indices: &[usize],
        feature: usize,
        g_total: f64,
        h_total: f64,
    ) -> Option<(f64, f64)> {
        let x = stats.x;
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let lambda = self.reg_lambda;
        let parent = g_total * g_total / (h_total + lambda);
        let (mut g_left, mut h_left) = (0.0, 0.0);
        let mut best: Option<(f64, f64)> = None;

        for pos in 0..sorted.len() - 1 {
            let i = sorted[pos];
            g_left += stats.grad[i];
            h_left += stats.hess[i];

            let value = x[[i, feature]];
            let next = x[[sorted[pos + 1], feature]];
            if next <= value {
                continue;
            }
            let g_right = g_total - g_left;
            let h_right = h_total - h_left;
            if h_left < self.min_child_weight || h_right < self.min_child_weight {
                continue;
            }
            let gain = 0.5
                * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                    - parent);
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((value + (next - value) / 2.0, gain));
            }
        }
        best
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn subsample(rng: &mut StdRng, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64 * ratio).ceil() as usize).clamp(1, n);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

impl ClassifierModel for XGBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[CaseStatus]) -> Result<(), VisaError> {
        check_fit_inputs("XGBoost", x, y)?;
        if self.learning_rate <= 0.0 || self.reg_lambda < 0.0 {
            return Err(VisaError::Fit(
                "XGBoost needs learning_rate > 0 and reg_lambda >= 0".to_string(),
            ));
        }
        if !(self.subsample > 0.0 && self.colsample_bytree > 0.0) {
            return Err(VisaError::Fit(
                "XGBoost subsample ratios must be positive".to_string(),
            ));
        }
        let n = y.len();
        let n_features = x.ncols();
        let targets: Vec<f64> = y.iter().map(|s| s.code() as f64).collect();

        let prior = (targets.iter().sum::<f64>() / n as f64).clamp(1e-7, 1.0 - 1e-7);
        self.base_score = (prior / (1.0 - prior)).ln();
        self.n_features = n_features;
        self.trees.clear();
        let mut gains = vec![0.0; n_features];
        let mut margins = vec![self.base_score; n];
        let mut rng = StdRng::seed_from_u64(self.seed);

        for round in 0..self.num_boost_round {
            let probs: Vec<f64> = margins.iter().map(|&m| sigmoid(m)).collect();
            let grad: Vec<f64> = probs.iter().zip(&targets).map(|(p, t)| p - t).collect();
            let hess: Vec<f64> = probs.iter().map(|p| (p * (1.0 - p)).max(1e-16)).collect();

            let rows = subsample(&mut rng, n, self.subsample);
            let cols = subsample(&mut rng, n_features, self.colsample_bytree);
            let stats = GradStats {
                x,
                grad: &grad,
                hess: &hess,
            };
            let tree = self.build(&stats, &rows, &cols, 0, &mut gains);

            for (i, margin) in margins.iter_mut().enumerate() {
                *margin += tree.predict(x.row(i));
            }
            self.trees.push(tree);

            if round % 25 == 0 {
                let loss = targets
                    .iter()
                    .zip(&margins)
                    .map(|(t, m)| {
                        let p = sigmoid(*m).clamp(1e-15, 1.0 - 1e-15);
                        -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / n as f64;
                log::trace!("XGBoost round {}: train logloss {:.5}", round, loss);
            }
        }

        let total: f64 = gains.iter().sum();
        if total > 0.0 {
            gains.iter_mut().for_each(|g| *g /= total);
        }
        self.gains = gains;
        log::debug!("XGBoost fitted {} trees", self.trees.len());
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
        if self.n_features == 0 {
            return Err(VisaError::NotFitted("XGBoost".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(VisaError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| sigmoid(self.margin(x.row(i))))
            .collect())
    }

    /// Share of the total split gain contributed by each feature.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        (self.n_features > 0).then(|| self.gains.clone())
    }

    fn name(&self) -> &str {
        "XGBoost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use CaseStatus::{Certified, Denied};

    fn classification_data() -> (Array2<f64>, Vec<CaseStatus>) {
        let n = 40;
        let mut values = Vec::with_capacity(n * 2);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let a = i as f64;
            let b = ((i * 7) % 11) as f64;
            values.push(a);
            values.push(b);
            labels.push(if a + b > 25.0 { Certified } else { Denied });
        }
        (Array2::from_shape_vec((n, 2), values).unwrap(), labels)
    }

    fn default_model() -> XGBoostClassifier {
        XGBoostClassifier::from_config(&ModelConfig::new(42, ModelType::xgboost())).unwrap()
    }

    #[test]
    fn fits_training_data() {
        let (x, y) = classification_data();
        let mut model = default_model();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(&y).filter(|(p, a)| p == a).count();
        assert!(correct >= 34, "{} of 40 correct", correct);
        assert_eq!(model.n_trees(), 100);
    }

    #[test]
    fn probabilities_are_bounded() {
        let (x, y) = classification_data();
        let mut model = default_model();
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn strong_regularization_limits_confidence() {
        let (x, y) = classification_data();
        let mut loose = default_model();
        loose.fit(&x, &y).unwrap();

        let mut strict = default_model();
        strict.reg_lambda = 1000.0;
        strict.num_boost_round = 5;
        strict.fit(&x, &y).unwrap();

        let spread = |m: &XGBoostClassifier| {
            let p = m.predict_proba(&x).unwrap();
            p.iter().cloned().fold(f64::MIN, f64::max) - p.iter().cloned().fold(f64::MAX, f64::min)
        };
        assert!(spread(&strict) < spread(&loose));
    }

    #[test]
    fn single_class_training_is_handled() {
        let (x, _) = classification_data();
        let y = vec![Certified; x.nrows()];
        let mut model = default_model();
        model.fit(&x, &y).unwrap();
        assert!(model.predict(&x).unwrap().iter().all(|&p| p == Certified));
    }
}
