use ndarray::Array2;

use crate::config::{ModelConfig, ModelType};
use crate::data_handling::CaseStatus;
use crate::error::VisaError;
use crate::models::classifier_trait::{check_fit_inputs, ClassifierModel};
use crate::models::decision_tree::DecisionTree;

/// SAMME boosting over weighted depth-1 trees.
#[derive(Debug, Clone)]
pub struct AdaBoost {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub seed: u64,
    stumps: Vec<DecisionTree>,
    alphas: Vec<f64>,
    n_features: usize,
}

impl AdaBoost {
    pub fn new(n_estimators: usize, learning_rate: f64, seed: u64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            seed,
            stumps: Vec::new(),
            alphas: Vec::new(),
            n_features: 0,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, VisaError> {
        match &config.model_type {
            ModelType::AdaBoost {
                n_estimators,
                learning_rate,
            } => Ok(Self::new(*n_estimators, *learning_rate, config.seed)),
            other => Err(VisaError::Config(format!(
                "expected AdaBoost parameters, got {}",
                other.kind()
            ))),
        }
    }

    /// Weights of the fitted stumps, in boosting order.
    pub fn estimator_weights(&self) -> &[f64] {
        &self.alphas
    }

    /// Signed vote: positive favours Certified.
    fn decision(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        self.stumps
            .iter()
            .zip(&self.alphas)
            .map(|(stump, alpha)| {
                if stump.proba_row(row) > 0.5 {
                    *alpha
                } else {
                    -*alpha
                }
            })
            .sum()
    }

    fn check_ready(&self, x: &Array2<f64>) -> Result<(), VisaError> {
        if self.stumps.is_empty() {
            return Err(VisaError::NotFitted("AdaBoost".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(VisaError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(())
    }
}

impl ClassifierModel for AdaBoost {
    fn fit(&mut self, x: &Array2<f64>, y: &[CaseStatus]) -> Result<(), VisaError> {
        check_fit_inputs("AdaBoost", x, y)?;
        if self.n_estimators == 0 || self.learning_rate <= 0.0 {
            return Err(VisaError::Fit(
                "AdaBoost needs n_estimators > 0 and learning_rate > 0".to_string(),
            ));
        }
        let n = y.len();
        self.n_features = x.ncols();
        self.stumps.clear();
        self.alphas.clear();
        let mut weights = vec![1.0 / n as f64; n];

        for round in 0..self.n_estimators {
            let mut stump = DecisionTree::new()
                .with_max_depth(Some(1))
                .with_seed(self.seed.wrapping_add(round as u64));
            stump.fit_weighted(x, y, &weights)?;

            let wrong: Vec<bool> = x
                .rows()
                .into_iter()
                .zip(y)
                .map(|(row, &actual)| (stump.proba_row(row) > 0.5) != actual.is_certified())
                .collect();
            let total: f64 = weights.iter().sum();
            let error = weights
                .iter()
                .zip(&wrong)
                .filter(|(_, is_wrong)| **is_wrong)
                .map(|(v, _)| v)
                .sum::<f64>()
                / total;

            if error <= 0.0 {
                // perfect stump: keep it and stop
                self.stumps.push(stump);
                self.alphas.push(1.0);
                break;
            }
            if error >= 0.5 {
                if self.stumps.is_empty() {
                    return Err(VisaError::Fit(format!(
                        "AdaBoost base estimator is no better than chance (error {:.3})",
                        error
                    )));
                }
                log::debug!("AdaBoost stopped after {} rounds (error {:.3})", round, error);
                break;
            }

            let alpha = self.learning_rate * ((1.0 - error) / error).ln();
            for (w, &is_wrong) in weights.iter_mut().zip(&wrong) {
                if is_wrong {
                    *w *= alpha.exp();
                }
            }
            let sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= sum);

            log::trace!("AdaBoost round {}: error {:.4}, alpha {:.4}", round, error, alpha);
            self.stumps.push(stump);
            self.alphas.push(alpha);
        }
        log::debug!("AdaBoost fitted {} stumps", self.stumps.len());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<CaseStatus>, VisaError> {
        self.check_ready(x)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                if self.decision(row) > 0.0 {
                    CaseStatus::Certified
                } else {
                    CaseStatus::Denied
                }
            })
            .collect())
    }

    /// Logistic transform of the normalized vote.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, VisaError> {
        self.check_ready(x)?;
        let alpha_sum: f64 = self.alphas.iter().sum();
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                let score = self.decision(row) / alpha_sum;
                1.0 / (1.0 + (-2.0 * score).exp())
            })
            .collect())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        if self.stumps.is_empty() {
            return None;
        }
        let alpha_sum: f64 = self.alphas.iter().sum();
        let mut totals = vec![0.0; self.n_features];
        for (stump, alpha) in self.stumps.iter().zip(&self.alphas) {
            for (total, v) in totals.iter_mut().zip(stump.importances()) {
                *total += alpha * v / alpha_sum;
            }
        }
        Some(totals)
    }

    fn name(&self) -> &str {
        "AdaBoost"
    }
}
