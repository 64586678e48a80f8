use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use ndarray::Array2;

use crate::config::{ModelConfig, ModelType};
use crate::data_handling::CaseStatus;
use crate::error::VisaError;
use crate::models::classifier_trait::{check_fit_inputs, label_from_probability, ClassifierModel};

/// Losses of the `gbdt` crate usable for a binary outcome.
const SUPPORTED_LOSSES: [&str; 3] = ["LogLikelyhood", "BinaryLogistic", "SquaredError"];

/// Gradient Boosting Decision Tree (GBDT) classifier
pub struct GBDTClassifier {
    model: Option<GBDT>,
    params: ModelConfig,
    n_features: usize,
}

impl GBDTClassifier {
    pub fn new(params: ModelConfig) -> Self {
        GBDTClassifier {
            model: None,
            params,
            n_features: 0,
        }
    }

    fn loss_type(&self) -> &str {
        match &self.params.model_type {
            ModelType::GBDT { loss_type, .. } => loss_type,
            _ => "LogLikelyhood",
        }
    }

    /// Training label in the convention of the configured loss:
    /// 1 / -1 for LogLikelyhood, 1 / 0 otherwise.
    fn encode_label(&self, status: CaseStatus) -> f32 {
        match (status, self.loss_type()) {
            (CaseStatus::Certified, _) => 1.0,
            (CaseStatus::Denied, "LogLikelyhood") => -1.0,
            (CaseStatus::Denied, _) => 0.0,
        }
    }

    fn to_datavec(x: &Array2<f64>, labels: Option<&[f32]>) -> DataVec {
        let mut data = DataVec::with_capacity(x.nrows());
        for (i, row) in x.rows().into_iter().enumerate() {
            let features: Vec<f32> = row.iter().map(|&v| v as f32).collect();
            let label = labels.map(|l| l[i]).unwrap_or(0.0);
            data.push(Data::new_training_data(features, 1.0, label, None));
        }
        data
    }
}

impl ClassifierModel for GBDTClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[CaseStatus]) -> Result<(), VisaError> {
        check_fit_inputs("GBDT", x, y)?;
        let feature_size = x.ncols();

        match &self.params.model_type {
            ModelType::GBDT {
                learning_rate,
                max_depth,
                num_boost_round,
                debug,
                training_optimization_level,
                loss_type,
            } => {
                if !SUPPORTED_LOSSES.contains(&loss_type.as_str()) {
                    return Err(VisaError::InvalidParameter {
                        model: "gbdt".to_string(),
                        param: format!("loss_type={}", loss_type),
                    });
                }
                if *num_boost_round == 0 {
                    return Err(VisaError::Fit("GBDT needs num_boost_round > 0".to_string()));
                }
                let first = y[0];
                if y.iter().all(|&s| s == first) {
                    return Err(VisaError::Fit(format!(
                        "GBDT needs both outcomes in the training rows, only found {}",
                        first
                    )));
                }

                let mut config = Config::new();

                config.set_feature_size(feature_size);
                config.set_shrinkage(*learning_rate);
                config.set_max_depth(*max_depth);
                config.set_iterations(*num_boost_round as usize);
                config.set_debug(*debug);
                config.set_training_optimization_level(*training_optimization_level);
                config.set_loss(loss_type);

                let mut gbdt = GBDT::new(&config);

                let labels: Vec<f32> = y.iter().map(|&s| self.encode_label(s)).collect();
                let mut train_x = Self::to_datavec(x, Some(&labels));

                gbdt.fit(&mut train_x);

                log::debug!(
                    "GBDT fitted {} rounds (depth {}, shrinkage {})",
                    num_boost_round,
                    max_depth,
                    learning_rate
                );
                self.model = Some(gbdt);
                self.n_features = feature_size;
                Ok(())
            }
            other => Err(VisaError::Config(format!(
                "expected GBDT parameters, got {}",
                other.kind()
            ))),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<CaseStatus>, VisaError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(label_from_probability)
            .collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, VisaError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| VisaError::NotFitted("GBDT".to_string()))?;
        if x.ncols() != self.n_features {
            return Err(VisaError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        let test_x = Self::to_datavec(x, None);
        let predictions = model.predict(&test_x);
        Ok(predictions
            .into_iter()
            .map(|p| (p as f64).clamp(0.0, 1.0))
            .collect())
    }

    fn name(&self) -> &str {
        "GBDT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CaseStatus::{Certified, Denied};

    fn ten_by_five() -> Array2<f64> {
        Array2::from_shape_vec(
            (10, 5),
            vec![
                0.1, 1.0, 5.0, 0.2, -0.3, 0.4, -1.0, 5.0, 0.8, 0.1, 0.6, 1.0, 5.0, 1.2, 0.2, 0.9,
                -1.0, 5.0, 1.8, -0.1, 1.2, 1.0, 5.0, 2.4, 0.3, 1.5, -1.0, 5.0, 3.0, 0.0, 1.8, 1.0,
                5.0, 3.6, -0.2, 2.1, -1.0, 5.0, 4.2, 0.4, 2.4, 1.0, 5.0, 4.8, -0.1, 2.7, -1.0, 5.0,
                5.4, 0.2,
            ],
        )
        .unwrap()
    }

    fn params(loss_type: &str) -> ModelConfig {
        ModelConfig::new(
            42,
            ModelType::GBDT {
                learning_rate: 0.1,
                max_depth: 3,
                num_boost_round: 20,
                debug: false,
                training_optimization_level: 2,
                loss_type: loss_type.to_string(),
            },
        )
    }

    #[test]
    fn gbdt_learns_second_feature() {
        let x = ten_by_five();
        // outcome follows the sign of the second feature
        let y: Vec<CaseStatus> = (0..10)
            .map(|i| if i % 2 == 0 { Certified } else { Denied })
            .collect();

        let mut classifier = GBDTClassifier::new(params("LogLikelyhood"));
        classifier.fit(&x, &y).unwrap();

        let predictions = classifier.predict(&x).unwrap();
        assert_eq!(predictions, y);

        let proba = classifier.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn unsupported_loss_is_rejected() {
        let x = ten_by_five();
        let y: Vec<CaseStatus> = (0..10)
            .map(|i| if i < 5 { Certified } else { Denied })
            .collect();
        let mut classifier = GBDTClassifier::new(params("LAD"));
        assert!(matches!(
            classifier.fit(&x, &y),
            Err(VisaError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn single_class_is_rejected() {
        let x = ten_by_five();
        let mut classifier = GBDTClassifier::new(params("LogLikelyhood"));
        assert!(classifier.fit(&x, &vec![Certified; 10]).is_err());
    }

    #[test]
    fn predict_before_fit_fails() {
        let classifier = GBDTClassifier::new(params("LogLikelyhood"));
        assert!(matches!(
            classifier.predict(&ten_by_five()),
            Err(VisaError::NotFitted(_))
        ));
    }
}
