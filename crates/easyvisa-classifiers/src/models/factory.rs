use crate::config::{ModelConfig, ModelType};
use crate::error::VisaError;
use crate::models::adaboost::AdaBoost;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::decision_tree::DecisionTree;
use crate::models::gbdt::GBDTClassifier;
use crate::models::random_forest::RandomForest;
use crate::models::xgboost::XGBoostClassifier;

/// Build an unfitted boxed classifier from a `ModelConfig`.
pub fn build_model(params: &ModelConfig) -> Result<Box<dyn ClassifierModel>, VisaError> {
    let model: Box<dyn ClassifierModel> = match params.model_type {
        ModelType::DecisionTree { .. } => Box::new(DecisionTree::from_config(params)?),
        ModelType::RandomForest { .. } => Box::new(RandomForest::from_config(params)?),
        ModelType::AdaBoost { .. } => Box::new(AdaBoost::from_config(params)?),
        ModelType::GBDT { .. } => Box::new(GBDTClassifier::new(params.clone())),
        ModelType::XGBoost { .. } => Box::new(XGBoostClassifier::from_config(params)?),
    };
    Ok(model)
}
