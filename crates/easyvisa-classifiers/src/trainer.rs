//! Fit the configured roster of classifiers on a training partition.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::data_handling::{CaseStatus, EncodedDataset, Partition};
use crate::error::VisaError;
use crate::model_selection::{self, format_params, ParamGrid, ParamValue, SearchConfig, SearchOutcome};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::factory::build_model;

/// One entry of the model roster: a display name, the base configuration and
/// an optional hyperparameter search run before the final fit.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub model: ModelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,
}

impl ModelSpec {
    pub fn new(name: &str, model_type: ModelType) -> Self {
        Self {
            name: name.to_string(),
            model: ModelConfig::new(42, model_type),
            search: None,
        }
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = Some(search);
        self
    }
}

/// A fitted classifier together with the configuration it was fitted with.
pub struct TrainedModel {
    pub name: String,
    /// Final configuration; the best search candidate when a search ran.
    pub config: ModelConfig,
    pub search: Option<SearchOutcome>,
    model: Box<dyn ClassifierModel>,
}

impl TrainedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<CaseStatus>, VisaError> {
        self.model.predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, VisaError> {
        self.model.predict_proba(x)
    }

    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        self.model.feature_importances()
    }

    /// Fitted rules as indented text, available for single decision trees.
    pub fn rules_text(&self, feature_names: &[String]) -> Option<String> {
        self.model.rules_text(feature_names)
    }

    pub fn model(&self) -> &dyn ClassifierModel {
        self.model.as_ref()
    }
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("search", &self.search.as_ref().map(|s| s.best_score))
            .finish()
    }
}

/// Fit one model spec on `train`, running its search first when present.
pub fn train_model(spec: &ModelSpec, train: &EncodedDataset) -> Result<TrainedModel, VisaError> {
    train.check_feature_ranges()?;

    let (config, search) = match &spec.search {
        Some(search_config) => {
            let outcome = model_selection::search(&spec.model, search_config, train)?;
            log::info!(
                "{}: best parameters {} (cv accuracy {:.4})",
                spec.name,
                format_params(&outcome.best_params),
                outcome.best_score
            );
            (outcome.best_config.clone(), Some(outcome))
        }
        None => (spec.model.clone(), None),
    };

    let mut model = build_model(&config)?;
    model.fit(train.x(), train.y())?;
    log::info!("Trained {} on {} rows", spec.name, train.n_rows());

    Ok(TrainedModel {
        name: spec.name.clone(),
        config,
        search,
        model,
    })
}

/// Train every spec in order on the training side of `partition`.
pub fn train_all(specs: &[ModelSpec], partition: &Partition) -> Result<Vec<TrainedModel>, VisaError> {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(VisaError::DuplicateModel(spec.name.clone()));
        }
    }
    specs
        .iter()
        .map(|spec| train_model(spec, partition.train()))
        .collect()
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().map(|&v| ParamValue::Int(v)).collect()
}

fn texts(values: &[&str]) -> Vec<ParamValue> {
    values.iter().map(|v| ParamValue::Text(v.to_string())).collect()
}

/// The comparison roster: plain, entropy, tuned and pruned trees, a plain and
/// a tuned random forest, XGBoost with and without a grid search, AdaBoost
/// and gradient boosting.
pub fn default_model_specs() -> Vec<ModelSpec> {
    let mut dt_grid = ParamGrid::new();
    dt_grid.insert("criterion".into(), texts(&["gini", "entropy"]));
    dt_grid.insert(
        "max_depth".into(),
        vec![
            ParamValue::Int(3),
            ParamValue::Int(5),
            ParamValue::Int(10),
            ParamValue::Null,
        ],
    );
    dt_grid.insert("min_samples_split".into(), ints(&[2, 5, 10]));
    dt_grid.insert("min_samples_leaf".into(), ints(&[1, 5, 10]));

    let mut rf_grid = ParamGrid::new();
    rf_grid.insert("n_estimators".into(), ints(&[50, 100]));
    rf_grid.insert("max_depth".into(), ints(&[10, 20]));
    rf_grid.insert("min_samples_split".into(), ints(&[5, 10]));

    let mut xgb_grid = ParamGrid::new();
    xgb_grid.insert("n_estimators".into(), ints(&[100, 200, 300]));
    xgb_grid.insert("max_depth".into(), ints(&[3, 5, 7]));
    xgb_grid.insert(
        "learning_rate".into(),
        vec![
            ParamValue::Float(0.01),
            ParamValue::Float(0.1),
            ParamValue::Float(0.2),
        ],
    );

    let entropy_tree = ModelType::DecisionTree {
        criterion: crate::config::Criterion::Entropy,
        max_depth: None,
        min_samples_split: 2,
        min_samples_leaf: 1,
        max_features: crate::config::MaxFeatures::All,
    };

    vec![
        ModelSpec::new("Decision Tree", ModelType::decision_tree()),
        ModelSpec::new("Decision Tree (Entropy)", entropy_tree),
        ModelSpec::new("Tuned Decision Tree", ModelType::decision_tree())
            .with_search(SearchConfig::grid(dt_grid, 5)),
        ModelSpec::new("Pruned Decision Tree", ModelType::pruned_decision_tree()),
        ModelSpec::new("Random Forest", ModelType::random_forest()),
        ModelSpec::new("Tuned Random Forest", ModelType::random_forest())
            .with_search(SearchConfig::randomized(rf_grid, 5, 3)),
        ModelSpec::new("XGBoost", ModelType::xgboost()),
        ModelSpec::new("Tuned XGBoost", ModelType::xgboost())
            .with_search(SearchConfig::grid(xgb_grid, 3)),
        ModelSpec::new("AdaBoost", ModelType::adaboost()),
        ModelSpec::new("Gradient Boosting", ModelType::gbdt()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Criterion;
    use ndarray::Array2;
    use CaseStatus::{Certified, Denied};

    fn dataset() -> EncodedDataset {
        // column 0 is a 3-level code that decides the outcome, column 1 is noise
        let n = 60;
        let mut values = Vec::with_capacity(n * 2);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let code = (i % 3) as f64;
            values.push(code);
            values.push(((i * 7) % 11) as f64);
            y.push(if code == 2.0 { Denied } else { Certified });
        }
        EncodedDataset::new(
            Array2::from_shape_vec((n, 2), values).unwrap(),
            y,
            (0..n).collect(),
            vec!["education".to_string(), "wage".to_string()],
            vec![Some(3), None],
        )
        .unwrap()
    }

    #[test]
    fn trains_plain_spec() {
        let spec = ModelSpec::new("tree", ModelType::decision_tree());
        let trained = train_model(&spec, &dataset()).unwrap();
        assert_eq!(trained.name, "tree");
        assert!(trained.search.is_none());
        let data = dataset();
        assert_eq!(trained.predict(data.x()).unwrap(), data.y());
        assert!(trained.rules_text(data.feature_names()).unwrap().contains("education"));
    }

    #[test]
    fn search_result_becomes_final_config() {
        let mut grid = ParamGrid::new();
        grid.insert("max_depth".into(), vec![ParamValue::Int(1), ParamValue::Null]);
        grid.insert("criterion".into(), texts(&["entropy"]));
        let spec = ModelSpec::new("tuned", ModelType::decision_tree())
            .with_search(SearchConfig::grid(grid, 3));
        let trained = train_model(&spec, &dataset()).unwrap();
        let outcome = trained.search.as_ref().unwrap();
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.best_score, 1.0);
        // both candidates score 1.0, the first one wins
        match &trained.config.model_type {
            ModelType::DecisionTree { criterion, max_depth, .. } => {
                assert_eq!(*criterion, Criterion::Entropy);
                assert_eq!(*max_depth, Some(1));
            }
            other => panic!("unexpected model type {:?}", other),
        }
    }

    #[test]
    fn codes_outside_fitted_range_are_rejected() {
        let data = dataset();
        let bad = EncodedDataset::new(
            data.x().clone(),
            data.y().to_vec(),
            data.row_ids().to_vec(),
            data.feature_names().to_vec(),
            vec![Some(2), None],
        )
        .unwrap();
        let spec = ModelSpec::new("tree", ModelType::decision_tree());
        assert!(matches!(
            train_model(&spec, &bad),
            Err(VisaError::FeatureOutOfRange { .. })
        ));
    }

    #[test]
    fn default_roster_has_unique_names() {
        let specs = default_model_specs();
        assert_eq!(specs.len(), 10);
        let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 10);
        let tuned = specs.iter().filter(|s| s.search.is_some()).count();
        assert_eq!(tuned, 3);
    }

    #[test]
    fn model_spec_json_round_trip() {
        let spec = default_model_specs().remove(5);
        let json = serde_json::to_string(&spec).unwrap();
        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
