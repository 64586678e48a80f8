use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::data_handling::Feature;
use crate::error::VisaError;
use crate::model_selection::ParamValue;

/// Settings for the split, outlier capping and encoding stage.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Share of rows held out for testing.
    pub test_fraction: f64,
    pub seed: u64,
    /// Quantile used as the upper cap of the capped columns.
    pub cap_quantile: f64,
    pub capped_columns: Vec<Feature>,
    pub cap_fit_scope: CapFitScope,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            cap_quantile: 0.95,
            capped_columns: vec![Feature::PrevailingWage, Feature::NoOfEmployees],
            cap_fit_scope: CapFitScope::Training,
        }
    }
}

/// Rows the outlier caps are learned from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapFitScope {
    /// Only training rows; the caps are then applied to both partitions.
    #[default]
    Training,
    /// All loaded rows, before the split.
    Full,
}

/// Split quality measure for decision trees.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gini" => Ok(Criterion::Gini),
            "entropy" => Ok(Criterion::Entropy),
            _ => Err(format!("Unknown criterion: {}", s)),
        }
    }
}

/// Number of features considered at each split.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    All,
    Sqrt,
    Log2,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Count(k) => k,
        };
        k.clamp(1, n_features.max(1))
    }
}

impl FromStr for MaxFeatures {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "none" => Ok(MaxFeatures::All),
            "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            other => other
                .parse::<usize>()
                .map(MaxFeatures::Count)
                .map_err(|_| format!("Unknown max_features: {}", s)),
        }
    }
}

/// Central configuration for one classifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Seed for bootstrap draws, feature sampling and row subsampling.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(flatten)]
    pub model_type: ModelType,
}

fn default_seed() -> u64 {
    42
}

/// Supported model types and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    DecisionTree {
        criterion: Criterion,
        max_depth: Option<usize>,
        min_samples_split: usize,
        min_samples_leaf: usize,
        max_features: MaxFeatures,
    },
    RandomForest {
        n_estimators: usize,
        criterion: Criterion,
        max_depth: Option<usize>,
        min_samples_split: usize,
        min_samples_leaf: usize,
        max_features: MaxFeatures,
        bootstrap: bool,
    },
    AdaBoost {
        n_estimators: usize,
        learning_rate: f64,
    },
    GBDT {
        learning_rate: f32,
        max_depth: u32,
        num_boost_round: u32,
        debug: bool,
        training_optimization_level: u8,
        loss_type: String,
    },
    XGBoost {
        learning_rate: f64,
        max_depth: usize,
        num_boost_round: usize,
        min_child_weight: f64,
        reg_lambda: f64,
        gamma: f64,
        subsample: f64,
        colsample_bytree: f64,
    },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::decision_tree()
    }
}

impl ModelType {
    pub fn decision_tree() -> Self {
        ModelType::DecisionTree {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }

    /// Shallow entropy tree with a minimum leaf size.
    pub fn pruned_decision_tree() -> Self {
        ModelType::DecisionTree {
            criterion: Criterion::Entropy,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 5,
            max_features: MaxFeatures::All,
        }
    }

    pub fn random_forest() -> Self {
        ModelType::RandomForest {
            n_estimators: 100,
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }

    pub fn adaboost() -> Self {
        ModelType::AdaBoost {
            n_estimators: 100,
            learning_rate: 1.0,
        }
    }

    pub fn gbdt() -> Self {
        ModelType::GBDT {
            learning_rate: 0.1,
            max_depth: 3,
            num_boost_round: 100,
            debug: false,
            training_optimization_level: 2,
            loss_type: "LogLikelyhood".to_string(),
        }
    }

    pub fn xgboost() -> Self {
        ModelType::XGBoost {
            learning_rate: 0.3,
            max_depth: 6,
            num_boost_round: 100,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
        }
    }

    /// Short identifier used in logs and on the command line.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelType::DecisionTree { .. } => "decision_tree",
            ModelType::RandomForest { .. } => "random_forest",
            ModelType::AdaBoost { .. } => "adaboost",
            ModelType::GBDT { .. } => "gbdt",
            ModelType::XGBoost { .. } => "xgboost",
        }
    }

    /// Copy of `self` with one hyper-parameter replaced.
    ///
    /// `n_estimators` is accepted as an alias of `num_boost_round` for the
    /// boosted models.
    pub fn with_param(&self, name: &str, value: &ParamValue) -> Result<ModelType, VisaError> {
        let invalid = || VisaError::InvalidParameter {
            model: self.kind().to_string(),
            param: format!("{}={}", name, value),
        };
        let mut out = self.clone();
        match &mut out {
            ModelType::DecisionTree {
                criterion,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                max_features,
            } => match name {
                "criterion" => *criterion = value.as_criterion().ok_or_else(invalid)?,
                "max_depth" => *max_depth = value.as_optional_usize().ok_or_else(invalid)?,
                "min_samples_split" => *min_samples_split = value.as_usize().ok_or_else(invalid)?,
                "min_samples_leaf" => *min_samples_leaf = value.as_usize().ok_or_else(invalid)?,
                "max_features" => *max_features = value.as_max_features().ok_or_else(invalid)?,
                _ => return Err(invalid()),
            },
            ModelType::RandomForest {
                n_estimators,
                criterion,
                max_depth,
                min_samples_split,
                min_samples_leaf,
                max_features,
                bootstrap,
            } => match name {
                "n_estimators" => *n_estimators = value.as_usize().ok_or_else(invalid)?,
                "criterion" => *criterion = value.as_criterion().ok_or_else(invalid)?,
                "max_depth" => *max_depth = value.as_optional_usize().ok_or_else(invalid)?,
                "min_samples_split" => *min_samples_split = value.as_usize().ok_or_else(invalid)?,
                "min_samples_leaf" => *min_samples_leaf = value.as_usize().ok_or_else(invalid)?,
                "max_features" => *max_features = value.as_max_features().ok_or_else(invalid)?,
                "bootstrap" => *bootstrap = value.as_bool().ok_or_else(invalid)?,
                _ => return Err(invalid()),
            },
            ModelType::AdaBoost {
                n_estimators,
                learning_rate,
            } => match name {
                "n_estimators" => *n_estimators = value.as_usize().ok_or_else(invalid)?,
                "learning_rate" => *learning_rate = value.as_f64().ok_or_else(invalid)?,
                _ => return Err(invalid()),
            },
            ModelType::GBDT {
                learning_rate,
                max_depth,
                num_boost_round,
                training_optimization_level,
                ..
            } => match name {
                "learning_rate" => *learning_rate = value.as_f64().ok_or_else(invalid)? as f32,
                "max_depth" => *max_depth = value.as_usize().ok_or_else(invalid)? as u32,
                "n_estimators" | "num_boost_round" => {
                    *num_boost_round = value.as_usize().ok_or_else(invalid)? as u32
                }
                "training_optimization_level" => {
                    *training_optimization_level = value.as_usize().ok_or_else(invalid)? as u8
                }
                _ => return Err(invalid()),
            },
            ModelType::XGBoost {
                learning_rate,
                max_depth,
                num_boost_round,
                min_child_weight,
                reg_lambda,
                gamma,
                subsample,
                colsample_bytree,
            } => match name {
                "learning_rate" | "eta" => *learning_rate = value.as_f64().ok_or_else(invalid)?,
                "max_depth" => *max_depth = value.as_usize().ok_or_else(invalid)?,
                "n_estimators" | "num_boost_round" => {
                    *num_boost_round = value.as_usize().ok_or_else(invalid)?
                }
                "min_child_weight" => *min_child_weight = value.as_f64().ok_or_else(invalid)?,
                "reg_lambda" | "lambda" => *reg_lambda = value.as_f64().ok_or_else(invalid)?,
                "gamma" => *gamma = value.as_f64().ok_or_else(invalid)?,
                "subsample" => *subsample = value.as_f64().ok_or_else(invalid)?,
                "colsample_bytree" => *colsample_bytree = value.as_f64().ok_or_else(invalid)?,
                _ => return Err(invalid()),
            },
        }
        Ok(out)
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "decision_tree" | "dt" => Ok(ModelType::decision_tree()),
            "pruned_decision_tree" | "pruned_dt" => Ok(ModelType::pruned_decision_tree()),
            "random_forest" | "rf" => Ok(ModelType::random_forest()),
            "adaboost" => Ok(ModelType::adaboost()),
            "gbdt" | "gradient_boosting" => Ok(ModelType::gbdt()),
            "xgboost" | "xgb" => Ok(ModelType::xgboost()),
            _ => Err(format!("Unknown model type: {}", s)),
        }
    }
}

impl ModelConfig {
    pub fn new(seed: u64, model_type: ModelType) -> Self {
        Self { seed, model_type }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            model_type: ModelType::default(),
        }
    }
}
