use ndarray::Array2;

use easyvisa_classifiers::config::{ModelConfig, ModelType};
use easyvisa_classifiers::data_handling::{CaseStatus, EncodedDataset};
use easyvisa_classifiers::error::VisaError;
use easyvisa_classifiers::model_selection::{search, ParamGrid, ParamValue, SearchConfig};
use easyvisa_classifiers::models::factory;

fn tiny() -> (Array2<f64>, Vec<CaseStatus>) {
    let x = Array2::from_shape_vec(
        (8, 2),
        vec![
            1.0, 0.0, // certified
            0.0, 1.0, // denied
            1.0, 0.1, // certified
            0.0, 0.9, // denied
            1.1, 0.0, // certified
            0.0, 1.2, // denied
            0.9, 0.2, // certified
            0.1, 1.1, // denied
        ],
    )
    .expect("failed to create feature matrix");
    let y = (0..8)
        .map(|i| {
            if i % 2 == 0 {
                CaseStatus::Certified
            } else {
                CaseStatus::Denied
            }
        })
        .collect();
    (x, y)
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[test]
fn factory_builds_every_model_type() {
    let (x, y) = tiny();
    let types = [
        ModelType::decision_tree(),
        ModelType::RandomForest {
            n_estimators: 10,
            criterion: Default::default(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: Default::default(),
            bootstrap: false,
        },
        ModelType::AdaBoost {
            n_estimators: 10,
            learning_rate: 1.0,
        },
        ModelType::GBDT {
            learning_rate: 0.1,
            max_depth: 3,
            num_boost_round: 20,
            debug: false,
            training_optimization_level: 2,
            loss_type: "LogLikelyhood".to_string(),
        },
        ModelType::XGBoost {
            learning_rate: 0.3,
            max_depth: 3,
            num_boost_round: 20,
            min_child_weight: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
        },
    ];

    for model_type in types {
        let kind = model_type.kind();
        let mut model = factory::build_model(&ModelConfig::new(42, model_type)).unwrap();
        model.fit(&x, &y).unwrap();
        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions, y, "{} did not separate the tiny dataset", kind);
        let probs = model.predict_proba(&x).unwrap();
        assert_eq!(probs.len(), x.nrows());
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)), "{}", kind);
    }
}

#[test]
fn model_config_from_json() {
    let json = r#"{ "seed": 7, "AdaBoost": { "n_estimators": 25, "learning_rate": 0.5 } }"#;
    let config: ModelConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(
        config.model_type,
        ModelType::AdaBoost {
            n_estimators: 25,
            learning_rate: 0.5
        }
    );
}

// ---------------------------------------------------------------------------
// Hyperparameter search
// ---------------------------------------------------------------------------

fn dataset(n: usize) -> EncodedDataset {
    let mut values = Vec::with_capacity(n * 2);
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let level = (i % 4) as f64;
        values.push(level);
        values.push((i % 10) as f64);
        y.push(if level >= 2.0 {
            CaseStatus::Certified
        } else {
            CaseStatus::Denied
        });
    }
    EncodedDataset::new(
        Array2::from_shape_vec((n, 2), values).unwrap(),
        y,
        (0..n).collect(),
        vec!["education_of_employee".to_string(), "no_of_employees".to_string()],
        vec![Some(4), None],
    )
    .unwrap()
}

#[test]
fn grid_search_scores_every_candidate() {
    let mut grid = ParamGrid::new();
    grid.insert(
        "criterion".to_string(),
        vec![ParamValue::Text("gini".into()), ParamValue::Text("entropy".into())],
    );
    grid.insert("max_depth".to_string(), vec![ParamValue::Int(1), ParamValue::Int(3)]);
    let outcome = search(
        &ModelConfig::default(),
        &SearchConfig::grid(grid, 5),
        &dataset(80),
    )
    .unwrap();

    assert_eq!(outcome.candidates.len(), 4);
    for candidate in &outcome.candidates {
        assert_eq!(candidate.fold_scores.len(), 5);
    }
    // every candidate separates the data; the first one wins the tie
    assert_eq!(outcome.best_score, 1.0);
    assert_eq!(outcome.best_params, outcome.candidates[0].params);
}

#[test]
fn empty_grid_is_rejected() {
    let result = search(
        &ModelConfig::default(),
        &SearchConfig::grid(ParamGrid::new(), 3),
        &dataset(30),
    );
    assert!(matches!(result, Err(VisaError::EmptySearchSpace(_))));
}

#[test]
fn unknown_parameter_is_rejected() {
    let mut grid = ParamGrid::new();
    grid.insert("n_neighbors".to_string(), vec![ParamValue::Int(5)]);
    let result = search(&ModelConfig::default(), &SearchConfig::grid(grid, 3), &dataset(30));
    assert!(matches!(result, Err(VisaError::InvalidParameter { .. })));
}

#[test]
fn search_config_from_json() {
    let json = r#"{
        "strategy": { "randomized": { "n_iter": 2 } },
        "param_grid": { "max_depth": [3, null], "min_samples_leaf": [1, 5] },
        "cv_folds": 3
    }"#;
    let config: SearchConfig = serde_json::from_str(json).unwrap();
    let outcome = search(&ModelConfig::default(), &config, &dataset(60)).unwrap();
    assert_eq!(outcome.candidates.len(), 2);
}
