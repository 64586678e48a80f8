//! Hyperparameter search with stratified k-fold cross-validation.
//!
//! Candidates are scored by mean validation accuracy over the folds of the
//! training partition only. Scoring runs in parallel, but results are kept in
//! candidate order and the first candidate with the highest mean wins.
use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{Criterion, MaxFeatures, ModelConfig};
use crate::data_handling::{CaseStatus, EncodedDataset};
use crate::error::VisaError;
use crate::evaluation::accuracy;
use crate::models::factory::build_model;

/// One hyperparameter value as written in a JSON grid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }

    /// `null` maps to `Some(None)` (no limit).
    pub fn as_optional_usize(&self) -> Option<Option<usize>> {
        match self {
            ParamValue::Null => Some(None),
            other => other.as_usize().map(Some),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_criterion(&self) -> Option<Criterion> {
        match self {
            ParamValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_max_features(&self) -> Option<MaxFeatures> {
        match self {
            ParamValue::Null => Some(MaxFeatures::All),
            ParamValue::Text(s) => s.parse().ok(),
            ParamValue::Int(_) => self.as_usize().map(MaxFeatures::Count),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "None"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Candidate values per hyperparameter name. Keys iterate in sorted order.
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// One point of a grid.
pub type ParamSet = Vec<(String, ParamValue)>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Every combination of the grid.
    #[default]
    Grid,
    /// `n_iter` distinct combinations drawn with the model seed.
    Randomized { n_iter: usize },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(default)]
    pub strategy: SearchStrategy,
    pub param_grid: ParamGrid,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
}

fn default_cv_folds() -> usize {
    5
}

impl SearchConfig {
    pub fn grid(param_grid: ParamGrid, cv_folds: usize) -> Self {
        Self {
            strategy: SearchStrategy::Grid,
            param_grid,
            cv_folds,
        }
    }

    pub fn randomized(param_grid: ParamGrid, n_iter: usize, cv_folds: usize) -> Self {
        Self {
            strategy: SearchStrategy::Randomized { n_iter },
            param_grid,
            cv_folds,
        }
    }
}

/// Cartesian product of the grid; the last key varies fastest.
pub fn expand_grid(grid: &ParamGrid) -> Vec<ParamSet> {
    if grid.is_empty() || grid.values().any(|v| v.is_empty()) {
        return Vec::new();
    }
    let mut combos: Vec<ParamSet> = vec![Vec::new()];
    for (name, values) in grid {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut next = prefix.clone();
                    next.push((name.clone(), value.clone()));
                    next
                })
            })
            .collect();
    }
    combos
}

/// A single train/validation split of row positions.
#[derive(Debug, Clone, PartialEq)]
pub struct CvSplit {
    pub fold_idx: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// K-fold splitter that keeps each class spread evenly over the folds.
///
/// Rows are dealt round-robin in their original order, Denied rows first, with
/// one fold counter shared by both classes. No shuffling.
#[derive(Debug, Clone, Copy)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn split(&self, y: &[CaseStatus]) -> Result<Vec<CvSplit>, VisaError> {
        let k = self.n_splits;
        if k < 2 {
            return Err(VisaError::InvalidSplit(format!(
                "cross-validation needs at least 2 folds, got {}",
                k
            )));
        }
        if y.len() < k {
            return Err(VisaError::InvalidSplit(format!(
                "{} rows cannot be split into {} folds",
                y.len(),
                k
            )));
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
        let mut counter = 0usize;
        for class in CaseStatus::ALL {
            for (i, _) in y.iter().enumerate().filter(|(_, s)| **s == class) {
                folds[counter % k].push(i);
                counter += 1;
            }
        }
        for fold in folds.iter_mut() {
            fold.sort_unstable();
        }

        Ok((0..k)
            .map(|fold_idx| CvSplit {
                fold_idx,
                test_indices: folds[fold_idx].clone(),
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
            })
            .collect())
    }
}

/// Validation accuracy of `config` on each split of `data`.
pub fn cross_val_accuracy(
    config: &ModelConfig,
    data: &EncodedDataset,
    splits: &[CvSplit],
) -> Result<Vec<f64>, VisaError> {
    splits
        .iter()
        .map(|split| {
            let train = data.select(&split.train_indices);
            let valid = data.select(&split.test_indices);
            let mut model = build_model(config)?;
            model.fit(train.x(), train.y())?;
            let predicted = model.predict(valid.x())?;
            let score = accuracy(valid.y(), &predicted)?;
            log::trace!(
                "{} fold {}: accuracy {:.4}",
                config.model_type.kind(),
                split.fold_idx,
                score
            );
            Ok(score)
        })
        .collect()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best_params: ParamSet,
    pub best_config: ModelConfig,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
}

/// Candidate parameter sets in evaluation order.
pub fn candidate_params(search: &SearchConfig, seed: u64) -> Vec<ParamSet> {
    let all = expand_grid(&search.param_grid);
    match search.strategy {
        SearchStrategy::Grid => all,
        SearchStrategy::Randomized { n_iter } => {
            if n_iter >= all.len() {
                return all;
            }
            let mut rng = StdRng::seed_from_u64(seed);
            rand::seq::index::sample(&mut rng, all.len(), n_iter)
                .into_iter()
                .map(|i| all[i].clone())
                .collect()
        }
    }
}

/// Score every candidate of `search` on `train` and pick the best.
pub fn search(
    base: &ModelConfig,
    search: &SearchConfig,
    train: &EncodedDataset,
) -> Result<SearchOutcome, VisaError> {
    let kind = base.model_type.kind();
    let params = candidate_params(search, base.seed);
    if params.is_empty() {
        return Err(VisaError::EmptySearchSpace(kind.to_string()));
    }

    let configs: Vec<ModelConfig> = params
        .iter()
        .map(|set| {
            let mut model_type = base.model_type.clone();
            for (name, value) in set {
                model_type = model_type.with_param(name, value)?;
            }
            Ok(ModelConfig::new(base.seed, model_type))
        })
        .collect::<Result<_, VisaError>>()?;

    let splits = StratifiedKFold::new(search.cv_folds).split(train.y())?;
    log::info!(
        "Searching {} candidates for {} with {}-fold cross-validation",
        configs.len(),
        kind,
        search.cv_folds
    );

    let fold_scores: Vec<Vec<f64>> = configs
        .par_iter()
        .map(|config| cross_val_accuracy(config, train, &splits))
        .collect::<Result<_, VisaError>>()?;

    let candidates: Vec<CandidateScore> = params
        .into_iter()
        .zip(fold_scores)
        .map(|(params, scores)| {
            let n = scores.len() as f64;
            let mean = scores.iter().sum::<f64>() / n;
            let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            CandidateScore {
                params,
                fold_scores: scores,
                mean_score: mean,
                std_score: var.sqrt(),
            }
        })
        .collect();

    let mut best_idx = 0;
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.mean_score > candidates[best_idx].mean_score {
            best_idx = i;
        }
    }
    let best = &candidates[best_idx];
    log::info!(
        "Best {} parameters: {} (mean accuracy {:.4})",
        kind,
        format_params(&best.params),
        best.mean_score
    );

    Ok(SearchOutcome {
        best_params: best.params.clone(),
        best_config: configs[best_idx].clone(),
        best_score: best.mean_score,
        candidates,
    })
}

/// `name=value` pairs joined by commas.
pub fn format_params(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use CaseStatus::{Certified, Denied};

    fn grid(entries: &[(&str, Vec<ParamValue>)]) -> ParamGrid {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn grid_expands_in_sorted_key_order() {
        let g = grid(&[
            ("max_depth", vec![ParamValue::Int(3), ParamValue::Null]),
            ("criterion", vec![ParamValue::Text("gini".into()), ParamValue::Text("entropy".into())]),
        ]);
        let combos = expand_grid(&g);
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0][0].0, "criterion");
        assert_eq!(combos[0][1], ("max_depth".to_string(), ParamValue::Int(3)));
        assert_eq!(combos[1][1], ("max_depth".to_string(), ParamValue::Null));
        assert_eq!(combos[2][0].1, ParamValue::Text("entropy".into()));
    }

    #[test]
    fn empty_grid_has_no_candidates() {
        assert!(expand_grid(&ParamGrid::new()).is_empty());
        assert!(expand_grid(&grid(&[("max_depth", vec![])])).is_empty());
    }

    #[test]
    fn randomized_sampling_is_seeded_and_distinct() {
        let g = grid(&[
            ("n_estimators", vec![ParamValue::Int(50), ParamValue::Int(100)]),
            ("max_depth", vec![ParamValue::Int(10), ParamValue::Int(20)]),
            ("min_samples_split", vec![ParamValue::Int(5), ParamValue::Int(10)]),
        ]);
        let cfg = SearchConfig::randomized(g, 5, 3);
        let a = candidate_params(&cfg, 42);
        let b = candidate_params(&cfg, 42);
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        for i in 0..a.len() {
            for j in i + 1..a.len() {
                assert_ne!(a[i], a[j]);
            }
        }
    }

    #[test]
    fn stratified_folds_partition_rows() {
        let mut y = vec![Certified; 14];
        y.extend(vec![Denied; 6]);
        let splits = StratifiedKFold::new(5).split(&y).unwrap();
        assert_eq!(splits.len(), 5);

        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());

        for split in &splits {
            assert_eq!(split.test_indices.len(), 4);
            assert_eq!(split.train_indices.len(), 16);
            let denied = split.test_indices.iter().filter(|&&i| y[i] == Denied).count();
            assert!((1..=2).contains(&denied), "fold {} has {} denied", split.fold_idx, denied);
        }
    }

    #[test]
    fn too_few_rows_for_folds() {
        assert!(StratifiedKFold::new(5).split(&[Certified, Denied]).is_err());
        assert!(StratifiedKFold::new(1).split(&[Certified, Denied]).is_err());
    }

    #[test]
    fn param_value_json_forms() {
        let values: Vec<ParamValue> =
            serde_json::from_str(r#"[null, 3, 0.1, "entropy", true]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Null,
                ParamValue::Int(3),
                ParamValue::Float(0.1),
                ParamValue::Text("entropy".to_string()),
                ParamValue::Bool(true),
            ]
        );
        assert_eq!(values[0].as_optional_usize(), Some(None));
        assert_eq!(values[2].as_f64(), Some(0.1));
        assert_eq!(values[3].as_criterion(), Some(Criterion::Entropy));
    }
}
