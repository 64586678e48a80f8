//! Descriptive statistics over loaded application records.
//!
//! Everything here is read-only on the records: the summaries feed console
//! output and the exploratory report, never the models.
use std::collections::BTreeMap;

use serde::Serialize;
use statrs::statistics::{Data, Distribution, Max, Min};

use crate::data_handling::{ApplicationRecord, CaseStatus, Feature};

/// Quantile with linear interpolation between the closest order statistics.
///
/// # Arguments
///
/// * `values` - Sample values, in any order
/// * `q` - Quantile in `[0, 1]`
///
/// # Returns
///
/// `None` for an empty sample or a `q` outside `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(quantile_sorted(&sorted, q))
}

pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// `describe()`-style summary of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl NumericSummary {
    pub fn from_values(column: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let data = Data::new(values.to_vec());
        Some(Self {
            column: column.to_string(),
            count: values.len(),
            mean: data.mean().unwrap_or(f64::NAN),
            std: data.std_dev().unwrap_or(f64::NAN),
            min: data.min(),
            q25: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q75: quantile_sorted(&sorted, 0.75),
            max: data.max(),
        })
    }
}

/// Summary of a categorical column: distinct values and the most frequent one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub count: usize,
    pub unique: usize,
    pub top: String,
    pub freq: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub n_rows: usize,
    pub n_columns: usize,
    pub duplicated_case_ids: usize,
    pub numeric: Vec<NumericSummary>,
    pub categorical: Vec<CategoricalSummary>,
    pub class_balance: ClassBalance,
}

/// Summarize every numeric and categorical feature of the records.
pub fn summarize(records: &[ApplicationRecord]) -> DatasetSummary {
    let numeric = Feature::NUMERIC
        .iter()
        .filter_map(|&f| {
            let values: Vec<f64> = records.iter().filter_map(|r| r.numeric(f)).collect();
            NumericSummary::from_values(f.column_name(), &values)
        })
        .collect();

    let categorical = Feature::CATEGORICAL
        .iter()
        .map(|&f| {
            let counts = value_counts(records, f);
            // ties resolve to the alphabetically first category
            let (top, freq) = counts
                .iter()
                .fold((String::new(), 0usize), |best, (value, &n)| {
                    if n > best.1 {
                        (value.clone(), n)
                    } else {
                        best
                    }
                });
            CategoricalSummary {
                column: f.column_name().to_string(),
                count: records.len(),
                unique: counts.len(),
                top,
                freq,
            }
        })
        .collect();

    let mut ids: Vec<&str> = records.iter().map(|r| r.case_id.as_str()).collect();
    ids.sort_unstable();
    let before = ids.len();
    ids.dedup();

    DatasetSummary {
        n_rows: records.len(),
        n_columns: 12,
        duplicated_case_ids: before - ids.len(),
        numeric,
        categorical,
        class_balance: class_balance(records),
    }
}

/// Occurrences of each category of `feature`, sorted by category.
pub fn value_counts(records: &[ApplicationRecord], feature: Feature) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in records.iter().filter_map(|r| r.category(feature)) {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassBalance {
    pub certified: usize,
    pub denied: usize,
}

impl ClassBalance {
    pub fn total(&self) -> usize {
        self.certified + self.denied
    }

    pub fn certified_pct(&self) -> f64 {
        percent(self.certified, self.total())
    }

    pub fn denied_pct(&self) -> f64 {
        percent(self.denied, self.total())
    }
}

pub fn class_balance(records: &[ApplicationRecord]) -> ClassBalance {
    let certified = records
        .iter()
        .filter(|r| r.case_status == CaseStatus::Certified)
        .count();
    ClassBalance {
        certified,
        denied: records.len() - certified,
    }
}

/// Outcome split within one category of a feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRate {
    pub category: String,
    pub count: usize,
    pub certified_pct: f64,
    pub denied_pct: f64,
}

/// Certification rate per category of a categorical feature, sorted by category.
pub fn certification_rates(records: &[ApplicationRecord], feature: Feature) -> Vec<CategoryRate> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for record in records {
        if let Some(value) = record.category(feature) {
            let entry = groups.entry(value).or_insert((0, 0));
            entry.0 += 1;
            if record.case_status.is_certified() {
                entry.1 += 1;
            }
        }
    }
    groups
        .into_iter()
        .map(|(category, (count, certified))| CategoryRate {
            category: category.to_string(),
            count,
            certified_pct: percent(certified, count),
            denied_pct: percent(count - certified, count),
        })
        .collect()
}

/// Pearson correlations between numeric columns, Y/N flags and the outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[i][j])
    }
}

pub fn correlation_matrix(records: &[ApplicationRecord]) -> CorrelationMatrix {
    let mut columns = Vec::new();
    let mut series: Vec<Vec<f64>> = Vec::new();

    for f in Feature::NUMERIC {
        columns.push(f.column_name().to_string());
        series.push(records.iter().filter_map(|r| r.numeric(f)).collect());
    }
    for f in Feature::CATEGORICAL.iter().copied().filter(|f| f.is_flag()) {
        columns.push(f.column_name().to_string());
        series.push(
            records
                .iter()
                .map(|r| flag_value(r.category(f).unwrap_or_default()))
                .collect(),
        );
    }
    columns.push("case_status".to_string());
    series.push(records.iter().map(|r| r.case_status.code() as f64).collect());

    let values = series
        .iter()
        .map(|a| series.iter().map(|b| pearson(a, b)).collect())
        .collect();
    CorrelationMatrix { columns, values }
}

fn flag_value(value: &str) -> f64 {
    if value.eq_ignore_ascii_case("Y") {
        1.0
    } else {
        0.0
    }
}

/// Pearson correlation coefficient; NaN when either series is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return f64::NAN;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
