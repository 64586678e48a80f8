//! Preprocessing: stratified split, outlier capping and categorical encoding.
//!
//! The split is drawn first, then the caps and category tables are fitted and
//! applied identically to both partitions. A fitted preprocessor never refits
//! on the rows it transforms.
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{CapFitScope, PreprocessConfig};
use crate::data_handling::{ApplicationRecord, CaseStatus, EncodedDataset, Feature, Partition};
use crate::error::VisaError;
use crate::stats::quantile_sorted;

/// Upper bounds learned for numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierCapper {
    bounds: Vec<(Feature, f64)>,
}

impl OutlierCapper {
    /// Learn the `q` quantile of every column in `columns` from `records`.
    pub fn fit(
        records: &[ApplicationRecord],
        columns: &[Feature],
        q: f64,
    ) -> Result<Self, VisaError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(VisaError::Config(format!(
                "cap quantile {} is outside [0, 1]",
                q
            )));
        }
        if records.is_empty() {
            return Err(VisaError::EmptyDataset);
        }
        let mut bounds = Vec::with_capacity(columns.len());
        for &feature in columns {
            if !feature.is_numeric() {
                return Err(VisaError::Config(format!(
                    "cannot cap non-numeric column '{}'",
                    feature
                )));
            }
            let values: Vec<f64> = records.iter().filter_map(|r| r.numeric(feature)).collect();
            let bound = upper_bound(&values, q);
            log::debug!("Capping {} at {:.4} (q = {})", feature, bound, q);
            bounds.push((feature, bound));
        }
        Ok(Self { bounds })
    }

    /// A capper that leaves every value unchanged.
    pub fn identity() -> Self {
        Self { bounds: Vec::new() }
    }

    pub fn bound(&self, feature: Feature) -> Option<f64> {
        self.bounds
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, b)| *b)
    }

    pub fn bounds(&self) -> &[(Feature, f64)] {
        &self.bounds
    }

    /// Clamp `value` to the bound of `feature` (if the column is capped).
    pub fn cap(&self, feature: Feature, value: f64) -> f64 {
        match self.bound(feature) {
            Some(bound) => value.min(bound),
            None => value,
        }
    }

    /// Capped copies of the records. Applying this twice changes nothing.
    pub fn transform(&self, records: &[ApplicationRecord]) -> Vec<ApplicationRecord> {
        records
            .iter()
            .map(|record| {
                let mut capped = record.clone();
                for &(feature, bound) in &self.bounds {
                    if let Some(v) = capped.numeric_mut(feature) {
                        *v = v.min(bound);
                    }
                }
                capped
            })
            .collect()
    }
}

fn upper_bound(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, q)
}

/// Clip `values` at their `q` quantile. Returns the bound and the clipped values.
pub fn cap_at_quantile(values: &[f64], q: f64) -> Option<(f64, Vec<f64>)> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let bound = upper_bound(values, q);
    Some((bound, values.iter().map(|v| v.min(bound)).collect()))
}

/// Per-column category tables mapping sorted distinct values to `0..k`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryEncoder {
    classes: Vec<(Feature, Vec<String>)>,
}

impl CategoryEncoder {
    pub fn fit(records: &[ApplicationRecord]) -> Result<Self, VisaError> {
        if records.is_empty() {
            return Err(VisaError::EmptyDataset);
        }
        let classes = Feature::CATEGORICAL
            .iter()
            .map(|&feature| {
                let mut values: Vec<String> = records
                    .iter()
                    .filter_map(|r| r.category(feature))
                    .map(str::to_string)
                    .collect();
                values.sort();
                values.dedup();
                log::trace!("{}: {} categories {:?}", feature, values.len(), values);
                (feature, values)
            })
            .collect();
        Ok(Self { classes })
    }

    /// Sorted categories learned for `feature`; `None` for numeric columns.
    pub fn classes(&self, feature: Feature) -> Option<&[String]> {
        self.classes
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, c)| c.as_slice())
    }

    pub fn cardinality(&self, feature: Feature) -> Option<usize> {
        self.classes(feature).map(|c| c.len())
    }

    /// Code of `value` in the table of `feature`.
    pub fn encode(&self, feature: Feature, value: &str) -> Result<usize, VisaError> {
        let classes = self.classes(feature).ok_or_else(|| {
            VisaError::Config(format!("'{}' is not a categorical column", feature))
        })?;
        classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map_err(|_| VisaError::UnseenCategory {
                column: feature.column_name().to_string(),
                value: value.to_string(),
            })
    }

    pub fn decode(&self, feature: Feature, code: usize) -> Option<&str> {
        self.classes(feature)?.get(code).map(String::as_str)
    }
}

/// Row indices of the two sides of a split, each sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified shuffle split.
///
/// The test side receives `ceil(n * test_fraction)` rows. Per-class test
/// counts follow the class shares, rounded with the largest-remainder rule so
/// the totals add up exactly. Rows inside each class are shuffled with a
/// `StdRng` seeded from `seed`.
pub fn stratified_split(
    labels: &[CaseStatus],
    test_fraction: f64,
    seed: u64,
) -> Result<SplitIndices, VisaError> {
    let n = labels.len();
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(VisaError::InvalidSplit(format!(
            "test fraction {} must be strictly between 0 and 1",
            test_fraction
        )));
    }
    let n_test = ((n as f64 * test_fraction) - 1e-9).ceil().max(0.0) as usize;
    if n_test == 0 || n_test >= n {
        return Err(VisaError::InvalidSplit(format!(
            "{} rows cannot be split with test fraction {}",
            n, test_fraction
        )));
    }

    let by_class: Vec<Vec<usize>> = CaseStatus::ALL
        .iter()
        .map(|&class| (0..n).filter(|&i| labels[i] == class).collect())
        .collect();

    // largest-remainder allocation of n_test over the classes
    let exact: Vec<f64> = by_class
        .iter()
        .map(|rows| n_test as f64 * rows.len() as f64 / n as f64)
        .collect();
    let mut allocation: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut leftover = n_test - allocation.iter().sum::<usize>();
    let mut order: Vec<usize> = (0..by_class.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra)
    });
    for &class in order.iter().cycle().take(order.len() * 2) {
        if leftover == 0 {
            break;
        }
        if allocation[class] < by_class[class].len() {
            allocation[class] += 1;
            leftover -= 1;
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (rows, &k) in by_class.iter().zip(allocation.iter()) {
        let mut shuffled = rows.clone();
        shuffled.shuffle(&mut rng);
        test.extend_from_slice(&shuffled[..k]);
        train.extend_from_slice(&shuffled[k..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    log::debug!(
        "Stratified split: {} train / {} test rows (test per class {:?})",
        train.len(),
        test.len(),
        allocation
    );
    Ok(SplitIndices { train, test })
}

/// Caps and category tables fitted on one run's training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPreprocessor {
    capper: OutlierCapper,
    encoder: CategoryEncoder,
}

impl FittedPreprocessor {
    pub fn new(capper: OutlierCapper, encoder: CategoryEncoder) -> Self {
        Self { capper, encoder }
    }

    pub fn capper(&self) -> &OutlierCapper {
        &self.capper
    }

    pub fn encoder(&self) -> &CategoryEncoder {
        &self.encoder
    }

    /// Encode all records; row ids are their positions in `records`.
    pub fn transform(&self, records: &[ApplicationRecord]) -> Result<EncodedDataset, VisaError> {
        let indices: Vec<usize> = (0..records.len()).collect();
        self.transform_rows(records, &indices)
    }

    /// Encode `records[i]` for every `i` in `indices`, in that order.
    pub fn transform_rows(
        &self,
        records: &[ApplicationRecord],
        indices: &[usize],
    ) -> Result<EncodedDataset, VisaError> {
        let n_features = Feature::ALL.len();
        let mut values = Vec::with_capacity(indices.len() * n_features);
        let mut labels = Vec::with_capacity(indices.len());

        for &i in indices {
            let record = records.get(i).ok_or(VisaError::ShapeMismatch {
                expected: records.len(),
                actual: i + 1,
            })?;
            for feature in Feature::ALL {
                let value = match record.category(feature) {
                    Some(category) => self.encoder.encode(feature, category)? as f64,
                    None => self
                        .capper
                        .cap(feature, record.numeric(feature).unwrap_or_default()),
                };
                values.push(value);
            }
            labels.push(record.case_status);
        }

        let x = Array2::from_shape_vec((indices.len(), n_features), values).map_err(|_| {
            VisaError::ShapeMismatch {
                expected: indices.len() * n_features,
                actual: labels.len() * n_features,
            }
        })?;
        EncodedDataset::new(
            x,
            labels,
            indices.to_vec(),
            Feature::ALL.iter().map(|f| f.column_name().to_string()).collect(),
            Feature::ALL
                .iter()
                .map(|&f| self.encoder.cardinality(f))
                .collect(),
        )
    }
}

/// Output of one preprocessing run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOutput {
    pub fitted: FittedPreprocessor,
    pub split: SplitIndices,
    pub partition: Partition,
}

pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Split, fit caps and encoders, and encode both partitions.
    pub fn run(&self, records: &[ApplicationRecord]) -> Result<PreprocessOutput, VisaError> {
        if records.is_empty() {
            return Err(VisaError::EmptyDataset);
        }
        let labels: Vec<CaseStatus> = records.iter().map(|r| r.case_status).collect();
        let split = stratified_split(&labels, self.config.test_fraction, self.config.seed)?;

        let train_records: Vec<ApplicationRecord> =
            split.train.iter().map(|&i| records[i].clone()).collect();

        let capper = match self.config.cap_fit_scope {
            CapFitScope::Training => OutlierCapper::fit(
                &train_records,
                &self.config.capped_columns,
                self.config.cap_quantile,
            )?,
            CapFitScope::Full => OutlierCapper::fit(
                records,
                &self.config.capped_columns,
                self.config.cap_quantile,
            )?,
        };
        let encoder = CategoryEncoder::fit(&train_records)?;
        let fitted = FittedPreprocessor::new(capper, encoder);

        let train = fitted.transform_rows(records, &split.train)?;
        let test = fitted.transform_rows(records, &split.test)?;
        let partition = Partition::new(train, test)?;

        let (train_denied, train_certified) = partition.train().class_counts();
        let (test_denied, test_certified) = partition.test().class_counts();
        log::info!(
            "Preprocessed {} rows: train {} ({} certified / {} denied), test {} ({} certified / {} denied)",
            records.len(),
            partition.train().n_rows(),
            train_certified,
            train_denied,
            partition.test().n_rows(),
            test_certified,
            test_denied
        );

        Ok(PreprocessOutput {
            fitted,
            split,
            partition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(continent: &str, wage: f64, status: CaseStatus) -> ApplicationRecord {
        ApplicationRecord {
            case_id: format!("EZYV-{}-{}", continent, wage),
            continent: continent.to_string(),
            education_of_employee: "Master's".to_string(),
            has_job_experience: "Y".to_string(),
            requires_job_training: "N".to_string(),
            no_of_employees: 50.0,
            yr_of_estab: 1999.0,
            region_of_employment: "South".to_string(),
            prevailing_wage: wage,
            unit_of_wage: "Year".to_string(),
            full_time_position: "Y".to_string(),
            case_status: status,
        }
    }

    #[test]
    fn encoder_uses_sorted_codes() {
        let records = vec![
            record("Europe", 1.0, CaseStatus::Certified),
            record("Asia", 2.0, CaseStatus::Denied),
            record("Africa", 3.0, CaseStatus::Certified),
            record("Asia", 4.0, CaseStatus::Certified),
        ];
        let enc = CategoryEncoder::fit(&records).unwrap();
        assert_eq!(enc.encode(Feature::Continent, "Africa").unwrap(), 0);
        assert_eq!(enc.encode(Feature::Continent, "Asia").unwrap(), 1);
        assert_eq!(enc.encode(Feature::Continent, "Europe").unwrap(), 2);
        assert_eq!(enc.decode(Feature::Continent, 2), Some("Europe"));
        assert_eq!(enc.cardinality(Feature::Continent), Some(3));
        assert_eq!(enc.cardinality(Feature::PrevailingWage), None);
    }

    #[test]
    fn encoder_rejects_unseen_category() {
        let enc = CategoryEncoder::fit(&[record("Asia", 1.0, CaseStatus::Denied)]).unwrap();
        let err = enc.encode(Feature::Continent, "Oceania").unwrap_err();
        assert_eq!(
            err,
            VisaError::UnseenCategory {
                column: "continent".to_string(),
                value: "Oceania".to_string()
            }
        );
    }

    #[test]
    fn capper_rejects_categorical_column() {
        let records = vec![record("Asia", 1.0, CaseStatus::Denied)];
        assert!(OutlierCapper::fit(&records, &[Feature::Continent], 0.95).is_err());
    }

    #[test]
    fn capping_is_idempotent() {
        let records: Vec<ApplicationRecord> = (1..=20)
            .map(|i| record("Asia", i as f64 * 1000.0, CaseStatus::Certified))
            .collect();
        let capper = OutlierCapper::fit(&records, &[Feature::PrevailingWage], 0.95).unwrap();
        let once = capper.transform(&records);
        let twice = capper.transform(&once);
        assert_eq!(once, twice);
        let bound = capper.bound(Feature::PrevailingWage).unwrap();
        assert!(once.iter().all(|r| r.prevailing_wage <= bound));
    }

    #[test]
    fn split_rejects_degenerate_fractions() {
        let labels = vec![CaseStatus::Certified; 4];
        assert!(stratified_split(&labels, 0.0, 1).is_err());
        assert!(stratified_split(&labels, 1.0, 1).is_err());
        assert!(stratified_split(&labels[..1], 0.2, 1).is_err());
    }

    #[test]
    fn split_allocates_largest_remainder() {
        let mut labels = vec![CaseStatus::Certified; 7];
        labels.extend(vec![CaseStatus::Denied; 3]);
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 2);
        let test_certified = split
            .test
            .iter()
            .filter(|&&i| labels[i] == CaseStatus::Certified)
            .count();
        assert_eq!(test_certified, 1);
    }
}
