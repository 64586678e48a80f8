//! Core record and dataset types shared by every pipeline stage.
//!
//! `ApplicationRecord` is the typed form of one CSV row. After preprocessing the
//! records become an `EncodedDataset` (dense feature matrix plus labels), and the
//! train/test pair of those is held in an immutable `Partition`.
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::VisaError;

/// Outcome of a visa application. `Certified` is the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaseStatus {
    Denied,
    Certified,
}

impl CaseStatus {
    /// Both classes in code order (Denied = 0, Certified = 1).
    pub const ALL: [CaseStatus; 2] = [CaseStatus::Denied, CaseStatus::Certified];

    pub fn code(self) -> u8 {
        match self {
            CaseStatus::Denied => 0,
            CaseStatus::Certified => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, VisaError> {
        match code {
            0 => Ok(CaseStatus::Denied),
            1 => Ok(CaseStatus::Certified),
            other => Err(VisaError::UnknownLabel(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Denied => "Denied",
            CaseStatus::Certified => "Certified",
        }
    }

    pub fn is_certified(self) -> bool {
        self == CaseStatus::Certified
    }
}

impl FromStr for CaseStatus {
    type Err = VisaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Certified" => Ok(CaseStatus::Certified),
            "Denied" => Ok(CaseStatus::Denied),
            other => Err(VisaError::UnknownLabel(other.to_string())),
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model input columns, in the order they appear in the feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Continent,
    EducationOfEmployee,
    HasJobExperience,
    RequiresJobTraining,
    NoOfEmployees,
    YrOfEstab,
    RegionOfEmployment,
    PrevailingWage,
    UnitOfWage,
    FullTimePosition,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::Continent,
        Feature::EducationOfEmployee,
        Feature::HasJobExperience,
        Feature::RequiresJobTraining,
        Feature::NoOfEmployees,
        Feature::YrOfEstab,
        Feature::RegionOfEmployment,
        Feature::PrevailingWage,
        Feature::UnitOfWage,
        Feature::FullTimePosition,
    ];

    pub const CATEGORICAL: [Feature; 7] = [
        Feature::Continent,
        Feature::EducationOfEmployee,
        Feature::HasJobExperience,
        Feature::RequiresJobTraining,
        Feature::RegionOfEmployment,
        Feature::UnitOfWage,
        Feature::FullTimePosition,
    ];

    pub const NUMERIC: [Feature; 3] = [
        Feature::NoOfEmployees,
        Feature::YrOfEstab,
        Feature::PrevailingWage,
    ];

    /// Column header of the feature in the EasyVisa CSV.
    pub fn column_name(self) -> &'static str {
        match self {
            Feature::Continent => "continent",
            Feature::EducationOfEmployee => "education_of_employee",
            Feature::HasJobExperience => "has_job_experience",
            Feature::RequiresJobTraining => "requires_job_training",
            Feature::NoOfEmployees => "no_of_employees",
            Feature::YrOfEstab => "yr_of_estab",
            Feature::RegionOfEmployment => "region_of_employment",
            Feature::PrevailingWage => "prevailing_wage",
            Feature::UnitOfWage => "unit_of_wage",
            Feature::FullTimePosition => "full_time_position",
        }
    }

    pub fn is_categorical(self) -> bool {
        !self.is_numeric()
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Feature::NoOfEmployees | Feature::YrOfEstab | Feature::PrevailingWage
        )
    }

    /// Position of the feature in the encoded matrix.
    pub fn index(self) -> usize {
        Feature::ALL
            .iter()
            .position(|f| *f == self)
            .unwrap_or_default()
    }

    /// Y/N flag columns.
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Feature::HasJobExperience | Feature::RequiresJobTraining | Feature::FullTimePosition
        )
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Feature {
    type Err = VisaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.column_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VisaError::Config(format!("Unknown feature: {}", s)))
    }
}

/// One visa application as read from the input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub case_id: String,
    pub continent: String,
    pub education_of_employee: String,
    pub has_job_experience: String,
    pub requires_job_training: String,
    pub no_of_employees: f64,
    pub yr_of_estab: f64,
    pub region_of_employment: String,
    pub prevailing_wage: f64,
    pub unit_of_wage: String,
    pub full_time_position: String,
    pub case_status: CaseStatus,
}

impl ApplicationRecord {
    /// Value of a categorical feature, `None` for numeric features.
    pub fn category(&self, feature: Feature) -> Option<&str> {
        match feature {
            Feature::Continent => Some(&self.continent),
            Feature::EducationOfEmployee => Some(&self.education_of_employee),
            Feature::HasJobExperience => Some(&self.has_job_experience),
            Feature::RequiresJobTraining => Some(&self.requires_job_training),
            Feature::RegionOfEmployment => Some(&self.region_of_employment),
            Feature::UnitOfWage => Some(&self.unit_of_wage),
            Feature::FullTimePosition => Some(&self.full_time_position),
            _ => None,
        }
    }

    /// Value of a numeric feature, `None` for categorical features.
    pub fn numeric(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::NoOfEmployees => Some(self.no_of_employees),
            Feature::YrOfEstab => Some(self.yr_of_estab),
            Feature::PrevailingWage => Some(self.prevailing_wage),
            _ => None,
        }
    }

    pub fn numeric_mut(&mut self, feature: Feature) -> Option<&mut f64> {
        match feature {
            Feature::NoOfEmployees => Some(&mut self.no_of_employees),
            Feature::YrOfEstab => Some(&mut self.yr_of_estab),
            Feature::PrevailingWage => Some(&mut self.prevailing_wage),
            _ => None,
        }
    }
}

/// Encoded feature matrix with its labels.
///
/// `cardinality[j]` is `Some(k)` when column `j` holds categorical codes in
/// `0..k`, and `None` for numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDataset {
    x: Array2<f64>,
    y: Vec<CaseStatus>,
    row_ids: Vec<usize>,
    feature_names: Vec<String>,
    cardinality: Vec<Option<usize>>,
}

impl EncodedDataset {
    pub fn new(
        x: Array2<f64>,
        y: Vec<CaseStatus>,
        row_ids: Vec<usize>,
        feature_names: Vec<String>,
        cardinality: Vec<Option<usize>>,
    ) -> Result<Self, VisaError> {
        if x.nrows() != y.len() {
            return Err(VisaError::ShapeMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        if row_ids.len() != y.len() {
            return Err(VisaError::ShapeMismatch {
                expected: y.len(),
                actual: row_ids.len(),
            });
        }
        if feature_names.len() != x.ncols() || cardinality.len() != x.ncols() {
            return Err(VisaError::ShapeMismatch {
                expected: x.ncols(),
                actual: feature_names.len().min(cardinality.len()),
            });
        }
        Ok(Self {
            x,
            y,
            row_ids,
            feature_names,
            cardinality,
        })
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &[CaseStatus] {
        &self.y
    }

    /// Indices of the rows in the loaded record list.
    pub fn row_ids(&self) -> &[usize] {
        &self.row_ids
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn cardinality(&self) -> &[Option<usize>] {
        &self.cardinality
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Number of rows per class, as `(denied, certified)`.
    pub fn class_counts(&self) -> (usize, usize) {
        let certified = self.y.iter().filter(|s| s.is_certified()).count();
        (self.y.len() - certified, certified)
    }

    /// Verify every categorical column only holds integer codes in its fitted range.
    pub fn check_feature_ranges(&self) -> Result<(), VisaError> {
        for (j, card) in self.cardinality.iter().enumerate() {
            let Some(k) = card else { continue };
            for &value in self.x.column(j).iter() {
                if value.fract() != 0.0 || value < 0.0 || value >= *k as f64 {
                    return Err(VisaError::FeatureOutOfRange {
                        feature: self.feature_names[j].clone(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> EncodedDataset {
        EncodedDataset {
            x: self.x.select(Axis(0), indices),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            row_ids: indices.iter().map(|&i| self.row_ids[i]).collect(),
            feature_names: self.feature_names.clone(),
            cardinality: self.cardinality.clone(),
        }
    }
}

/// Disjoint train/test split of an encoded dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    train: EncodedDataset,
    test: EncodedDataset,
}

impl Partition {
    pub fn new(train: EncodedDataset, test: EncodedDataset) -> Result<Self, VisaError> {
        if train.n_features() != test.n_features() {
            return Err(VisaError::ShapeMismatch {
                expected: train.n_features(),
                actual: test.n_features(),
            });
        }
        let train_ids: HashSet<usize> = train.row_ids().iter().copied().collect();
        if let Some(shared) = test.row_ids().iter().find(|id| train_ids.contains(id)) {
            return Err(VisaError::InvalidSplit(format!(
                "row {} appears in both train and test partitions",
                shared
            )));
        }
        Ok(Self { train, test })
    }

    pub fn train(&self) -> &EncodedDataset {
        &self.train
    }

    pub fn test(&self) -> &EncodedDataset {
        &self.test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_dataset() -> EncodedDataset {
        EncodedDataset::new(
            array![[0.0, 10.0], [1.0, 20.0], [2.0, 30.0]],
            vec![CaseStatus::Certified, CaseStatus::Denied, CaseStatus::Certified],
            vec![0, 1, 2],
            vec!["continent".to_string(), "prevailing_wage".to_string()],
            vec![Some(3), None],
        )
        .unwrap()
    }

    #[test]
    fn case_status_codes() {
        assert_eq!(CaseStatus::Certified.code(), 1);
        assert_eq!(CaseStatus::Denied.code(), 0);
        assert_eq!("Certified".parse::<CaseStatus>().unwrap(), CaseStatus::Certified);
        assert!("Pending".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn feature_order_matches_columns() {
        assert_eq!(Feature::ALL.len(), 10);
        assert_eq!(Feature::PrevailingWage.index(), 7);
        assert_eq!("unit_of_wage".parse::<Feature>().unwrap(), Feature::UnitOfWage);
        assert!(Feature::CATEGORICAL.iter().all(|f| f.is_categorical()));
        assert!(Feature::NUMERIC.iter().all(|f| f.is_numeric()));
    }

    #[test]
    fn range_check_rejects_unknown_code() {
        let ds = small_dataset();
        assert!(ds.check_feature_ranges().is_ok());

        let bad = EncodedDataset::new(
            array![[3.0, 10.0]],
            vec![CaseStatus::Denied],
            vec![0],
            vec!["continent".to_string(), "prevailing_wage".to_string()],
            vec![Some(3), None],
        )
        .unwrap();
        assert!(matches!(
            bad.check_feature_ranges(),
            Err(VisaError::FeatureOutOfRange { .. })
        ));
    }

    #[test]
    fn partition_rejects_overlap() {
        let ds = small_dataset();
        let train = ds.select(&[0, 1]);
        let test = ds.select(&[1, 2]);
        assert!(Partition::new(train.clone(), test).is_err());
        assert!(Partition::new(train, ds.select(&[2])).is_ok());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = EncodedDataset::new(
            array![[0.0], [1.0]],
            vec![CaseStatus::Denied],
            vec![0],
            vec!["continent".to_string()],
            vec![Some(2)],
        )
        .unwrap_err();
        assert_eq!(err, VisaError::ShapeMismatch { expected: 2, actual: 1 });
    }
}
