//! Accuracy, confusion matrices and the model comparison table.
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::data_handling::{CaseStatus, EncodedDataset, Partition};
use crate::error::VisaError;
use crate::trainer::TrainedModel;

/// A label as it may arrive from outside the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLabel {
    Text(String),
    Code(i64),
}

impl From<&str> for RawLabel {
    fn from(s: &str) -> Self {
        RawLabel::Text(s.to_string())
    }
}

impl From<i64> for RawLabel {
    fn from(code: i64) -> Self {
        RawLabel::Code(code)
    }
}

impl From<CaseStatus> for RawLabel {
    fn from(status: CaseStatus) -> Self {
        RawLabel::Text(status.as_str().to_string())
    }
}

/// Map a text or numeric label onto `CaseStatus`.
///
/// "Certified"/"Denied" and 1/0 are accepted; anything else is an
/// `UnknownLabel` error carrying the value.
pub fn normalize_label(raw: &RawLabel) -> Result<CaseStatus, VisaError> {
    match raw {
        RawLabel::Text(s) => s.parse(),
        RawLabel::Code(code) => CaseStatus::from_code(*code),
    }
}

fn check_lengths(actual: &[CaseStatus], predicted: &[CaseStatus]) -> Result<(), VisaError> {
    if actual.len() != predicted.len() {
        return Err(VisaError::ShapeMismatch {
            expected: actual.len(),
            actual: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(VisaError::EmptyDataset);
    }
    Ok(())
}

/// Share of positions where the prediction equals the actual label.
pub fn accuracy(actual: &[CaseStatus], predicted: &[CaseStatus]) -> Result<f64, VisaError> {
    check_lengths(actual, predicted)?;
    let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    Ok(correct as f64 / actual.len() as f64)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(p: f64, r: f64) -> f64 {
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

/// Binary confusion counts with Certified as the positive class.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(
        actual: &[CaseStatus],
        predicted: &[CaseStatus],
    ) -> Result<Self, VisaError> {
        check_lengths(actual, predicted)?;
        let mut cm = ConfusionMatrix::default();
        for (a, p) in actual.iter().zip(predicted) {
            match (a, p) {
                (CaseStatus::Certified, CaseStatus::Certified) => cm.tp += 1,
                (CaseStatus::Denied, CaseStatus::Certified) => cm.fp += 1,
                (CaseStatus::Denied, CaseStatus::Denied) => cm.tn += 1,
                (CaseStatus::Certified, CaseStatus::Denied) => cm.fn_ += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        harmonic(self.precision(), self.recall())
    }

    /// Rows are actual (Denied, Certified), columns predicted in the same order.
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: CaseStatus,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision, recall and F1 with macro and weighted averages.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let certified = {
            let p = cm.precision();
            let r = cm.recall();
            ClassMetrics {
                label: CaseStatus::Certified,
                precision: p,
                recall: r,
                f1: harmonic(p, r),
                support: cm.tp + cm.fn_,
            }
        };
        let denied = {
            let p = ratio(cm.tn, cm.tn + cm.fn_);
            let r = ratio(cm.tn, cm.tn + cm.fp);
            ClassMetrics {
                label: CaseStatus::Denied,
                precision: p,
                recall: r,
                f1: harmonic(p, r),
                support: cm.tn + cm.fp,
            }
        };
        let classes = vec![denied, certified];
        let total = cm.total();

        let average = |weight: &dyn Fn(&ClassMetrics) -> f64| -> (f64, f64, f64) {
            let w_sum: f64 = classes.iter().map(|c| weight(c)).sum();
            if w_sum == 0.0 {
                return (0.0, 0.0, 0.0);
            }
            classes.iter().fold((0.0, 0.0, 0.0), |(p, r, f), c| {
                let w = weight(c) / w_sum;
                (p + w * c.precision, r + w * c.recall, f + w * c.f1)
            })
        };
        let (mp, mr, mf) = average(&|_| 1.0);
        let (wp, wr, wf) = average(&|c| c.support as f64);

        // averaged rows carry the positive label as a placeholder
        let macro_avg = ClassMetrics {
            label: CaseStatus::Certified,
            precision: mp,
            recall: mr,
            f1: mf,
            support: total,
        };
        let weighted_avg = ClassMetrics {
            label: CaseStatus::Certified,
            precision: wp,
            recall: wr,
            f1: wf,
            support: total,
        };

        ClassificationReport {
            classes,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label.as_str(),
                c.precision,
                c.recall,
                c.f1,
                c.support
            )?;
        }
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, row) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, row.precision, row.recall, row.f1, row.support
            )?;
        }
        Ok(())
    }
}

/// Scores of one fitted model on both partitions.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub model_name: String,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion_matrix: ConfusionMatrix,
}

impl EvaluationResult {
    /// Train minus test accuracy.
    pub fn overfit_gap(&self) -> f64 {
        self.train_accuracy - self.test_accuracy
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport::from_confusion(&self.confusion_matrix)
    }
}

/// Score `model` on a train and a test dataset. Precision, recall, F1 and
/// the confusion matrix refer to the test rows.
pub fn evaluate(
    model: &TrainedModel,
    train: &EncodedDataset,
    test: &EncodedDataset,
) -> Result<EvaluationResult, VisaError> {
    let train_pred = model.predict(train.x())?;
    let test_pred = model.predict(test.x())?;
    let train_accuracy = accuracy(train.y(), &train_pred)?;
    let cm = ConfusionMatrix::from_labels(test.y(), &test_pred)?;

    let result = EvaluationResult {
        model_name: model.name.clone(),
        train_accuracy,
        test_accuracy: cm.accuracy(),
        precision: cm.precision(),
        recall: cm.recall(),
        f1: cm.f1(),
        confusion_matrix: cm,
    };
    log::debug!(
        "{}: train accuracy {:.4}, test accuracy {:.4}",
        result.model_name,
        result.train_accuracy,
        result.test_accuracy
    );
    Ok(result)
}

pub fn evaluate_partition(
    model: &TrainedModel,
    partition: &Partition,
) -> Result<EvaluationResult, VisaError> {
    evaluate(model, partition.train(), partition.test())
}

/// Evaluation results keyed by model name, in insertion order.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ComparisonTable {
    rows: Vec<EvaluationResult>,
}

impl ComparisonTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: EvaluationResult) -> Result<(), VisaError> {
        if self.get(&result.model_name).is_some() {
            return Err(VisaError::DuplicateModel(result.model_name));
        }
        self.rows.push(result);
        Ok(())
    }

    pub fn get(&self, model_name: &str) -> Option<&EvaluationResult> {
        self.rows.iter().find(|r| r.model_name == model_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First model with the highest test accuracy.
    pub fn best_by_test_accuracy(&self) -> Option<&EvaluationResult> {
        self.rows.iter().fold(None, |best: Option<&EvaluationResult>, r| match best {
            Some(b) if b.test_accuracy >= r.test_accuracy => Some(b),
            _ => Some(r),
        })
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create comparison CSV: {}", path.display()))?;
        wtr.write_record([
            "model",
            "train_accuracy",
            "test_accuracy",
            "precision",
            "recall",
            "f1",
            "tn",
            "fp",
            "fn",
            "tp",
        ])?;
        for r in &self.rows {
            let cm = &r.confusion_matrix;
            wtr.write_record(&[
                r.model_name.clone(),
                format!("{:.6}", r.train_accuracy),
                format!("{:.6}", r.test_accuracy),
                format!("{:.6}", r.precision),
                format!("{:.6}", r.recall),
                format!("{:.6}", r.f1),
                cm.tn.to_string(),
                cm.fp.to_string(),
                cm.fn_.to_string(),
                cm.tp.to_string(),
            ])?;
        }
        wtr.flush()
            .with_context(|| format!("Failed to write comparison CSV: {}", path.display()))?;
        log::info!("Model comparison written to {}", path.display());
        Ok(())
    }
}

impl fmt::Display for ComparisonTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.model_name.len())
            .max()
            .unwrap_or(5)
            .max(5);
        writeln!(
            f,
            "{:<width$}  {:>9}  {:>9}  {:>9}  {:>9}  {:>9}",
            "Model",
            "Train Acc",
            "Test Acc",
            "Precision",
            "Recall",
            "F1",
            width = width
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:<width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9.4}",
                r.model_name,
                r.train_accuracy,
                r.test_accuracy,
                r.precision,
                r.recall,
                r.f1,
                width = width
            )?;
        }
        Ok(())
    }
}
