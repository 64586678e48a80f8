use ndarray::Array2;

use crate::data_handling::CaseStatus;
use crate::error::VisaError;

/// Common contract of every classifier in the crate.
///
/// Implementations convert their internal outputs (class codes, margins,
/// probabilities) into `CaseStatus` before returning, so callers never see a
/// model-specific label encoding.
pub trait ClassifierModel: Send {
    /// Fit the model on encoded features and their outcomes.
    fn fit(&mut self, x: &Array2<f64>, y: &[CaseStatus]) -> Result<(), VisaError>;

    /// Predicted outcome for every row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<CaseStatus>, VisaError>;

    /// Probability of `Certified` for every row of `x`.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Vec<f64>, VisaError>;

    /// Relative importance of each input column, when the model exposes one.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Text rendering of the fitted decision rules, for tree models.
    fn rules_text(&self, _feature_names: &[String]) -> Option<String> {
        None
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Shared argument checks for `fit` implementations.
pub(crate) fn check_fit_inputs(
    model: &str,
    x: &Array2<f64>,
    y: &[CaseStatus],
) -> Result<(), VisaError> {
    if x.nrows() != y.len() {
        return Err(VisaError::ShapeMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    if y.is_empty() || x.ncols() == 0 {
        return Err(VisaError::Fit(format!("{} needs at least one row and one feature", model)));
    }
    Ok(())
}

/// Threshold a Certified probability at 0.5.
pub(crate) fn label_from_probability(p: f64) -> CaseStatus {
    if p > 0.5 {
        CaseStatus::Certified
    } else {
        CaseStatus::Denied
    }
}
