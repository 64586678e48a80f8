use std::error::Error;
use std::fmt;

/// Failures raised by the loading, preprocessing, training and evaluation stages.
#[derive(Debug, Clone, PartialEq)]
pub enum VisaError {
    /// A required column is absent from the input header.
    MissingColumn(String),
    /// A cell could not be interpreted for its column (1-based data row).
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    /// The input contained a header but no data rows.
    EmptyDataset,
    /// A label outside {Certified, Denied} (or {1, 0}).
    UnknownLabel(String),
    /// A category seen at transform time that the fitted encoder never saw.
    UnseenCategory { column: String, value: String },
    /// An encoded feature lies outside the code range learned for it.
    FeatureOutOfRange { feature: String, value: f64 },
    /// The train/test split cannot be made with the requested fraction.
    InvalidSplit(String),
    /// A hyperparameter that the model does not know, or a value of the wrong kind.
    InvalidParameter { model: String, param: String },
    /// A search was requested over a grid without candidates.
    EmptySearchSpace(String),
    /// Feature matrix and labels (or two label vectors) disagree in length.
    ShapeMismatch { expected: usize, actual: usize },
    /// Prediction was requested from a model that has not been fitted.
    NotFitted(String),
    /// The model could not be fitted on the given data.
    Fit(String),
    /// Two evaluation results were registered under the same model name.
    DuplicateModel(String),
    /// Inconsistent pipeline configuration.
    Config(String),
}

impl fmt::Display for VisaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VisaError::MissingColumn(column) => write!(f, "Missing required column '{}'", column),
            VisaError::InvalidValue { row, column, value } => write!(
                f,
                "Invalid value '{}' in column '{}' at row {}",
                value, column, row
            ),
            VisaError::EmptyDataset => write!(f, "Dataset contains no rows"),
            VisaError::UnknownLabel(value) => write!(
                f,
                "Unknown case status '{}': expected Certified/Denied or 1/0",
                value
            ),
            VisaError::UnseenCategory { column, value } => write!(
                f,
                "Category '{}' in column '{}' was not present in the training partition",
                value, column
            ),
            VisaError::FeatureOutOfRange { feature, value } => write!(
                f,
                "Encoded value {} for feature '{}' is outside its fitted range",
                value, feature
            ),
            VisaError::InvalidSplit(msg) => write!(f, "Invalid train/test split: {}", msg),
            VisaError::InvalidParameter { model, param } => {
                write!(f, "Invalid parameter '{}' for model {}", param, model)
            }
            VisaError::EmptySearchSpace(model) => {
                write!(f, "Hyperparameter search for {} has no candidates", model)
            }
            VisaError::ShapeMismatch { expected, actual } => write!(
                f,
                "Length mismatch: expected {} rows, got {}",
                expected, actual
            ),
            VisaError::NotFitted(model) => write!(f, "Model {} has not been fitted", model),
            VisaError::Fit(msg) => write!(f, "Failed to fit model: {}", msg),
            VisaError::DuplicateModel(name) => {
                write!(f, "A result for model '{}' already exists", name)
            }
            VisaError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for VisaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_offending_value() {
        let err = VisaError::UnseenCategory {
            column: "continent".to_string(),
            value: "Antarctica".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Antarctica"));
        assert!(msg.contains("continent"));
    }

    #[test]
    fn converts_into_anyhow_and_back() {
        let err: anyhow::Error = VisaError::MissingColumn("case_status".to_string()).into();
        assert_eq!(
            err.downcast_ref::<VisaError>(),
            Some(&VisaError::MissingColumn("case_status".to_string()))
        );
    }
}
