use itertools_num::linspace;
use plotly::common::Mode;
use plotly::layout::{Axis, BarMode, Layout};
use plotly::{Bar, BoxPlot, HeatMap, Histogram, Plot, Scatter};

use crate::data_handling::{ApplicationRecord, CaseStatus, Feature};
use crate::evaluation::{ComparisonTable, ConfusionMatrix};
use crate::stats::{certification_rates, class_balance, value_counts, CorrelationMatrix};

/// Bar chart of the number of applications per outcome.
pub fn plot_class_distribution(records: &[ApplicationRecord]) -> Result<Plot, String> {
    if records.is_empty() {
        return Err("No records to plot".to_string());
    }
    let balance = class_balance(records);
    let trace = Bar::new(
        vec!["Certified".to_string(), "Denied".to_string()],
        vec![balance.certified, balance.denied],
    )
    .name("Applications");

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(
        Layout::new()
            .title("Visa Case Status Distribution")
            .x_axis(Axis::new().title("Case Status"))
            .y_axis(Axis::new().title("Count")),
    );
    Ok(plot)
}

/// Counts per category of `feature`, sorted by category.
pub fn plot_category_counts(
    records: &[ApplicationRecord],
    feature: Feature,
) -> Result<Plot, String> {
    if !feature.is_categorical() {
        return Err(format!("{} is not a categorical column", feature));
    }
    let counts = value_counts(records, feature);
    if counts.is_empty() {
        return Err(format!("No values for {}", feature));
    }
    let (labels, values): (Vec<String>, Vec<usize>) = counts.into_iter().unzip();

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(labels, values).name(feature.column_name()));
    plot.set_layout(
        Layout::new()
            .title(format!("Distribution of {}", feature).as_str())
            .x_axis(Axis::new().title(feature.column_name()))
            .y_axis(Axis::new().title("Count")),
    );
    Ok(plot)
}

/// Stacked percentage bars of Certified vs Denied within each category.
pub fn plot_certification_rates(
    records: &[ApplicationRecord],
    feature: Feature,
) -> Result<Plot, String> {
    if !feature.is_categorical() {
        return Err(format!("{} is not a categorical column", feature));
    }
    let rates = certification_rates(records, feature);
    if rates.is_empty() {
        return Err(format!("No values for {}", feature));
    }
    let categories: Vec<String> = rates.iter().map(|r| r.category.clone()).collect();
    let certified: Vec<f64> = rates.iter().map(|r| r.certified_pct).collect();
    let denied: Vec<f64> = rates.iter().map(|r| r.denied_pct).collect();

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(categories.clone(), certified).name("Certified"));
    plot.add_trace(Bar::new(categories, denied).name("Denied"));
    plot.set_layout(
        Layout::new()
            .title(format!("Case Status by {}", feature).as_str())
            .bar_mode(BarMode::Stack)
            .x_axis(Axis::new().title(feature.column_name()))
            .y_axis(Axis::new().title("Percentage")),
    );
    Ok(plot)
}

/// Prevailing wage distribution for each outcome.
pub fn plot_wage_by_status(records: &[ApplicationRecord]) -> Result<Plot, String> {
    if records.is_empty() {
        return Err("No records to plot".to_string());
    }
    let mut plot = Plot::new();
    for status in [CaseStatus::Certified, CaseStatus::Denied] {
        let wages: Vec<f64> = records
            .iter()
            .filter(|r| r.case_status == status)
            .map(|r| r.prevailing_wage)
            .collect();
        plot.add_trace(BoxPlot::<f64, f64>::new(wages).name(status.as_str()));
    }
    plot.set_layout(
        Layout::new()
            .title("Prevailing Wage by Case Status")
            .x_axis(Axis::new().title("Case Status"))
            .y_axis(Axis::new().title("Prevailing Wage")),
    );
    Ok(plot)
}

/// Histogram of a numeric column.
pub fn plot_numeric_histogram(
    records: &[ApplicationRecord],
    feature: Feature,
) -> Result<Plot, String> {
    if !feature.is_numeric() {
        return Err(format!("{} is not a numeric column", feature));
    }
    let values: Vec<f64> = records.iter().filter_map(|r| r.numeric(feature)).collect();
    if values.is_empty() {
        return Err(format!("No values for {}", feature));
    }
    let mut plot = Plot::new();
    plot.add_trace(Histogram::new(values).name(feature.column_name()));
    plot.set_layout(
        Layout::new()
            .title(format!("Distribution of {}", feature).as_str())
            .x_axis(Axis::new().title(feature.column_name()))
            .y_axis(Axis::new().title("Count")),
    );
    Ok(plot)
}

pub fn plot_correlation_heatmap(matrix: &CorrelationMatrix) -> Result<Plot, String> {
    if matrix.columns.is_empty() {
        return Err("Empty correlation matrix".to_string());
    }
    // constant columns have no correlation; leave those cells blank
    let z: Vec<Vec<Option<f64>>> = matrix
        .values
        .iter()
        .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
        .collect();
    let mut plot = Plot::new();
    plot.add_trace(HeatMap::new(matrix.columns.clone(), matrix.columns.clone(), z));
    plot.set_layout(Layout::new().title("Correlation Heatmap"));
    Ok(plot)
}

/// Grouped bars of every metric of every model in the table.
pub fn plot_model_comparison(table: &ComparisonTable) -> Result<Plot, String> {
    if table.is_empty() {
        return Err("No models to compare".to_string());
    }
    let names: Vec<String> = table.iter().map(|r| r.model_name.clone()).collect();
    let metrics: [(&str, fn(&crate::evaluation::EvaluationResult) -> f64); 5] = [
        ("Train Accuracy", |r| r.train_accuracy),
        ("Test Accuracy", |r| r.test_accuracy),
        ("Precision", |r| r.precision),
        ("Recall", |r| r.recall),
        ("F1 Score", |r| r.f1),
    ];

    let mut plot = Plot::new();
    for (label, value) in metrics {
        let values: Vec<f64> = table.iter().map(value).collect();
        plot.add_trace(Bar::new(names.clone(), values).name(label));
    }
    plot.set_layout(
        Layout::new()
            .title("Model Performance Comparison")
            .bar_mode(BarMode::Group)
            .x_axis(Axis::new().title("Model"))
            .y_axis(Axis::new().title("Score")),
    );
    Ok(plot)
}

pub fn plot_confusion_matrix(cm: &ConfusionMatrix, title: &str) -> Result<Plot, String> {
    if cm.total() == 0 {
        return Err("Empty confusion matrix".to_string());
    }
    let labels = vec!["Denied".to_string(), "Certified".to_string()];
    let z: Vec<Vec<usize>> = cm.as_rows().iter().map(|row| row.to_vec()).collect();
    let mut plot = Plot::new();
    plot.add_trace(HeatMap::new(labels.clone(), labels, z));
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Predicted"))
            .y_axis(Axis::new().title("Actual")),
    );
    Ok(plot)
}

/// Precision and recall of the Certified class as the decision threshold
/// sweeps from 0 to 1.
pub fn plot_threshold_sweep(
    probabilities: &[f64],
    actual: &[CaseStatus],
    title: &str,
) -> Result<Plot, String> {
    if probabilities.len() != actual.len() {
        return Err("Probabilities and labels must have the same length".to_string());
    }
    if probabilities.is_empty() {
        return Err("No predictions to plot".to_string());
    }

    let thresholds: Vec<f64> = linspace(0.0, 1.0, 101).collect();
    let mut precision = Vec::with_capacity(thresholds.len());
    let mut recall = Vec::with_capacity(thresholds.len());
    for &t in &thresholds {
        let predicted: Vec<CaseStatus> = probabilities
            .iter()
            .map(|&p| {
                if p > t {
                    CaseStatus::Certified
                } else {
                    CaseStatus::Denied
                }
            })
            .collect();
        let cm = ConfusionMatrix::from_labels(actual, &predicted).map_err(|e| e.to_string())?;
        precision.push(cm.precision());
        recall.push(cm.recall());
    }

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(thresholds.clone(), precision)
            .mode(Mode::Lines)
            .name("Precision"),
    );
    plot.add_trace(Scatter::new(thresholds, recall).mode(Mode::Lines).name("Recall"));
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Threshold"))
            .y_axis(Axis::new().title("Score")),
    );
    Ok(plot)
}
