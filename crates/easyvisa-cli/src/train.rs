use anyhow::{Context, Result};
use maud::html;

use easyvisa_classifiers::data_handling::Partition;
use easyvisa_classifiers::evaluation::{evaluate_partition, ComparisonTable};
use easyvisa_classifiers::io::read_easyvisa_csv;
use easyvisa_classifiers::model_selection::format_params;
use easyvisa_classifiers::preprocessing::Preprocessor;
use easyvisa_classifiers::report::plots::{
    plot_confusion_matrix, plot_model_comparison, plot_threshold_sweep,
};
use easyvisa_classifiers::report::{Report, ReportSection};
use easyvisa_classifiers::stats::class_balance;
use easyvisa_classifiers::trainer::{train_all, TrainedModel};

use crate::input::TrainConfig;
use crate::util::{ensure_output_dir, validate_csv_file, write_bytes_to_file};

/// Everything a training run produced.
pub struct TrainingRun {
    pub partition: Partition,
    pub models: Vec<TrainedModel>,
    pub comparison: ComparisonTable,
}

/// Load, preprocess, train, evaluate. Writes nothing.
pub fn run_pipeline(config: &TrainConfig) -> Result<TrainingRun> {
    validate_csv_file(&config.data_path)?;
    let records = read_easyvisa_csv(&config.data_path)?;

    let balance = class_balance(&records);
    log::info!(
        "Class balance: {} certified ({:.2}%), {} denied ({:.2}%)",
        balance.certified,
        balance.certified_pct(),
        balance.denied,
        balance.denied_pct()
    );

    let output = Preprocessor::new(config.preprocessing.clone())
        .run(&records)
        .context("Preprocessing failed")?;
    let partition = output.partition;

    let models = train_all(&config.models, &partition).context("Model training failed")?;

    let mut comparison = ComparisonTable::new();
    for model in &models {
        let result = evaluate_partition(model, &partition)
            .with_context(|| format!("Evaluation of {} failed", model.name))?;
        if result.overfit_gap() > config.overfit_tolerance {
            log::warn!(
                "{} may be overfitting: train accuracy {:.4} vs test accuracy {:.4}",
                result.model_name,
                result.train_accuracy,
                result.test_accuracy
            );
        }
        comparison.push(result)?;
    }
    if let Some(best) = comparison.best_by_test_accuracy() {
        log::info!(
            "Best model: {} (test accuracy {:.4})",
            best.model_name,
            best.test_accuracy
        );
    }

    Ok(TrainingRun {
        partition,
        models,
        comparison,
    })
}

/// Run the pipeline and write the comparison table, the used configuration
/// and, unless disabled, the HTML report into the output directory.
pub fn run_training(config: &TrainConfig) -> Result<TrainingRun> {
    let run = run_pipeline(config)?;
    print!("{}", run.comparison);

    ensure_output_dir(&config.output_dir)?;
    run.comparison.write_csv(config.comparison_path())?;

    let config_path = std::path::Path::new(&config.output_dir).join("easyvisa_config.json");
    let json = serde_json::to_string_pretty(config)?;
    write_bytes_to_file(&config_path, json.as_bytes())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    if config.report {
        let report = build_train_report(config, &run)?;
        report.save_to_file(config.report_path())?;
    }
    Ok(run)
}

pub fn build_train_report(config: &TrainConfig, run: &TrainingRun) -> Result<Report> {
    let mut report = Report::new(
        "EasyVisa",
        &config.version,
        None,
        "EasyVisa Model Comparison Report",
    );
    let train = run.partition.train();
    let test = run.partition.test();

    /* Section 1: Overview */
    {
        let mut section = ReportSection::new("Overview");
        let (train_denied, train_certified) = train.class_counts();
        let (test_denied, test_certified) = test.class_counts();
        section.add_content(html! {
            p {
                "Models were trained on " (train.n_rows()) " applications ("
                (train_certified) " certified, " (train_denied) " denied) and evaluated on "
                (test.n_rows()) " held-out applications (" (test_certified) " certified, "
                (test_denied) " denied)."
            }
            table {
                tr { th { "Model" } th { "Train Acc" } th { "Test Acc" } th { "Precision" }
                     th { "Recall" } th { "F1" } }
                @for r in run.comparison.iter() {
                    tr {
                        td { (r.model_name) }
                        td { (format!("{:.4}", r.train_accuracy)) }
                        td { (format!("{:.4}", r.test_accuracy)) }
                        td { (format!("{:.4}", r.precision)) }
                        td { (format!("{:.4}", r.recall)) }
                        td { (format!("{:.4}", r.f1)) }
                    }
                }
            }
        });
        if let Ok(plot) = plot_model_comparison(&run.comparison) {
            section.add_plot(plot);
        }
        report.add_section(section);
    }

    /* Section 2: Confusion matrices */
    {
        let mut section = ReportSection::new("Confusion Matrices");
        for r in run.comparison.iter() {
            section.add_content(html! {
                h3 { (r.model_name) }
                pre { (r.report().to_string()) }
            });
            match plot_confusion_matrix(&r.confusion_matrix, &format!("{} Confusion Matrix", r.model_name)) {
                Ok(plot) => section.add_plot(plot),
                Err(e) => log::warn!("Skipping confusion matrix of {}: {}", r.model_name, e),
            }
        }
        report.add_section(section);
    }

    /* Section 3: Best model */
    if let Some(best) = run.comparison.best_by_test_accuracy() {
        if let Some(model) = run.models.iter().find(|m| m.name == best.model_name) {
            let mut section = ReportSection::new("Best Model");
            section.add_content(html! {
                p { (best.model_name) " has the highest test accuracy (" (format!("{:.4}", best.test_accuracy)) ")." }
            });
            let proba = model.predict_proba(test.x())?;
            if let Ok(plot) = plot_threshold_sweep(
                &proba,
                test.y(),
                &format!("{} Precision and Recall by Threshold", best.model_name),
            ) {
                section.add_plot(plot);
            }
            if let Some(importances) = model.feature_importances() {
                section.add_content(html! {
                    table {
                        tr { th { "Feature" } th { "Importance" } }
                        @for (name, value) in train.feature_names().iter().zip(&importances) {
                            tr { td { (name) } td { (format!("{:.4}", value)) } }
                        }
                    }
                });
            }
            report.add_section(section);
        }
    }

    /* Section 4: Decision rules and search results */
    {
        let mut section = ReportSection::new("Model Details");
        for model in &run.models {
            if let Some(rules) = model.rules_text(train.feature_names()) {
                // deep trees produce thousands of lines; only shallow ones are shown
                if rules.lines().count() <= 200 {
                    section.add_content(html! {
                        h3 { (model.name) " rules" }
                        pre { (rules) }
                    });
                }
            }
            if let Some(search) = &model.search {
                section.add_content(html! {
                    h3 { (model.name) " search" }
                    p {
                        "Best parameters: " (format_params(&search.best_params))
                        " (mean cv accuracy " (format!("{:.4}", search.best_score)) ")"
                    }
                    table {
                        tr { th { "Parameters" } th { "Mean" } th { "Std" } }
                        @for c in &search.candidates {
                            tr {
                                td { (format_params(&c.params)) }
                                td { (format!("{:.4}", c.mean_score)) }
                                td { (format!("{:.4}", c.std_score)) }
                            }
                        }
                    }
                });
            }
        }
        report.add_section(section);
    }

    /* Section 5: Configuration */
    {
        let mut section = ReportSection::new("Configuration");
        let json = serde_json::to_string_pretty(config)?;
        section.add_content(html! {
            pre {
                code { (json) }
            }
        });
        report.add_section(section);
    }

    Ok(report)
}
