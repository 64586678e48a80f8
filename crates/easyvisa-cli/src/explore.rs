use std::path::Path;

use anyhow::Result;
use maud::{html, Markup};

use easyvisa_classifiers::data_handling::{ApplicationRecord, Feature};
use easyvisa_classifiers::io::read_easyvisa_csv;
use easyvisa_classifiers::report::plots::{
    plot_category_counts, plot_certification_rates, plot_class_distribution,
    plot_correlation_heatmap, plot_numeric_histogram, plot_wage_by_status,
};
use easyvisa_classifiers::report::{Report, ReportSection};
use easyvisa_classifiers::stats::{correlation_matrix, summarize, DatasetSummary};

use crate::util::validate_csv_file;

/// Load the data, print its summary and write the exploratory report.
pub fn run_explore(data_path: &str, report_path: &Path) -> Result<DatasetSummary> {
    validate_csv_file(data_path)?;
    let records = read_easyvisa_csv(data_path)?;
    let summary = summarize(&records);
    print!("{}", format_summary(&summary));

    let report = build_explore_report(&records, &summary);
    report.save_to_file(report_path)?;
    Ok(summary)
}

/// Plain-text rendering of the numeric and categorical summaries.
pub fn format_summary(summary: &DatasetSummary) -> String {
    let mut out = format!(
        "{} rows x {} columns, {} duplicated case ids\n\n",
        summary.n_rows, summary.n_columns, summary.duplicated_case_ids
    );
    out.push_str(&format!(
        "{:<24}{:>8}{:>14}{:>14}{:>12}{:>12}{:>12}{:>12}{:>14}\n",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    ));
    for n in &summary.numeric {
        out.push_str(&format!(
            "{:<24}{:>8}{:>14.2}{:>14.2}{:>12.2}{:>12.2}{:>12.2}{:>12.2}{:>14.2}\n",
            n.column, n.count, n.mean, n.std, n.min, n.q25, n.median, n.q75, n.max
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "{:<24}{:>8}{:>8}{:>24}{:>8}\n",
        "column", "count", "unique", "top", "freq"
    ));
    for c in &summary.categorical {
        out.push_str(&format!(
            "{:<24}{:>8}{:>8}{:>24}{:>8}\n",
            c.column, c.count, c.unique, c.top, c.freq
        ));
    }
    let balance = &summary.class_balance;
    out.push_str(&format!(
        "\nCertified: {} ({:.2}%), Denied: {} ({:.2}%)\n",
        balance.certified,
        balance.certified_pct(),
        balance.denied,
        balance.denied_pct()
    ));
    out
}

fn summary_tables(summary: &DatasetSummary) -> Markup {
    html! {
        p {
            (summary.n_rows) " applications, " (summary.n_columns) " columns, "
            (summary.duplicated_case_ids) " duplicated case ids."
        }
        table {
            tr { th { "column" } th { "count" } th { "mean" } th { "std" } th { "min" }
                 th { "25%" } th { "50%" } th { "75%" } th { "max" } }
            @for n in &summary.numeric {
                tr {
                    td { (n.column) } td { (n.count) }
                    td { (format!("{:.2}", n.mean)) } td { (format!("{:.2}", n.std)) }
                    td { (format!("{:.2}", n.min)) } td { (format!("{:.2}", n.q25)) }
                    td { (format!("{:.2}", n.median)) } td { (format!("{:.2}", n.q75)) }
                    td { (format!("{:.2}", n.max)) }
                }
            }
        }
        table {
            tr { th { "column" } th { "unique" } th { "top" } th { "freq" } }
            @for c in &summary.categorical {
                tr { td { (c.column) } td { (c.unique) } td { (c.top) } td { (c.freq) } }
            }
        }
    }
}

/// Add a plot to `section`, logging plots that cannot be drawn.
fn add_plot(section: &mut ReportSection, plot: Result<plotly::Plot, String>) {
    match plot {
        Ok(plot) => section.add_plot(plot),
        Err(e) => log::warn!("Skipping plot in '{}': {}", section.title(), e),
    }
}

pub fn build_explore_report(records: &[ApplicationRecord], summary: &DatasetSummary) -> Report {
    let mut report = Report::new(
        "EasyVisa",
        clap::crate_version!(),
        None,
        "EasyVisa Exploratory Data Analysis",
    );

    /* Section 1: Overview */
    {
        let mut section = ReportSection::new("Overview");
        section.add_content(summary_tables(summary));
        add_plot(&mut section, plot_class_distribution(records));
        report.add_section(section);
    }

    /* Section 2: Univariate */
    {
        let mut section = ReportSection::new("Distributions");
        add_plot(&mut section, plot_category_counts(records, Feature::EducationOfEmployee));
        add_plot(&mut section, plot_category_counts(records, Feature::Continent));
        for feature in Feature::NUMERIC {
            add_plot(&mut section, plot_numeric_histogram(records, feature));
        }
        report.add_section(section);
    }

    /* Section 3: Outcome by feature */
    {
        let mut section = ReportSection::new("Case Status by Feature");
        section.add_content(html! {
            "Share of certified and denied applications within each category."
        });
        for feature in Feature::CATEGORICAL {
            add_plot(&mut section, plot_certification_rates(records, feature));
        }
        add_plot(&mut section, plot_wage_by_status(records));
        report.add_section(section);
    }

    /* Section 4: Correlations */
    {
        let mut section = ReportSection::new("Correlations");
        add_plot(&mut section, plot_correlation_heatmap(&correlation_matrix(records)));
        report.add_section(section);
    }

    report
}
