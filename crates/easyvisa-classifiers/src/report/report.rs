//! Self-contained HTML report made of titled sections holding markup and
//! plotly figures.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use plotly::Plot;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.12.1.min.js";

const STYLE: &str = "
body { font-family: Helvetica, Arial, sans-serif; margin: 0; color: #222; }
header { background: #1f3b57; color: #fff; padding: 16px 32px; display: flex; align-items: center; }
header img { height: 48px; margin-right: 16px; }
header .meta { font-size: 0.85em; opacity: 0.8; }
nav { padding: 8px 32px; background: #eef2f6; }
nav a { margin-right: 16px; color: #1f3b57; }
section { padding: 8px 32px 24px 32px; border-bottom: 1px solid #ddd; }
table { border-collapse: collapse; margin: 8px 0; }
th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: right; }
th:first-child, td:first-child { text-align: left; }
pre { background: #f5f5f5; padding: 10px; border-radius: 5px; overflow-x: auto; }
";

enum Block {
    Content(Markup),
    Plot(Plot),
}

/// One titled part of a report.
pub struct ReportSection {
    title: String,
    blocks: Vec<Block>,
}

impl ReportSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn add_content(&mut self, content: Markup) {
        self.blocks.push(Block::Content(content));
    }

    pub fn add_plot(&mut self, plot: Plot) {
        self.blocks.push(Block::Plot(plot));
    }

    fn anchor(&self, index: usize) -> String {
        format!("section-{}", index)
    }

    fn render(&self, index: usize) -> Markup {
        let anchor = self.anchor(index);
        html! {
            section id=(anchor) {
                h2 { (self.title) }
                @for (i, block) in self.blocks.iter().enumerate() {
                    @match block {
                        Block::Content(markup) => {
                            div class="content" { (markup) }
                        }
                        Block::Plot(plot) => {
                            div class="plot" {
                                (PreEscaped(plot.to_inline_html(Some(&format!("{}-plot-{}", anchor, i)))))
                            }
                        }
                    }
                }
            }
        }
    }
}

/// A complete HTML document.
pub struct Report {
    software: String,
    version: String,
    logo: Option<String>,
    title: String,
    sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(software: &str, version: &str, logo: Option<&str>, title: &str) -> Self {
        Self {
            software: software.to_string(),
            version: version.to_string(),
            logo: logo.map(str::to_string),
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[ReportSection] {
        &self.sections
    }

    pub fn render(&self) -> Markup {
        let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src=(PLOTLY_CDN) {}
                    style { (PreEscaped(STYLE)) }
                }
                body {
                    header {
                        @if let Some(logo) = &self.logo {
                            img src=(logo) alt=(self.software);
                        }
                        div {
                            h1 { (self.title) }
                            div class="meta" {
                                (self.software) " v" (self.version) " | generated " (generated)
                            }
                        }
                    }
                    nav {
                        @for (i, section) in self.sections.iter().enumerate() {
                            a href=(format!("#{}", section.anchor(i))) { (section.title) }
                        }
                    }
                    @for (i, section) in self.sections.iter().enumerate() {
                        (section.render(i))
                    }
                }
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render().into_string())
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}
