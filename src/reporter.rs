use crate::models::{PageAudit, Report, Severity};
use anyhow::{Context, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;

/// A report together with the page audits it was computed from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditBundle {
    pub report: Report,
    pub page_audits: Vec<PageAudit>,
}

pub struct Reporter;

impl Reporter {
    pub fn bundle(report: Report, page_audits: Vec<PageAudit>) -> AuditBundle {
        AuditBundle {
            report,
            page_audits,
        }
    }

    fn colored_severity(severity: Severity) -> ColoredString {
        match severity {
            Severity::Critical => "CRIT".bright_red().bold(),
            Severity::High => "HIGH".bright_red(),
            Severity::Medium => "MED ".yellow(),
            Severity::Low => "LOW ".bright_cyan(),
            Severity::Info => "INFO".dimmed(),
        }
    }

    fn colored_score(score: u32) -> ColoredString {
        let text = score.to_string();
        if score >= 90 {
            text.bright_green()
        } else if score >= 50 {
            text.yellow()
        } else {
            text.bright_red()
        }
    }

    pub fn render_text(bundle: &AuditBundle) -> String {
        let report = &bundle.report;
        let mut out = String::new();

        let _ = writeln!(out, "\n{}", "=".repeat(80).bright_blue());
        let _ = writeln!(out, "{}", "Sitepulse - Audit Report".bright_cyan().bold());
        let _ = writeln!(out, "{}", "=".repeat(80).bright_blue());
        let _ = writeln!(out);

        if let Some(seed) = &report.seed_url {
            let _ = writeln!(out, "{}: {}", "Seed URL".bright_white().bold(), seed);
        }
        let _ = writeln!(out, "{}: {}", "Version".bright_white().bold(), report.version);
        let _ = writeln!(
            out,
            "{}: {}",
            "Date".bright_white().bold(),
            report.date.to_rfc3339()
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "{}", "Summary".bright_yellow().bold().underline());
        let _ = writeln!(
            out,
            "  Overall Score:       {}",
            Self::colored_score(report.overall_score)
        );
        let _ = writeln!(
            out,
            "  Pages Crawled:       {}",
            report.pages_crawled.to_string().bright_green()
        );
        let _ = writeln!(
            out,
            "  Open Issues:         {}",
            report.total_issues.total.to_string().bright_white()
        );
        for severity in Severity::ALL {
            let count = report.total_issues.get(severity);
            if count > 0 {
                let _ = writeln!(out, "    {:<9} {}", severity.as_str(), count);
            }
        }
        let _ = writeln!(
            out,
            "  New Issues:          {}",
            if report.new_issues > 0 {
                report.new_issues.to_string().yellow()
            } else {
                report.new_issues.to_string().bright_green()
            }
        );
        let _ = writeln!(
            out,
            "  Fixed Issues:        {}",
            report.fixed_issues.to_string().bright_green()
        );
        let _ = writeln!(out);

        if !report.top_priority_fixes.is_empty() {
            let _ = writeln!(out, "{}", "Top Priority Fixes".bright_yellow().bold().underline());
            for issue in &report.top_priority_fixes {
                let _ = writeln!(
                    out,
                    "  [{}] {} {}{}",
                    Self::colored_severity(issue.severity),
                    issue.title,
                    issue.url.as_deref().unwrap_or("").dimmed(),
                    if issue.auto_fixable {
                        " (auto-fixable)".bright_green()
                    } else {
                        "".normal()
                    }
                );
            }
            let _ = writeln!(out);
        }

        let pages_with_issues: Vec<_> = bundle
            .page_audits
            .iter()
            .filter(|audit| audit.issues.iter().any(|i| i.is_open()))
            .collect();

        if !pages_with_issues.is_empty() {
            let _ = writeln!(out, "{}", "Pages with Issues".bright_yellow().bold().underline());
            for audit in pages_with_issues {
                let _ = writeln!(out);
                let _ = writeln!(out, "  {} {}", "URL:".bright_white().bold(), audit.url);
                let _ = writeln!(
                    out,
                    "    Status: {}",
                    audit
                        .status_code
                        .map(|code| {
                            if code < 300 {
                                code.to_string().bright_green()
                            } else if code < 400 {
                                code.to_string().yellow()
                            } else {
                                code.to_string().bright_red()
                            }
                        })
                        .unwrap_or_else(|| "N/A".dimmed())
                );
                let _ = writeln!(out, "    Score:  {}", Self::colored_score(audit.score));
                if let Some(title) = &audit.title {
                    let _ = writeln!(out, "    Title:  {}", title.bright_white());
                }

                let _ = writeln!(out, "    Issues:");
                for issue in audit.issues.iter().filter(|i| i.is_open()) {
                    let _ = writeln!(
                        out,
                        "      [{}] {}: {}",
                        Self::colored_severity(issue.severity),
                        issue.rule_id,
                        issue.description
                    );
                }
            }
            let _ = writeln!(out);
        }

        if !report.content_suggestions.is_empty() {
            let _ = writeln!(out, "{}", "Content Suggestions".bright_yellow().bold().underline());
            for title in &report.content_suggestions {
                let _ = writeln!(out, "  - {}", title);
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "{}", "=".repeat(80).bright_blue());
        out
    }

    pub fn print_text_report(bundle: &AuditBundle) {
        print!("{}", Self::render_text(bundle));
    }

    pub fn save_json_report(bundle: &AuditBundle, filename: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(bundle)?;
        let mut file =
            File::create(filename).with_context(|| format!("Failed to create {}", filename))?;
        file.write_all(json.as_bytes())?;
        println!("Report saved to: {}", filename.bright_green());
        Ok(())
    }
}
