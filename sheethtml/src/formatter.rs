//! Output formatters for conversion reports

use anyhow::Result;
use colored::*;
use serde::Serialize;
use sheethtml_core::ConversionOutcome;
use std::path::PathBuf;

/// One converted (or failed) workbook
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub outcome: ConversionOutcome,
}

/// Print reports in human-readable format with colors
pub fn print_human(reports: &[FileReport]) {
    for report in reports {
        if report.outcome.ok {
            println!(
                "{} {} {} {}",
                "✓".green().bold(),
                report.source.display(),
                "->".bright_black(),
                report.destination.display().to_string().cyan()
            );
        } else {
            println!(
                "{} {}: {}",
                "✗".red().bold(),
                report.source.display().to_string().bold(),
                report.outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let failed = reports.iter().filter(|r| !r.outcome.ok).count();
    println!();
    println!("{}", "Summary:".bold().underline());
    println!(
        "  {} {}",
        "Converted:".green().bold(),
        reports.len() - failed
    );
    if failed > 0 {
        println!("  {} {}", "Failed:".red().bold(), failed);
    }
}

/// Print reports in JSON format
pub fn print_json(reports: &[FileReport]) -> Result<()> {
    let failed = reports.iter().filter(|r| !r.outcome.ok).count();
    let output = serde_json::json!({
        "files": reports,
        "summary": {
            "total": reports.len(),
            "converted": reports.len() - failed,
            "failed": failed,
        }
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
