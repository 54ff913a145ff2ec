//! Plain-text report adapter implementing ReportPort.

use crate::domain::error::FolioError;
use crate::domain::reconcile::ReconciliationReport;
use crate::ports::report_port::{PerformanceSection, ReportPort};
use std::fmt::Write as _;
use std::fs;

pub struct TextReportAdapter;

impl ReportPort for TextReportAdapter {
    fn write_performance(
        &self,
        sections: &[PerformanceSection],
        output_path: &str,
    ) -> Result<(), FolioError> {
        let mut out = String::new();
        let _ = writeln!(out, "Portfolio Performance Report");
        let _ = writeln!(out, "============================");

        for section in sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", section.label);
            let _ = writeln!(out, "{}", "-".repeat(section.label.len()));
            let _ = writeln!(out, "{}", section.metrics);
            if let Some(twr) = section.twr {
                let _ = writeln!(out, "  TWR (annualised):    {:+.2}%", twr * 100.0);
            }
        }

        fs::write(output_path, out)?;
        log::info!("performance report written to {output_path}");
        Ok(())
    }

    fn write_reconciliation(
        &self,
        report: &ReconciliationReport,
        output_path: &str,
    ) -> Result<(), FolioError> {
        let mut out = report.to_string();
        out.push('\n');
        fs::write(output_path, out)?;
        log::info!("reconciliation report written to {output_path}");
        Ok(())
    }
}
