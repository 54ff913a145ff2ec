//! Report generation port trait.

use crate::domain::error::FolioError;
use crate::domain::reconcile::ReconciliationReport;
use crate::domain::returns::ReturnMetrics;

/// One labelled block of a performance report.
#[derive(Debug, Clone)]
pub struct PerformanceSection {
    pub label: String,
    pub metrics: ReturnMetrics,
    /// Annualised time-weighted return, where computable.
    pub twr: Option<f64>,
}

/// Port for writing analysis reports.
pub trait ReportPort {
    /// Write labelled return metrics (per holding plus an aggregate).
    fn write_performance(
        &self,
        sections: &[PerformanceSection],
        output_path: &str,
    ) -> Result<(), FolioError>;

    fn write_reconciliation(
        &self,
        report: &ReconciliationReport,
        output_path: &str,
    ) -> Result<(), FolioError>;
}
