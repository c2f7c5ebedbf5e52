pub mod complaint_use_case;
pub mod dashboard_use_case;
pub mod lifecycle;
pub mod ports;
pub mod report_items_use_case;
pub mod report_use_case;
pub mod sync_use_case;
pub mod user_use_case;
pub mod validation;

pub use complaint_use_case::ComplaintUseCase;
pub use dashboard_use_case::{Dashboard, DashboardUseCase};
pub use report_items_use_case::ReportItemsUseCase;
pub use report_use_case::ReportUseCase;
pub use sync_use_case::SyncUseCase;
pub use user_use_case::UserUseCase;

use uuid::Uuid;

use crate::domain::{utc_now, Report};
use crate::error::{AppError, Result};
use crate::storage::Storage;

pub(crate) async fn load_report(storage: &dyn Storage, id: Uuid) -> Result<Report> {
    storage
        .get_report(id)
        .await?
        .ok_or_else(|| AppError::not_found("report", id))
}

/// Records a content edit on the report itself: bumps `updated_at` and
/// starts work on a draft.
pub(crate) async fn touch_report(storage: &dyn Storage, report: &mut Report) -> Result<()> {
    report.status = lifecycle::status_after_edit(report.status);
    report.updated_at = utc_now();
    storage.update_report(report).await
}
