use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::*;
use crate::error::Result;

/// Persistence for the inspection workflow. Implementations must make
/// `save_report_tree` and `delete_report` atomic.
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, user: &User) -> Result<()>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn count_users(&self) -> Result<usize>;

    // Report operations
    /// Fails with `AppError::Conflict` when the report number is taken.
    async fn create_report(&self, report: &Report) -> Result<()>;
    async fn get_report(&self, id: Uuid) -> Result<Option<Report>>;
    async fn update_report(&self, report: &Report) -> Result<()>;
    /// Removes the report and all of its children.
    async fn delete_report(&self, id: Uuid) -> Result<()>;
    /// Most recently updated first.
    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>>;
    async fn count_reports_by_status(
        &self,
        inspector_id: Option<Uuid>,
    ) -> Result<Vec<(ReportStatus, usize)>>;
    /// Next free sequence number for report numbers issued in `year`.
    async fn next_report_sequence(&self, year: i32) -> Result<u32>;
    async fn reports_updated_since(
        &self,
        inspector_id: Option<Uuid>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Report>>;

    // Roof element operations
    async fn create_roof_element(&self, element: &RoofElement) -> Result<()>;
    async fn get_roof_element(&self, id: Uuid) -> Result<Option<RoofElement>>;
    async fn update_roof_element(&self, element: &RoofElement) -> Result<()>;
    /// Detaches defects and photos that pointed at the element.
    async fn delete_roof_element(&self, id: Uuid) -> Result<()>;
    async fn list_roof_elements(&self, report_id: Uuid) -> Result<Vec<RoofElement>>;

    // Defect operations
    async fn create_defect(&self, defect: &Defect) -> Result<()>;
    async fn get_defect(&self, id: Uuid) -> Result<Option<Defect>>;
    async fn update_defect(&self, defect: &Defect) -> Result<()>;
    /// Detaches photos that pointed at the defect.
    async fn delete_defect(&self, id: Uuid) -> Result<()>;
    /// Ordered by defect number.
    async fn list_defects(&self, report_id: Uuid) -> Result<Vec<Defect>>;
    async fn next_defect_number(&self, report_id: Uuid) -> Result<i32>;

    // Photo operations
    async fn create_photo(&self, photo: &Photo) -> Result<()>;
    async fn get_photo(&self, id: Uuid) -> Result<Option<Photo>>;
    async fn update_photo(&self, photo: &Photo) -> Result<()>;
    async fn delete_photo(&self, id: Uuid) -> Result<()>;
    /// Ordered by sort order, then upload time.
    async fn list_photos(&self, report_id: Uuid) -> Result<Vec<Photo>>;

    // Compliance operations
    async fn get_compliance(&self, report_id: Uuid) -> Result<Option<ComplianceAssessment>>;
    /// Upserts the assessment and stores the edited `report` in one
    /// transaction.
    async fn put_compliance(&self, report: &Report, assessment: &ComplianceAssessment) -> Result<()>;

    // Complaint operations
    async fn create_complaint(&self, complaint: &LbpComplaint) -> Result<()>;
    async fn get_complaint(&self, id: Uuid) -> Result<Option<LbpComplaint>>;
    async fn update_complaint(&self, complaint: &LbpComplaint) -> Result<()>;
    /// Newest first; `None` lists every complainant.
    async fn list_complaints(&self, complainant_id: Option<Uuid>) -> Result<Vec<LbpComplaint>>;

    /// Upserts a report and replaces its roof elements and defects in one
    /// transaction. Children missing from the slices are removed; photos
    /// attached to removed children are detached.
    async fn save_report_tree(
        &self,
        report: &Report,
        elements: &[RoofElement],
        defects: &[Defect],
        compliance: Option<&ComplianceAssessment>,
    ) -> Result<()>;

    /// Clear all data (useful for development)
    async fn clear_all_data(&self) -> Result<()>;
}
