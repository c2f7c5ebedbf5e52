use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::lifecycle;
use super::load_report;
use super::validation::ValidationIssue;
use crate::constants::MIN_CONDUCT_DESCRIPTION_CHARS;
use crate::domain::*;
use crate::error::{AppError, Result};
use crate::observability::metrics;
use crate::storage::Storage;

static LBP_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^BP\d{6}$").expect("static regex should not panic"));

/// Complaints about licensed building practitioners, lodged with the
/// Building Practitioners Board.
pub struct ComplaintUseCase {
    storage: Arc<dyn Storage>,
}

fn ensure_complainant(acting: &User, complaint: &LbpComplaint) -> Result<()> {
    if complaint.complainant_id == acting.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only the complainant may change this complaint".into(),
        ))
    }
}

fn ensure_admin(acting: &User) -> Result<()> {
    if acting.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("only admins may process complaints".into()))
    }
}

fn move_to(complaint: &mut LbpComplaint, from: &[ComplaintStatus], to: ComplaintStatus) -> Result<()> {
    if !from.contains(&complaint.status) {
        return Err(AppError::InvalidTransition {
            from: complaint.status.to_string(),
            to: to.to_string(),
        });
    }
    complaint.status = to;
    complaint.updated_at = utc_now();
    Ok(())
}

impl ComplaintUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn load(&self, id: Uuid) -> Result<LbpComplaint> {
        self.storage
            .get_complaint(id)
            .await?
            .ok_or_else(|| AppError::not_found("complaint", id))
    }

    async fn check_report_link(&self, acting: &User, report_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = report_id {
            let report = load_report(self.storage.as_ref(), id).await?;
            lifecycle::ensure_can_read(acting, &report)?;
        }
        Ok(())
    }

    pub async fn create(&self, acting: &User, input: NewComplaint) -> Result<LbpComplaint> {
        self.check_report_link(acting, input.report_id).await?;
        let complaint = LbpComplaint::new(acting.id, input);
        self.storage.create_complaint(&complaint).await?;
        info!("Drafted complaint {} about {}", complaint.id, complaint.lbp_number);
        Ok(complaint)
    }

    pub async fn get(&self, acting: &User, id: Uuid) -> Result<LbpComplaint> {
        let complaint = self.load(id).await?;
        if complaint.complainant_id != acting.id && !acting.is_admin() {
            return Err(AppError::Forbidden("complaint belongs to another user".into()));
        }
        Ok(complaint)
    }

    pub async fn list(&self, acting: &User) -> Result<Vec<LbpComplaint>> {
        let owner = if acting.is_admin() { None } else { Some(acting.id) };
        self.storage.list_complaints(owner).await
    }

    pub async fn update(
        &self,
        acting: &User,
        id: Uuid,
        update: ComplaintUpdate,
    ) -> Result<LbpComplaint> {
        let mut complaint = self.load(id).await?;
        ensure_complainant(acting, &complaint)?;
        if complaint.status != ComplaintStatus::Draft {
            return Err(AppError::Conflict(format!(
                "complaint is {} and can no longer be edited",
                complaint.status
            )));
        }
        self.check_report_link(acting, update.report_id.flatten()).await?;
        update.apply(&mut complaint);
        self.storage.update_complaint(&complaint).await?;
        Ok(complaint)
    }

    /// Everything that stops a draft from being lodged.
    pub async fn submission_issues(&self, complaint: &LbpComplaint) -> Result<Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        if !LBP_NUMBER.is_match(&complaint.lbp_number) {
            issues.push(ValidationIssue::error(
                "lbpNumber",
                "LBP number must be BP followed by six digits",
            ));
        }
        if complaint.lbp_name.is_empty() {
            issues.push(ValidationIssue::error("lbpName", "practitioner name is required"));
        }
        if complaint.site_address.is_empty() {
            issues.push(ValidationIssue::error("siteAddress", "site address is required"));
        }
        if complaint.grounds.is_empty() {
            issues.push(ValidationIssue::error("grounds", "at least one ground is required"));
        }
        if complaint.conduct_description.chars().count() < MIN_CONDUCT_DESCRIPTION_CHARS {
            issues.push(ValidationIssue::error(
                "conductDescription",
                format!(
                    "describe the conduct in at least {} characters",
                    MIN_CONDUCT_DESCRIPTION_CHARS
                ),
            ));
        }

        if let Some(report_id) = complaint.report_id {
            match self.storage.get_report(report_id).await? {
                None => issues.push(ValidationIssue::error("reportId", "linked report does not exist")),
                Some(r) if r.status == ReportStatus::Draft => issues.push(ValidationIssue::error(
                    "reportId",
                    "linked report is still a draft",
                )),
                Some(_) => {}
            }
        }

        for (i, photo_id) in complaint.evidence_photo_ids.iter().enumerate() {
            let field = format!("evidencePhotoIds[{i}]");
            let Some(photo) = self.storage.get_photo(*photo_id).await? else {
                issues.push(ValidationIssue::error(field, "photo does not exist"));
                continue;
            };
            let belongs = match complaint.report_id {
                Some(report_id) => photo.report_id == report_id,
                None => self
                    .storage
                    .get_report(photo.report_id)
                    .await?
                    .is_some_and(|r| r.inspector_id == complaint.complainant_id),
            };
            if !belongs {
                issues.push(ValidationIssue::error(
                    field,
                    "photo must come from the linked report or one of your reports",
                ));
            }
        }
        Ok(issues)
    }

    pub async fn submit(&self, acting: &User, id: Uuid) -> Result<LbpComplaint> {
        let mut complaint = self.load(id).await?;
        ensure_complainant(acting, &complaint)?;
        if complaint.status != ComplaintStatus::Draft {
            return Err(AppError::InvalidTransition {
                from: complaint.status.to_string(),
                to: ComplaintStatus::Submitted.to_string(),
            });
        }
        let issues = self.submission_issues(&complaint).await?;
        if !issues.is_empty() {
            return Err(AppError::Validation { issues });
        }

        move_to(&mut complaint, &[ComplaintStatus::Draft], ComplaintStatus::Submitted)?;
        complaint.submitted_at = Some(complaint.updated_at);
        self.storage.update_complaint(&complaint).await?;
        metrics::complaints::submitted();
        info!("Complaint {} submitted by {}", complaint.id, acting.email);
        Ok(complaint)
    }

    pub async fn acknowledge(
        &self,
        acting: &User,
        id: Uuid,
        board_reference: &str,
    ) -> Result<LbpComplaint> {
        ensure_admin(acting)?;
        let board_reference = board_reference.trim();
        if board_reference.is_empty() {
            return Err(AppError::invalid("boardReference", "board reference is required"));
        }
        let mut complaint = self.load(id).await?;
        move_to(&mut complaint, &[ComplaintStatus::Submitted], ComplaintStatus::Acknowledged)?;
        complaint.board_reference = Some(board_reference.to_string());
        self.storage.update_complaint(&complaint).await?;
        Ok(complaint)
    }

    pub async fn close(&self, acting: &User, id: Uuid) -> Result<LbpComplaint> {
        ensure_admin(acting)?;
        let mut complaint = self.load(id).await?;
        move_to(&mut complaint, &[ComplaintStatus::Acknowledged], ComplaintStatus::Closed)?;
        self.storage.update_complaint(&complaint).await?;
        Ok(complaint)
    }

    pub async fn withdraw(&self, acting: &User, id: Uuid) -> Result<LbpComplaint> {
        let mut complaint = self.load(id).await?;
        ensure_complainant(acting, &complaint)?;
        move_to(
            &mut complaint,
            &[ComplaintStatus::Draft, ComplaintStatus::Submitted],
            ComplaintStatus::Withdrawn,
        )?;
        self.storage.update_complaint(&complaint).await?;
        info!("Complaint {} withdrawn", complaint.id);
        Ok(complaint)
    }

    pub async fn pdf(&self, acting: &User, id: Uuid) -> Result<Vec<u8>> {
        let complaint = self.get(acting, id).await?;
        let complainant = self
            .storage
            .get_user(complaint.complainant_id)
            .await?
            .ok_or_else(|| AppError::not_found("user", complaint.complainant_id))?;
        let report = match complaint.report_id {
            Some(report_id) => self.storage.get_report(report_id).await?,
            None => None,
        };
        crate::pdf::render_complaint(&complaint, &complainant, report.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::Fixture;

    const CONDUCT: &str =
        "Flashings around the chimney were never fixed and water now runs into the ceiling cavity.";

    fn draft(report_id: Option<Uuid>) -> NewComplaint {
        NewComplaint {
            report_id,
            lbp_number: "bp123456".to_string(),
            lbp_name: "Bob Builder".to_string(),
            site_address: "7 Matai Place".to_string(),
            grounds: vec![ComplaintGround::Negligence, ComplaintGround::Negligence],
            conduct_description: CONDUCT.to_string(),
            ..Default::default()
        }
    }

    async fn report_for(fx: &Fixture, owner: &User, status: ReportStatus) -> Report {
        let mut report = Report::new(
            owner.id,
            format!("RPT-2026-{:04}", fx.storage.next_report_sequence(2026).await.unwrap()),
            NewReport {
                property_address: "7 Matai Place".to_string(),
                client_name: "Owner".to_string(),
                ..Default::default()
            },
        );
        report.status = status;
        fx.storage.create_report(&report).await.unwrap();
        report
    }

    #[tokio::test]
    async fn drafts_are_normalised() {
        let fx = Fixture::new();
        let uc = ComplaintUseCase::new(fx.storage.clone());
        let user = fx.user(UserRole::Inspector).await;
        let complaint = uc.create(&user, draft(None)).await.unwrap();
        assert_eq!(complaint.lbp_number, "BP123456");
        assert_eq!(complaint.grounds, vec![ComplaintGround::Negligence]);
        assert_eq!(complaint.status, ComplaintStatus::Draft);
    }

    #[tokio::test]
    async fn submission_lists_every_problem() {
        let fx = Fixture::new();
        let uc = ComplaintUseCase::new(fx.storage.clone());
        let user = fx.user(UserRole::Inspector).await;
        let draft_report = report_for(&fx, &user, ReportStatus::Draft).await;
        let complaint = uc
            .create(
                &user,
                NewComplaint {
                    report_id: Some(draft_report.id),
                    lbp_number: "123456".to_string(),
                    conduct_description: "too short".to_string(),
                    evidence_photo_ids: vec![Uuid::new_v4()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        match uc.submit(&user, complaint.id).await {
            Err(AppError::Validation { issues }) => {
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec![
                        "lbpNumber",
                        "lbpName",
                        "siteAddress",
                        "grounds",
                        "conductDescription",
                        "reportId",
                        "evidencePhotoIds[0]",
                    ]
                );
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn evidence_must_come_from_the_linked_report() {
        let fx = Fixture::new();
        let uc = ComplaintUseCase::new(fx.storage.clone());
        let user = fx.user(UserRole::Inspector).await;
        let linked = report_for(&fx, &user, ReportStatus::Approved).await;
        let other = report_for(&fx, &user, ReportStatus::Approved).await;
        let photo = Photo {
            id: Uuid::new_v4(),
            report_id: other.id,
            defect_id: None,
            roof_element_id: None,
            filename: "x.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            size_bytes: 3,
            storage_ref: format!("cas:sha256:{}", "0".repeat(64)),
            caption: None,
            sort_order: 0,
            taken_at: None,
            latitude: None,
            longitude: None,
            created_at: utc_now(),
        };
        fx.storage.create_photo(&photo).await.unwrap();

        let linked_complaint = uc
            .create(
                &user,
                NewComplaint {
                    evidence_photo_ids: vec![photo.id],
                    ..draft(Some(linked.id))
                },
            )
            .await
            .unwrap();
        let issues = uc.submission_issues(&linked_complaint).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "evidencePhotoIds[0]");

        // Without a linked report any of the complainant's photos will do
        let unlinked = uc
            .create(
                &user,
                NewComplaint {
                    evidence_photo_ids: vec![photo.id],
                    ..draft(None)
                },
            )
            .await
            .unwrap();
        assert!(uc.submission_issues(&unlinked).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn board_workflow() {
        let fx = Fixture::new();
        let uc = ComplaintUseCase::new(fx.storage.clone());
        let user = fx.user(UserRole::Inspector).await;
        let admin = fx.user(UserRole::Admin).await;
        let complaint = uc.create(&user, draft(None)).await.unwrap();

        assert!(matches!(
            uc.acknowledge(&admin, complaint.id, "BPB-1").await,
            Err(AppError::InvalidTransition { .. })
        ));

        let submitted = uc.submit(&user, complaint.id).await.unwrap();
        assert!(submitted.submitted_at.is_some());
        assert!(matches!(
            uc.update(&user, complaint.id, ComplaintUpdate::default()).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            uc.acknowledge(&user, complaint.id, "BPB-1").await,
            Err(AppError::Forbidden(_))
        ));

        let acknowledged = uc.acknowledge(&admin, complaint.id, " BPB-2026-77 ").await.unwrap();
        assert_eq!(acknowledged.board_reference.as_deref(), Some("BPB-2026-77"));
        assert!(matches!(
            uc.withdraw(&user, complaint.id).await,
            Err(AppError::InvalidTransition { .. })
        ));

        let closed = uc.close(&admin, complaint.id).await.unwrap();
        assert_eq!(closed.status, ComplaintStatus::Closed);
        assert_eq!(uc.list(&admin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn other_users_cannot_read_or_withdraw() {
        let fx = Fixture::new();
        let uc = ComplaintUseCase::new(fx.storage.clone());
        let user = fx.user(UserRole::Inspector).await;
        let stranger = fx.user(UserRole::Reviewer).await;
        let complaint = uc.create(&user, draft(None)).await.unwrap();

        assert!(matches!(uc.get(&stranger, complaint.id).await, Err(AppError::Forbidden(_))));
        assert!(uc.list(&stranger).await.unwrap().is_empty());
        assert!(matches!(
            uc.withdraw(&stranger, complaint.id).await,
            Err(AppError::Forbidden(_))
        ));
        let withdrawn = uc.withdraw(&user, complaint.id).await.unwrap();
        assert_eq!(withdrawn.status, ComplaintStatus::Withdrawn);
        assert!(uc.pdf(&user, complaint.id).await.unwrap().starts_with(b"%PDF"));
    }
}
