//! Report status machine and who may drive it.

use crate::domain::{Report, ReportStatus, User};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    OwnerOrAdmin,
    ReviewerOrAdmin,
    AdminOnly,
    OwnerOrReviewer,
}

/// What has to hold on the report before a transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    /// The submission completion check must pass.
    Validated,
    /// A signature must be stored and the declaration accepted.
    Signed,
}

fn rule(from: ReportStatus, to: ReportStatus) -> Option<(Party, Precondition)> {
    use ReportStatus::*;
    match (from, to) {
        (Draft, InProgress) => Some((Party::OwnerOrAdmin, Precondition::None)),
        (Draft | InProgress, PendingReview) => Some((Party::OwnerOrAdmin, Precondition::Validated)),
        (PendingReview, InProgress) => Some((Party::ReviewerOrAdmin, Precondition::None)),
        (PendingReview, Approved) => Some((Party::ReviewerOrAdmin, Precondition::None)),
        (Approved, InProgress) => Some((Party::AdminOnly, Precondition::None)),
        (Approved, Finalised) => Some((Party::OwnerOrReviewer, Precondition::Signed)),
        _ => None,
    }
}

fn is_owner(user: &User, report: &Report) -> bool {
    report.inspector_id == user.id
}

/// Inspectors see their own reports; reviewers and admins see all.
pub fn ensure_can_read(user: &User, report: &Report) -> Result<()> {
    if is_owner(user, report) || user.can_review() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "report {} belongs to another inspector",
            report.report_number
        )))
    }
}

/// Content edits: owner or admin, and never once finalised.
pub fn ensure_can_edit(user: &User, report: &Report) -> Result<()> {
    ensure_can_read(user, report)?;
    if !is_owner(user, report) && !user.is_admin() {
        return Err(AppError::Forbidden(format!(
            "only the owning inspector or an admin may change report {}",
            report.report_number
        )));
    }
    ensure_not_finalised(report)
}

pub fn ensure_not_finalised(report: &Report) -> Result<()> {
    if report.status.is_editable() {
        Ok(())
    } else {
        Err(AppError::ReportFinalised(report.report_number.clone()))
    }
}

/// Checks that `user` may move `report` to `to` and returns the
/// precondition the caller still has to verify.
pub fn check_transition(user: &User, report: &Report, to: ReportStatus) -> Result<Precondition> {
    ensure_can_read(user, report)?;
    ensure_not_finalised(report)?;

    let (party, precondition) = rule(report.status, to).ok_or_else(|| AppError::InvalidTransition {
        from: report.status.to_string(),
        to: to.to_string(),
    })?;

    let owner = is_owner(user, report);
    let permitted = match party {
        Party::OwnerOrAdmin => owner || user.is_admin(),
        Party::ReviewerOrAdmin => user.can_review(),
        Party::AdminOnly => user.is_admin(),
        Party::OwnerOrReviewer => owner || user.can_review(),
    };
    if !permitted {
        return Err(AppError::Forbidden(format!(
            "{} may not move report {} from {} to {}",
            user.role.label(),
            report.report_number,
            report.status,
            to
        )));
    }
    Ok(precondition)
}

/// Status after a content edit: the first edit of a draft starts work on it.
pub fn status_after_edit(current: ReportStatus) -> ReportStatus {
    match current {
        ReportStatus::Draft => ReportStatus::InProgress,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewReport, UserRole};
    use chrono::Utc;
    use uuid::Uuid;

    fn user(role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: format!("{}@example.co.nz", role.as_str().to_lowercase()),
            name: role.label().to_string(),
            role,
            lbp_number: None,
            qualifications: None,
            company: None,
            phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn report_owned_by(owner: &User, status: ReportStatus) -> Report {
        let mut report = Report::new(
            owner.id,
            "RPT-2026-0001".to_string(),
            NewReport {
                property_address: "1 Main Road".to_string(),
                client_name: "Client".to_string(),
                ..Default::default()
            },
        );
        report.status = status;
        report
    }

    #[test]
    fn owner_submits_and_reviewer_approves() {
        let owner = user(UserRole::Inspector);
        let reviewer = user(UserRole::Reviewer);

        let draft = report_owned_by(&owner, ReportStatus::Draft);
        assert_eq!(
            check_transition(&owner, &draft, ReportStatus::PendingReview).unwrap(),
            Precondition::Validated
        );

        let pending = report_owned_by(&owner, ReportStatus::PendingReview);
        assert_eq!(
            check_transition(&reviewer, &pending, ReportStatus::Approved).unwrap(),
            Precondition::None
        );
        assert!(matches!(
            check_transition(&owner, &pending, ReportStatus::Approved),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn finalising_requires_a_signature_and_is_terminal() {
        let owner = user(UserRole::Inspector);
        let approved = report_owned_by(&owner, ReportStatus::Approved);
        assert_eq!(
            check_transition(&owner, &approved, ReportStatus::Finalised).unwrap(),
            Precondition::Signed
        );

        let finalised = report_owned_by(&owner, ReportStatus::Finalised);
        let admin = user(UserRole::Admin);
        assert!(matches!(
            check_transition(&admin, &finalised, ReportStatus::InProgress),
            Err(AppError::ReportFinalised(_))
        ));
        assert!(matches!(
            ensure_can_edit(&admin, &finalised),
            Err(AppError::ReportFinalised(_))
        ));
    }

    #[test]
    fn only_admin_reopens_approved_reports() {
        let owner = user(UserRole::Inspector);
        let approved = report_owned_by(&owner, ReportStatus::Approved);
        assert!(check_transition(&user(UserRole::Admin), &approved, ReportStatus::InProgress).is_ok());
        assert!(matches!(
            check_transition(&user(UserRole::Reviewer), &approved, ReportStatus::InProgress),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn undefined_transitions_are_rejected() {
        let owner = user(UserRole::Inspector);
        let draft = report_owned_by(&owner, ReportStatus::Draft);
        for to in [ReportStatus::Draft, ReportStatus::Approved, ReportStatus::Finalised] {
            assert!(matches!(
                check_transition(&owner, &draft, to),
                Err(AppError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn inspectors_cannot_touch_other_reports() {
        let owner = user(UserRole::Inspector);
        let other = user(UserRole::Inspector);
        let report = report_owned_by(&owner, ReportStatus::InProgress);
        assert!(matches!(ensure_can_read(&other, &report), Err(AppError::Forbidden(_))));
        assert!(ensure_can_read(&user(UserRole::Reviewer), &report).is_ok());
        assert!(matches!(
            ensure_can_edit(&user(UserRole::Reviewer), &report),
            Err(AppError::Forbidden(_))
        ));
        assert!(ensure_can_edit(&user(UserRole::Admin), &report).is_ok());
    }

    #[test]
    fn editing_a_draft_starts_work() {
        assert_eq!(status_after_edit(ReportStatus::Draft), ReportStatus::InProgress);
        assert_eq!(status_after_edit(ReportStatus::Approved), ReportStatus::Approved);
    }
}
