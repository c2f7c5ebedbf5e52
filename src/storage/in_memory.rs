use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::traits::Storage;
use crate::domain::*;
use crate::error::{AppError, Result};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    reports: HashMap<Uuid, Report>,
    roof_elements: HashMap<Uuid, RoofElement>,
    defects: HashMap<Uuid, Defect>,
    photos: HashMap<Uuid, Photo>,
    compliance: HashMap<Uuid, ComplianceAssessment>,
    complaints: HashMap<Uuid, LbpComplaint>,
}

impl Tables {
    fn detach_defect(&mut self, defect_id: Uuid) {
        for photo in self.photos.values_mut() {
            if photo.defect_id == Some(defect_id) {
                photo.defect_id = None;
            }
        }
    }

    fn detach_element(&mut self, element_id: Uuid) {
        for defect in self.defects.values_mut() {
            if defect.roof_element_id == Some(element_id) {
                defect.roof_element_id = None;
            }
        }
        for photo in self.photos.values_mut() {
            if photo.roof_element_id == Some(element_id) {
                photo.roof_element_id = None;
            }
        }
    }
}

/// In-memory storage implementation for development/testing
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Storage("in-memory storage lock poisoned".to_string()))
    }
}

fn ensure(found: bool, entity: &'static str, id: Uuid) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(AppError::not_found(entity, id))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "a user with e-mail {} already exists",
                user.email
            )));
        }
        t.users.insert(user.id, user.clone());
        debug!("Created user {} with id {}", user.email, user.id);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let t = self.tables()?;
        Ok(t.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.users.contains_key(&user.id);
        ensure(found, "user", user.id)?;
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.tables()?.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn count_users(&self) -> Result<usize> {
        Ok(self.tables()?.users.len())
    }

    async fn create_report(&self, report: &Report) -> Result<()> {
        let mut t = self.tables()?;
        if t.reports.contains_key(&report.id) {
            return Err(AppError::Conflict(format!("report {} already exists", report.id)));
        }
        if t
            .reports
            .values()
            .any(|r| r.report_number == report.report_number)
        {
            return Err(AppError::Conflict(format!(
                "report number {} is already taken",
                report.report_number
            )));
        }
        t.reports.insert(report.id, report.clone());
        debug!("Created report {} with id {}", report.report_number, report.id);
        Ok(())
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
        Ok(self.tables()?.reports.get(&id).cloned())
    }

    async fn update_report(&self, report: &Report) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.reports.contains_key(&report.id);
        ensure(found, "report", report.id)?;
        t.reports.insert(report.id, report.clone());
        debug!("Updated report {}", report.id);
        Ok(())
    }

    async fn delete_report(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables()?;
        if t.reports.remove(&id).is_none() {
            return Err(AppError::not_found("report", id));
        }
        t.roof_elements.retain(|_, e| e.report_id != id);
        t.defects.retain(|_, d| d.report_id != id);
        t.photos.retain(|_, p| p.report_id != id);
        t.compliance.remove(&id);
        for complaint in t.complaints.values_mut() {
            if complaint.report_id == Some(id) {
                complaint.report_id = None;
            }
        }
        Ok(())
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let t = self.tables()?;
        let mut reports: Vec<Report> = t
            .reports
            .values()
            .filter(|r| filter.inspector_id.map_or(true, |id| r.inspector_id == id))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.matches_search(r))
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(reports.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_reports_by_status(
        &self,
        inspector_id: Option<Uuid>,
    ) -> Result<Vec<(ReportStatus, usize)>> {
        let t = self.tables()?;
        Ok(ReportStatus::ALL
            .iter()
            .map(|status| {
                let n = t
                    .reports
                    .values()
                    .filter(|r| r.status == *status)
                    .filter(|r| inspector_id.map_or(true, |id| r.inspector_id == id))
                    .count();
                (*status, n)
            })
            .collect())
    }

    async fn next_report_sequence(&self, year: i32) -> Result<u32> {
        let t = self.tables()?;
        let max = t
            .reports
            .values()
            .filter_map(|r| super::report_sequence(&r.report_number, year))
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn reports_updated_since(
        &self,
        inspector_id: Option<Uuid>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Report>> {
        let t = self.tables()?;
        let mut reports: Vec<Report> = t
            .reports
            .values()
            .filter(|r| inspector_id.map_or(true, |id| r.inspector_id == id))
            .filter(|r| since.map_or(true, |s| r.updated_at > s))
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(reports)
    }

    async fn create_roof_element(&self, element: &RoofElement) -> Result<()> {
        self.tables()?
            .roof_elements
            .insert(element.id, element.clone());
        Ok(())
    }

    async fn get_roof_element(&self, id: Uuid) -> Result<Option<RoofElement>> {
        Ok(self.tables()?.roof_elements.get(&id).cloned())
    }

    async fn update_roof_element(&self, element: &RoofElement) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.roof_elements.contains_key(&element.id);
        ensure(found, "roof element", element.id)?;
        t.roof_elements.insert(element.id, element.clone());
        Ok(())
    }

    async fn delete_roof_element(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables()?;
        if t.roof_elements.remove(&id).is_none() {
            return Err(AppError::not_found("roof element", id));
        }
        t.detach_element(id);
        Ok(())
    }

    async fn list_roof_elements(&self, report_id: Uuid) -> Result<Vec<RoofElement>> {
        let t = self.tables()?;
        let mut elements: Vec<RoofElement> = t
            .roof_elements
            .values()
            .filter(|e| e.report_id == report_id)
            .cloned()
            .collect();
        elements.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(elements)
    }

    async fn create_defect(&self, defect: &Defect) -> Result<()> {
        self.tables()?.defects.insert(defect.id, defect.clone());
        Ok(())
    }

    async fn get_defect(&self, id: Uuid) -> Result<Option<Defect>> {
        Ok(self.tables()?.defects.get(&id).cloned())
    }

    async fn update_defect(&self, defect: &Defect) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.defects.contains_key(&defect.id);
        ensure(found, "defect", defect.id)?;
        t.defects.insert(defect.id, defect.clone());
        Ok(())
    }

    async fn delete_defect(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables()?;
        if t.defects.remove(&id).is_none() {
            return Err(AppError::not_found("defect", id));
        }
        t.detach_defect(id);
        Ok(())
    }

    async fn list_defects(&self, report_id: Uuid) -> Result<Vec<Defect>> {
        let t = self.tables()?;
        let mut defects: Vec<Defect> = t
            .defects
            .values()
            .filter(|d| d.report_id == report_id)
            .cloned()
            .collect();
        defects.sort_by_key(|d| d.defect_number);
        Ok(defects)
    }

    async fn next_defect_number(&self, report_id: Uuid) -> Result<i32> {
        let t = self.tables()?;
        let max = t
            .defects
            .values()
            .filter(|d| d.report_id == report_id)
            .map(|d| d.defect_number)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn create_photo(&self, photo: &Photo) -> Result<()> {
        self.tables()?.photos.insert(photo.id, photo.clone());
        Ok(())
    }

    async fn get_photo(&self, id: Uuid) -> Result<Option<Photo>> {
        Ok(self.tables()?.photos.get(&id).cloned())
    }

    async fn update_photo(&self, photo: &Photo) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.photos.contains_key(&photo.id);
        ensure(found, "photo", photo.id)?;
        t.photos.insert(photo.id, photo.clone());
        Ok(())
    }

    async fn delete_photo(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables()?;
        if t.photos.remove(&id).is_none() {
            return Err(AppError::not_found("photo", id));
        }
        Ok(())
    }

    async fn list_photos(&self, report_id: Uuid) -> Result<Vec<Photo>> {
        let t = self.tables()?;
        let mut photos: Vec<Photo> = t
            .photos
            .values()
            .filter(|p| p.report_id == report_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(photos)
    }

    async fn get_compliance(&self, report_id: Uuid) -> Result<Option<ComplianceAssessment>> {
        Ok(self.tables()?.compliance.get(&report_id).cloned())
    }

    async fn put_compliance(&self, report: &Report, assessment: &ComplianceAssessment) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.reports.contains_key(&report.id);
        ensure(found, "report", report.id)?;
        t.reports.insert(report.id, report.clone());
        t.compliance.insert(assessment.report_id, assessment.clone());
        Ok(())
    }

    async fn create_complaint(&self, complaint: &LbpComplaint) -> Result<()> {
        self.tables()?
            .complaints
            .insert(complaint.id, complaint.clone());
        Ok(())
    }

    async fn get_complaint(&self, id: Uuid) -> Result<Option<LbpComplaint>> {
        Ok(self.tables()?.complaints.get(&id).cloned())
    }

    async fn update_complaint(&self, complaint: &LbpComplaint) -> Result<()> {
        let mut t = self.tables()?;
        let found = t.complaints.contains_key(&complaint.id);
        ensure(found, "complaint", complaint.id)?;
        t.complaints.insert(complaint.id, complaint.clone());
        Ok(())
    }

    async fn list_complaints(&self, complainant_id: Option<Uuid>) -> Result<Vec<LbpComplaint>> {
        let t = self.tables()?;
        let mut complaints: Vec<LbpComplaint> = t
            .complaints
            .values()
            .filter(|c| complainant_id.map_or(true, |id| c.complainant_id == id))
            .cloned()
            .collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    async fn save_report_tree(
        &self,
        report: &Report,
        elements: &[RoofElement],
        defects: &[Defect],
        compliance: Option<&ComplianceAssessment>,
    ) -> Result<()> {
        // A single guard makes the whole replacement atomic
        let mut t = self.tables()?;
        if let Some(existing) = t
            .reports
            .values()
            .find(|r| r.report_number == report.report_number && r.id != report.id)
        {
            return Err(AppError::Conflict(format!(
                "report number {} is already used by {}",
                report.report_number, existing.id
            )));
        }
        t.reports.insert(report.id, report.clone());

        let stale_elements: Vec<Uuid> = t
            .roof_elements
            .values()
            .filter(|e| e.report_id == report.id && !elements.iter().any(|n| n.id == e.id))
            .map(|e| e.id)
            .collect();
        for id in stale_elements {
            t.roof_elements.remove(&id);
            t.detach_element(id);
        }
        for element in elements {
            t.roof_elements.insert(element.id, element.clone());
        }

        let stale_defects: Vec<Uuid> = t
            .defects
            .values()
            .filter(|d| d.report_id == report.id && !defects.iter().any(|n| n.id == d.id))
            .map(|d| d.id)
            .collect();
        for id in stale_defects {
            t.defects.remove(&id);
            t.detach_defect(id);
        }
        for defect in defects {
            t.defects.insert(defect.id, defect.clone());
        }

        if let Some(assessment) = compliance {
            t.compliance.insert(report.id, assessment.clone());
        }
        debug!(
            "Saved report tree {} ({} elements, {} defects)",
            report.id,
            elements.len(),
            defects.len()
        );
        Ok(())
    }

    async fn clear_all_data(&self) -> Result<()> {
        *self.tables()? = Tables::default();
        Ok(())
    }
}
