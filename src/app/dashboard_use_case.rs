use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::validation::validate_report;
use crate::constants::DASHBOARD_RECENT_REPORTS;
use crate::domain::{ReportFilter, ReportStatus, User};
use crate::error::Result;
use crate::storage::{load_bundle, Storage};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: ReportStatus,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentReport {
    pub id: Uuid,
    pub report_number: String,
    pub property_address: String,
    pub client_name: String,
    pub status: ReportStatus,
    pub updated_at: DateTime<Utc>,
    pub completion_percent: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub counts: Vec<StatusCount>,
    pub total_reports: usize,
    pub recent: Vec<RecentReport>,
    pub open_complaints: usize,
}

pub struct DashboardUseCase {
    storage: Arc<dyn Storage>,
}

impl DashboardUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn dashboard(&self, acting: &User) -> Result<Dashboard> {
        let owner = if acting.can_review() { None } else { Some(acting.id) };

        let counts: Vec<StatusCount> = self
            .storage
            .count_reports_by_status(owner)
            .await?
            .into_iter()
            .map(|(status, count)| StatusCount {
                status,
                label: status.label(),
                count,
            })
            .collect();
        let total_reports = counts.iter().map(|c| c.count).sum();

        let filter = ReportFilter {
            inspector_id: owner,
            limit: Some(DASHBOARD_RECENT_REPORTS),
            ..Default::default()
        };
        let today = Utc::now().date_naive();
        let mut recent = Vec::new();
        for report in self.storage.list_reports(&filter).await? {
            let bundle = load_bundle(self.storage.as_ref(), report).await?;
            let completion = validate_report(&bundle, today).completion_percent;
            let report = bundle.report;
            recent.push(RecentReport {
                id: report.id,
                report_number: report.report_number,
                property_address: report.property_address,
                client_name: report.client_name,
                status: report.status,
                updated_at: report.updated_at,
                completion_percent: completion,
            });
        }

        let open_complaints = self
            .storage
            .list_complaints(Some(acting.id))
            .await?
            .iter()
            .filter(|c| c.status.is_open())
            .count();

        Ok(Dashboard {
            counts,
            total_reports,
            recent,
            open_complaints,
        })
    }
}
