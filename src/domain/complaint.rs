use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{apply_text, utc_now};

string_enum! {
    ComplaintStatus {
        Draft("DRAFT", "Draft"),
        Submitted("SUBMITTED", "Submitted"),
        Acknowledged("ACKNOWLEDGED", "Acknowledged"),
        Closed("CLOSED", "Closed"),
        Withdrawn("WITHDRAWN", "Withdrawn"),
    }
}

impl ComplaintStatus {
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ComplaintStatus::Draft | ComplaintStatus::Submitted | ComplaintStatus::Acknowledged
        )
    }
}

string_enum! {
    LicenceClass {
        Carpentry("CARPENTRY", "Carpentry"),
        Roofing("ROOFING", "Roofing"),
        Design("DESIGN", "Design"),
        Site("SITE", "Site"),
        Foundations("FOUNDATIONS", "Foundations"),
        ExternalPlastering("EXTERNAL_PLASTERING", "External plastering"),
        BrickAndBlocklaying("BRICK_AND_BLOCKLAYING", "Brick and blocklaying"),
    }
}

string_enum! {
    /// Disciplinary grounds a complaint against a licensed building
    /// practitioner can rest on.
    ComplaintGround {
        Negligence("NEGLIGENCE", "Negligent or incompetent building work"),
        ContraryToConsent("CONTRARY_TO_CONSENT", "Work contrary to building consent"),
        NonCompliantWork("NON_COMPLIANT_WORK", "Work that does not comply with the Building Code"),
        NoRecordOfWork("NO_RECORD_OF_WORK", "Failed to provide a record of work"),
        Misrepresentation("MISREPRESENTATION", "Misrepresented competence or licence"),
        Misconduct("MISCONDUCT", "Conduct that brings the regime into disrepute"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LbpComplaint {
    pub id: Uuid,
    pub complainant_id: Uuid,
    pub report_id: Option<Uuid>,
    pub lbp_number: String,
    pub lbp_name: String,
    pub licence_class: Option<LicenceClass>,
    pub site_address: String,
    pub work_description: Option<String>,
    pub grounds: Vec<ComplaintGround>,
    pub conduct_description: String,
    pub desired_outcome: Option<String>,
    pub evidence_photo_ids: Vec<Uuid>,
    pub status: ComplaintStatus,
    pub board_reference: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComplaint {
    pub report_id: Option<Uuid>,
    #[serde(default)]
    pub lbp_number: String,
    #[serde(default)]
    pub lbp_name: String,
    pub licence_class: Option<LicenceClass>,
    #[serde(default)]
    pub site_address: String,
    pub work_description: Option<String>,
    #[serde(default)]
    pub grounds: Vec<ComplaintGround>,
    #[serde(default)]
    pub conduct_description: String,
    pub desired_outcome: Option<String>,
    #[serde(default)]
    pub evidence_photo_ids: Vec<Uuid>,
}

impl LbpComplaint {
    pub fn new(complainant_id: Uuid, input: NewComplaint) -> Self {
        let now = utc_now();
        let mut complaint = LbpComplaint {
            id: Uuid::new_v4(),
            complainant_id,
            report_id: input.report_id,
            lbp_number: input.lbp_number.trim().to_uppercase(),
            lbp_name: input.lbp_name.trim().to_string(),
            licence_class: input.licence_class,
            site_address: input.site_address.trim().to_string(),
            work_description: None,
            grounds: dedup(input.grounds),
            conduct_description: input.conduct_description.trim().to_string(),
            desired_outcome: None,
            evidence_photo_ids: input.evidence_photo_ids,
            status: ComplaintStatus::Draft,
            board_reference: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        };
        apply_text(&mut complaint.work_description, input.work_description);
        apply_text(&mut complaint.desired_outcome, input.desired_outcome);
        complaint
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "super::nullable")]
    pub report_id: Option<Option<Uuid>>,
    pub lbp_number: Option<String>,
    pub lbp_name: Option<String>,
    pub licence_class: Option<LicenceClass>,
    pub site_address: Option<String>,
    pub work_description: Option<String>,
    pub grounds: Option<Vec<ComplaintGround>>,
    pub conduct_description: Option<String>,
    pub desired_outcome: Option<String>,
    pub evidence_photo_ids: Option<Vec<Uuid>>,
}

impl ComplaintUpdate {
    pub fn apply(self, complaint: &mut LbpComplaint) {
        if let Some(report_id) = self.report_id {
            complaint.report_id = report_id;
        }
        if let Some(number) = self.lbp_number {
            complaint.lbp_number = number.trim().to_uppercase();
        }
        if let Some(name) = self.lbp_name {
            complaint.lbp_name = name.trim().to_string();
        }
        if self.licence_class.is_some() {
            complaint.licence_class = self.licence_class;
        }
        if let Some(address) = self.site_address {
            complaint.site_address = address.trim().to_string();
        }
        if let Some(grounds) = self.grounds {
            complaint.grounds = dedup(grounds);
        }
        if let Some(conduct) = self.conduct_description {
            complaint.conduct_description = conduct.trim().to_string();
        }
        if let Some(ids) = self.evidence_photo_ids {
            complaint.evidence_photo_ids = ids;
        }
        apply_text(&mut complaint.work_description, self.work_description);
        apply_text(&mut complaint.desired_outcome, self.desired_outcome);
        complaint.updated_at = utc_now();
    }
}

fn dedup(grounds: Vec<ComplaintGround>) -> Vec<ComplaintGround> {
    let mut out = Vec::with_capacity(grounds.len());
    for g in grounds {
        if !out.contains(&g) {
            out.push(g);
        }
    }
    out
}
