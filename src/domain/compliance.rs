use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    /// New Zealand Building Code clauses assessed on a roof inspection.
    BuildingCodeClause {
        B1("B1", "B1 Structure"),
        B2("B2", "B2 Durability"),
        E1("E1", "E1 Surface water"),
        E2("E2", "E2 External moisture"),
        E3("E3", "E3 Internal moisture"),
        F2("F2", "F2 Hazardous building materials"),
        G4("G4", "G4 Ventilation"),
    }
}

string_enum! {
    ComplianceStatus {
        Compliant("COMPLIANT", "Compliant"),
        NonCompliant("NON_COMPLIANT", "Non-compliant"),
        NotAssessed("NOT_ASSESSED", "Not assessed"),
        NotApplicable("NOT_APPLICABLE", "Not applicable"),
    }
}

string_enum! {
    ComplianceOutcome {
        Compliant("COMPLIANT", "Compliant"),
        NonCompliant("NON_COMPLIANT", "Non-compliant"),
        Incomplete("INCOMPLETE", "Incomplete"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceItem {
    pub clause: BuildingCodeClause,
    pub status: ComplianceStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceAssessment {
    pub id: Uuid,
    pub report_id: Uuid,
    pub items: Vec<ComplianceItem>,
    pub overall_notes: Option<String>,
    pub assessed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceAssessment {
    pub fn outcome(&self) -> ComplianceOutcome {
        outcome_of(&self.items)
    }

    pub fn has_unassessed(&self) -> bool {
        self.items
            .iter()
            .any(|i| i.status == ComplianceStatus::NotAssessed)
    }
}

pub fn outcome_of(items: &[ComplianceItem]) -> ComplianceOutcome {
    if items.iter().any(|i| i.status == ComplianceStatus::NonCompliant) {
        return ComplianceOutcome::NonCompliant;
    }
    let settled = items.iter().all(|i| {
        matches!(
            i.status,
            ComplianceStatus::Compliant | ComplianceStatus::NotApplicable
        )
    });
    let any_compliant = items.iter().any(|i| i.status == ComplianceStatus::Compliant);
    if settled && any_compliant {
        ComplianceOutcome::Compliant
    } else {
        ComplianceOutcome::Incomplete
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceInput {
    pub items: Vec<ComplianceItem>,
    pub overall_notes: Option<String>,
}
