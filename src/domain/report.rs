use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{apply_text, utc_now, ComplianceAssessment};

string_enum! {
    /// Lifecycle position of a report. Only `Finalised` is terminal.
    ReportStatus {
        Draft("DRAFT", "Draft"),
        InProgress("IN_PROGRESS", "In progress"),
        PendingReview("PENDING_REVIEW", "Pending review"),
        Approved("APPROVED", "Approved"),
        Finalised("FINALISED", "Finalised"),
    }
}

impl ReportStatus {
    pub fn is_editable(&self) -> bool {
        *self != ReportStatus::Finalised
    }
}

string_enum! {
    PropertyType {
        Residential("RESIDENTIAL", "Residential"),
        MultiUnit("MULTI_UNIT", "Multi-unit"),
        Commercial("COMMERCIAL", "Commercial"),
        Industrial("INDUSTRIAL", "Industrial"),
        Other("OTHER", "Other"),
    }
}

string_enum! {
    InspectionType {
        Full("FULL", "Full inspection"),
        Visual("VISUAL", "Visual inspection"),
        NonInvasive("NON_INVASIVE", "Non-invasive inspection"),
        Invasive("INVASIVE", "Invasive inspection"),
        PrePurchase("PRE_PURCHASE", "Pre-purchase inspection"),
        Maintenance("MAINTENANCE", "Maintenance inspection"),
        Dispute("DISPUTE", "Dispute resolution"),
        WarrantyClaim("WARRANTY_CLAIM", "Warranty claim"),
    }
}

string_enum! {
    ElementType {
        RoofCladding("ROOF_CLADDING", "Roof cladding"),
        Underlay("UNDERLAY", "Underlay"),
        Flashing("FLASHING", "Flashing"),
        Gutter("GUTTER", "Gutter"),
        Downpipe("DOWNPIPE", "Downpipe"),
        Fascia("FASCIA", "Fascia"),
        Barge("BARGE", "Barge"),
        Ridge("RIDGE", "Ridge"),
        Valley("VALLEY", "Valley"),
        Skylight("SKYLIGHT", "Skylight"),
        Penetration("PENETRATION", "Penetration"),
        Structure("STRUCTURE", "Roof structure"),
        Other("OTHER", "Other"),
    }
}

string_enum! {
    ConditionRating {
        Good("GOOD", "Good"),
        Fair("FAIR", "Fair"),
        Poor("POOR", "Poor"),
        Critical("CRITICAL", "Critical"),
        NotInspected("NOT_INSPECTED", "Not inspected"),
    }
}

string_enum! {
    DefectClass {
        MajorDefect("MAJOR_DEFECT", "Major defect"),
        MinorDefect("MINOR_DEFECT", "Minor defect"),
        SafetyHazard("SAFETY_HAZARD", "Safety hazard"),
        MaintenanceItem("MAINTENANCE_ITEM", "Maintenance item"),
        Workmanship("WORKMANSHIP", "Workmanship"),
    }
}

string_enum! {
    Severity {
        Critical("CRITICAL", "Critical"),
        High("HIGH", "High"),
        Medium("MEDIUM", "Medium"),
        Low("LOW", "Low"),
    }
}

impl Severity {
    pub fn needs_recommendation(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub report_number: String,
    pub inspector_id: Uuid,
    pub status: ReportStatus,
    pub property_address: String,
    pub property_city: Option<String>,
    pub property_region: Option<String>,
    pub property_type: Option<PropertyType>,
    pub building_age: Option<i32>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub inspection_date: Option<NaiveDate>,
    pub inspection_type: Option<InspectionType>,
    pub weather_conditions: Option<String>,
    pub access_method: Option<String>,
    pub limitations: Option<String>,
    pub scope_of_works: Option<String>,
    pub executive_summary: Option<String>,
    pub conclusions: Option<String>,
    pub recommendations: Option<String>,
    pub declaration_signed: bool,
    pub signature_ref: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub finalised_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(inspector_id: Uuid, report_number: String, input: NewReport) -> Self {
        let now = utc_now();
        let mut report = Report {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            report_number,
            inspector_id,
            status: ReportStatus::Draft,
            property_address: input.property_address.trim().to_string(),
            property_city: None,
            property_region: None,
            property_type: input.property_type,
            building_age: input.building_age,
            client_name: input.client_name.trim().to_string(),
            client_email: None,
            client_phone: None,
            inspection_date: input.inspection_date,
            inspection_type: input.inspection_type,
            weather_conditions: None,
            access_method: None,
            limitations: None,
            scope_of_works: None,
            executive_summary: None,
            conclusions: None,
            recommendations: None,
            declaration_signed: false,
            signature_ref: None,
            signed_at: None,
            submitted_at: None,
            approved_at: None,
            finalised_at: None,
            created_at: now,
            updated_at: now,
        };
        apply_text(&mut report.property_city, input.property_city);
        apply_text(&mut report.property_region, input.property_region);
        apply_text(&mut report.client_email, input.client_email);
        apply_text(&mut report.client_phone, input.client_phone);
        report
    }

    pub fn is_signed(&self) -> bool {
        self.declaration_signed && self.signature_ref.is_some()
    }

    pub fn full_address(&self) -> String {
        let mut parts = vec![self.property_address.clone()];
        parts.extend(self.property_city.clone());
        parts.extend(self.property_region.clone());
        parts.join(", ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    /// Client-generated id (mobile devices create reports offline)
    pub id: Option<Uuid>,
    pub property_address: String,
    pub property_city: Option<String>,
    pub property_region: Option<String>,
    pub property_type: Option<PropertyType>,
    pub building_age: Option<i32>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub inspection_date: Option<NaiveDate>,
    pub inspection_type: Option<InspectionType>,
}

/// Partial update of report content. Absent fields are left alone, blank
/// text clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    pub property_address: Option<String>,
    pub property_city: Option<String>,
    pub property_region: Option<String>,
    pub property_type: Option<PropertyType>,
    pub building_age: Option<i32>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub inspection_date: Option<NaiveDate>,
    pub inspection_type: Option<InspectionType>,
    pub weather_conditions: Option<String>,
    pub access_method: Option<String>,
    pub limitations: Option<String>,
    pub scope_of_works: Option<String>,
    pub executive_summary: Option<String>,
    pub conclusions: Option<String>,
    pub recommendations: Option<String>,
}

impl ReportUpdate {
    pub fn apply(self, report: &mut Report) {
        if let Some(address) = self.property_address {
            report.property_address = address.trim().to_string();
        }
        if let Some(client) = self.client_name {
            report.client_name = client.trim().to_string();
        }
        if self.property_type.is_some() {
            report.property_type = self.property_type;
        }
        if self.building_age.is_some() {
            report.building_age = self.building_age;
        }
        if self.inspection_date.is_some() {
            report.inspection_date = self.inspection_date;
        }
        if self.inspection_type.is_some() {
            report.inspection_type = self.inspection_type;
        }
        apply_text(&mut report.property_city, self.property_city);
        apply_text(&mut report.property_region, self.property_region);
        apply_text(&mut report.client_email, self.client_email);
        apply_text(&mut report.client_phone, self.client_phone);
        apply_text(&mut report.weather_conditions, self.weather_conditions);
        apply_text(&mut report.access_method, self.access_method);
        apply_text(&mut report.limitations, self.limitations);
        apply_text(&mut report.scope_of_works, self.scope_of_works);
        apply_text(&mut report.executive_summary, self.executive_summary);
        apply_text(&mut report.conclusions, self.conclusions);
        apply_text(&mut report.recommendations, self.recommendations);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoofElement {
    pub id: Uuid,
    pub report_id: Uuid,
    pub element_type: ElementType,
    pub location: String,
    pub material: Option<String>,
    pub manufacturer: Option<String>,
    pub pitch_degrees: Option<f64>,
    pub area_m2: Option<f64>,
    pub age_years: Option<i32>,
    pub condition: ConditionRating,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoofElement {
    pub id: Option<Uuid>,
    pub element_type: ElementType,
    pub location: String,
    pub material: Option<String>,
    pub manufacturer: Option<String>,
    pub pitch_degrees: Option<f64>,
    pub area_m2: Option<f64>,
    pub age_years: Option<i32>,
    pub condition: Option<ConditionRating>,
    pub comments: Option<String>,
}

impl RoofElement {
    pub fn new(report_id: Uuid, input: NewRoofElement) -> Self {
        let now = utc_now();
        let mut element = RoofElement {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            report_id,
            element_type: input.element_type,
            location: input.location.trim().to_string(),
            material: None,
            manufacturer: None,
            pitch_degrees: input.pitch_degrees,
            area_m2: input.area_m2,
            age_years: input.age_years,
            condition: input.condition.unwrap_or(ConditionRating::NotInspected),
            comments: None,
            created_at: now,
            updated_at: now,
        };
        apply_text(&mut element.material, input.material);
        apply_text(&mut element.manufacturer, input.manufacturer);
        apply_text(&mut element.comments, input.comments);
        element
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoofElementUpdate {
    pub element_type: Option<ElementType>,
    pub location: Option<String>,
    pub material: Option<String>,
    pub manufacturer: Option<String>,
    pub pitch_degrees: Option<f64>,
    pub area_m2: Option<f64>,
    pub age_years: Option<i32>,
    pub condition: Option<ConditionRating>,
    pub comments: Option<String>,
}

impl RoofElementUpdate {
    pub fn apply(self, element: &mut RoofElement) {
        if let Some(kind) = self.element_type {
            element.element_type = kind;
        }
        if let Some(location) = self.location {
            element.location = location.trim().to_string();
        }
        if self.pitch_degrees.is_some() {
            element.pitch_degrees = self.pitch_degrees;
        }
        if self.area_m2.is_some() {
            element.area_m2 = self.area_m2;
        }
        if self.age_years.is_some() {
            element.age_years = self.age_years;
        }
        if let Some(condition) = self.condition {
            element.condition = condition;
        }
        apply_text(&mut element.material, self.material);
        apply_text(&mut element.manufacturer, self.manufacturer);
        apply_text(&mut element.comments, self.comments);
        element.updated_at = utc_now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Defect {
    pub id: Uuid,
    pub report_id: Uuid,
    pub roof_element_id: Option<Uuid>,
    pub defect_number: i32,
    pub title: String,
    pub location: String,
    pub description: String,
    pub classification: DefectClass,
    pub severity: Severity,
    pub observation: Option<String>,
    pub analysis: Option<String>,
    pub opinion: Option<String>,
    pub code_clause: Option<String>,
    pub recommendation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDefect {
    pub id: Option<Uuid>,
    pub roof_element_id: Option<Uuid>,
    pub title: String,
    pub location: String,
    pub description: String,
    pub classification: DefectClass,
    pub severity: Severity,
    pub observation: Option<String>,
    pub analysis: Option<String>,
    pub opinion: Option<String>,
    pub code_clause: Option<String>,
    pub recommendation: Option<String>,
}

impl Defect {
    pub fn new(report_id: Uuid, defect_number: i32, input: NewDefect) -> Self {
        let now = utc_now();
        let mut defect = Defect {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            report_id,
            roof_element_id: input.roof_element_id,
            defect_number,
            title: input.title.trim().to_string(),
            location: input.location.trim().to_string(),
            description: input.description.trim().to_string(),
            classification: input.classification,
            severity: input.severity,
            observation: None,
            analysis: None,
            opinion: None,
            code_clause: None,
            recommendation: None,
            created_at: now,
            updated_at: now,
        };
        apply_text(&mut defect.observation, input.observation);
        apply_text(&mut defect.analysis, input.analysis);
        apply_text(&mut defect.opinion, input.opinion);
        apply_text(&mut defect.code_clause, input.code_clause);
        apply_text(&mut defect.recommendation, input.recommendation);
        defect
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "super::nullable")]
    pub roof_element_id: Option<Option<Uuid>>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub classification: Option<DefectClass>,
    pub severity: Option<Severity>,
    pub observation: Option<String>,
    pub analysis: Option<String>,
    pub opinion: Option<String>,
    pub code_clause: Option<String>,
    pub recommendation: Option<String>,
}

impl DefectUpdate {
    pub fn apply(self, defect: &mut Defect) {
        if let Some(element_id) = self.roof_element_id {
            defect.roof_element_id = element_id;
        }
        if let Some(title) = self.title {
            defect.title = title.trim().to_string();
        }
        if let Some(location) = self.location {
            defect.location = location.trim().to_string();
        }
        if let Some(description) = self.description {
            defect.description = description.trim().to_string();
        }
        if let Some(classification) = self.classification {
            defect.classification = classification;
        }
        if let Some(severity) = self.severity {
            defect.severity = severity;
        }
        apply_text(&mut defect.observation, self.observation);
        apply_text(&mut defect.analysis, self.analysis);
        apply_text(&mut defect.opinion, self.opinion);
        apply_text(&mut defect.code_clause, self.code_clause);
        apply_text(&mut defect.recommendation, self.recommendation);
        defect.updated_at = utc_now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: Uuid,
    pub report_id: Uuid,
    pub defect_id: Option<Uuid>,
    pub roof_element_id: Option<Uuid>,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_ref: String,
    pub caption: Option<String>,
    pub sort_order: i32,
    pub taken_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Metadata sent alongside an uploaded photo binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMeta {
    pub defect_id: Option<Uuid>,
    pub roof_element_id: Option<Uuid>,
    pub caption: Option<String>,
    pub sort_order: Option<i32>,
    pub taken_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "super::nullable")]
    pub defect_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "super::nullable")]
    pub roof_element_id: Option<Option<Uuid>>,
    pub caption: Option<String>,
    pub sort_order: Option<i32>,
}

/// A report together with everything hanging off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundle {
    pub report: Report,
    pub roof_elements: Vec<RoofElement>,
    pub defects: Vec<Defect>,
    pub photos: Vec<Photo>,
    pub compliance: Option<ComplianceAssessment>,
}

impl ReportBundle {
    pub fn photos_for_defect(&self, defect_id: Uuid) -> impl Iterator<Item = &Photo> {
        self.photos
            .iter()
            .filter(move |p| p.defect_id == Some(defect_id))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub search: Option<String>,
    /// Restricts to one owner; `None` means every owner
    #[serde(skip)]
    pub inspector_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ReportFilter {
    /// Case-insensitive match on report number, address and client.
    pub fn matches_search(&self, report: &Report) -> bool {
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => {
                let q = q.to_lowercase();
                report.report_number.to_lowercase().contains(&q)
                    || report.property_address.to_lowercase().contains(&q)
                    || report.client_name.to_lowercase().contains(&q)
            }
        }
    }
}
