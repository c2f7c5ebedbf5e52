//! Roof elements, defects and photos hanging off a report.
//!
//! Every change here counts as an edit of the parent report, so it is
//! refused once the report is finalised and otherwise bumps the report's
//! `updated_at` (moving a draft to in progress).

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::lifecycle;
use super::ports::PhotoStore;
use super::{load_report, touch_report};
use crate::constants::{file_extension_for, ACCEPTED_PHOTO_TYPES};
use crate::domain::*;
use crate::domain::apply_text;
use crate::error::{AppError, Result};
use crate::observability::metrics;
use crate::storage::Storage;

const MAX_FILENAME_CHARS: usize = 120;

/// A photo binary as received from a multipart upload.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct ReportItemsUseCase {
    storage: Arc<dyn Storage>,
    photos: Arc<dyn PhotoStore>,
    max_photo_bytes: usize,
}

/// Children addressed through the wrong report are reported as missing.
fn in_report<T>(
    found: Option<T>,
    report_id: Uuid,
    parent: impl Fn(&T) -> Uuid,
    entity: &'static str,
    id: Uuid,
) -> Result<T> {
    match found {
        Some(item) if parent(&item) == report_id => Ok(item),
        _ => Err(AppError::not_found(entity, id)),
    }
}

pub(crate) fn check_element(element: &RoofElement) -> Result<()> {
    if element.location.is_empty() {
        return Err(AppError::invalid("location", "must not be blank"));
    }
    if let Some(pitch) = element.pitch_degrees {
        if !(0.0..=90.0).contains(&pitch) {
            return Err(AppError::invalid("pitchDegrees", "must be between 0 and 90"));
        }
    }
    if element.area_m2.is_some_and(|a| a <= 0.0) {
        return Err(AppError::invalid("areaM2", "must be greater than zero"));
    }
    if element.age_years.is_some_and(|a| a < 0) {
        return Err(AppError::invalid("ageYears", "must not be negative"));
    }
    Ok(())
}

pub(crate) fn check_defect(defect: &Defect) -> Result<()> {
    for (field, value) in [
        ("title", &defect.title),
        ("location", &defect.location),
        ("description", &defect.description),
    ] {
        if value.is_empty() {
            return Err(AppError::invalid(field, "must not be blank"));
        }
    }
    Ok(())
}

/// Keeps letters, digits, dots, dashes and underscores.
fn sanitize_filename(name: &str, mime_type: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        format!("photo.{}", file_extension_for(mime_type))
    } else {
        cleaned
    }
}

impl ReportItemsUseCase {
    pub fn new(storage: Arc<dyn Storage>, photos: Arc<dyn PhotoStore>, max_photo_bytes: usize) -> Self {
        Self {
            storage,
            photos,
            max_photo_bytes,
        }
    }

    async fn editable_report(&self, acting: &User, report_id: Uuid) -> Result<Report> {
        let report = load_report(self.storage.as_ref(), report_id).await?;
        lifecycle::ensure_can_edit(acting, &report)?;
        Ok(report)
    }

    async fn check_element_link(&self, report_id: Uuid, element_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = element_id {
            let element = self.storage.get_roof_element(id).await?;
            if element.map_or(true, |e| e.report_id != report_id) {
                return Err(AppError::invalid(
                    "roofElementId",
                    "must reference a roof element of the same report",
                ));
            }
        }
        Ok(())
    }

    async fn check_defect_link(&self, report_id: Uuid, defect_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = defect_id {
            let defect = self.storage.get_defect(id).await?;
            if defect.map_or(true, |d| d.report_id != report_id) {
                return Err(AppError::invalid(
                    "defectId",
                    "must reference a defect of the same report",
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Roof elements
    // ------------------------------------------------------------------

    pub async fn add_element(
        &self,
        acting: &User,
        report_id: Uuid,
        input: NewRoofElement,
    ) -> Result<RoofElement> {
        let mut report = self.editable_report(acting, report_id).await?;
        if let Some(id) = input.id {
            if self.storage.get_roof_element(id).await?.is_some() {
                return Err(AppError::Conflict(format!("roof element {id} already exists")));
            }
        }
        let element = RoofElement::new(report_id, input);
        check_element(&element)?;
        self.storage.create_roof_element(&element).await?;
        touch_report(self.storage.as_ref(), &mut report).await?;
        debug!("Added {} to report {}", element.element_type, report.report_number);
        Ok(element)
    }

    pub async fn update_element(
        &self,
        acting: &User,
        report_id: Uuid,
        element_id: Uuid,
        update: RoofElementUpdate,
    ) -> Result<RoofElement> {
        let mut report = self.editable_report(acting, report_id).await?;
        let mut element = in_report(
            self.storage.get_roof_element(element_id).await?,
            report_id,
            |e| e.report_id,
            "roof element",
            element_id,
        )?;
        update.apply(&mut element);
        check_element(&element)?;
        self.storage.update_roof_element(&element).await?;
        touch_report(self.storage.as_ref(), &mut report).await?;
        Ok(element)
    }

    pub async fn delete_element(&self, acting: &User, report_id: Uuid, element_id: Uuid) -> Result<()> {
        let mut report = self.editable_report(acting, report_id).await?;
        in_report(
            self.storage.get_roof_element(element_id).await?,
            report_id,
            |e| e.report_id,
            "roof element",
            element_id,
        )?;
        self.storage.delete_roof_element(element_id).await?;
        touch_report(self.storage.as_ref(), &mut report).await
    }

    // ------------------------------------------------------------------
    // Defects
    // ------------------------------------------------------------------

    pub async fn add_defect(&self, acting: &User, report_id: Uuid, input: NewDefect) -> Result<Defect> {
        let mut report = self.editable_report(acting, report_id).await?;
        if let Some(id) = input.id {
            if self.storage.get_defect(id).await?.is_some() {
                return Err(AppError::Conflict(format!("defect {id} already exists")));
            }
        }
        self.check_element_link(report_id, input.roof_element_id).await?;
        let number = self.storage.next_defect_number(report_id).await?;
        let defect = Defect::new(report_id, number, input);
        check_defect(&defect)?;
        self.storage.create_defect(&defect).await?;
        touch_report(self.storage.as_ref(), &mut report).await?;
        debug!("Added defect {} to report {}", number, report.report_number);
        Ok(defect)
    }

    pub async fn update_defect(
        &self,
        acting: &User,
        report_id: Uuid,
        defect_id: Uuid,
        update: DefectUpdate,
    ) -> Result<Defect> {
        let mut report = self.editable_report(acting, report_id).await?;
        let mut defect = in_report(
            self.storage.get_defect(defect_id).await?,
            report_id,
            |d| d.report_id,
            "defect",
            defect_id,
        )?;
        self.check_element_link(report_id, update.roof_element_id.flatten()).await?;
        update.apply(&mut defect);
        check_defect(&defect)?;
        self.storage.update_defect(&defect).await?;
        touch_report(self.storage.as_ref(), &mut report).await?;
        Ok(defect)
    }

    pub async fn delete_defect(&self, acting: &User, report_id: Uuid, defect_id: Uuid) -> Result<()> {
        let mut report = self.editable_report(acting, report_id).await?;
        in_report(
            self.storage.get_defect(defect_id).await?,
            report_id,
            |d| d.report_id,
            "defect",
            defect_id,
        )?;
        self.storage.delete_defect(defect_id).await?;
        touch_report(self.storage.as_ref(), &mut report).await
    }

    // ------------------------------------------------------------------
    // Photos
    // ------------------------------------------------------------------

    pub async fn list_photos(&self, acting: &User, report_id: Uuid) -> Result<Vec<Photo>> {
        let report = load_report(self.storage.as_ref(), report_id).await?;
        lifecycle::ensure_can_read(acting, &report)?;
        self.storage.list_photos(report_id).await
    }

    pub async fn upload_photo(
        &self,
        acting: &User,
        report_id: Uuid,
        upload: PhotoUpload,
        meta: PhotoMeta,
    ) -> Result<Photo> {
        let mut report = self.editable_report(acting, report_id).await?;

        let mime_type = upload.content_type.trim().to_lowercase();
        if !ACCEPTED_PHOTO_TYPES.contains(&mime_type.as_str()) {
            return Err(AppError::invalid(
                "file",
                format!(
                    "unsupported photo type '{}'; expected one of {}",
                    mime_type,
                    ACCEPTED_PHOTO_TYPES.join(", ")
                ),
            ));
        }
        if upload.bytes.is_empty() {
            return Err(AppError::invalid("file", "photo is empty"));
        }
        if upload.bytes.len() > self.max_photo_bytes {
            return Err(AppError::PayloadTooLarge {
                size: upload.bytes.len(),
                limit: self.max_photo_bytes,
            });
        }
        self.check_defect_link(report_id, meta.defect_id).await?;
        self.check_element_link(report_id, meta.roof_element_id).await?;

        let sort_order = match meta.sort_order {
            Some(order) => order,
            None => {
                let existing = self.storage.list_photos(report_id).await?;
                existing.iter().map(|p| p.sort_order + 1).max().unwrap_or(0)
            }
        };

        let storage_ref = self.photos.put(&upload.bytes, &mime_type).await?;
        let mut photo = Photo {
            id: Uuid::new_v4(),
            report_id,
            defect_id: meta.defect_id,
            roof_element_id: meta.roof_element_id,
            filename: sanitize_filename(&upload.filename, &mime_type),
            mime_type,
            size_bytes: upload.bytes.len() as i64,
            storage_ref,
            caption: None,
            sort_order,
            taken_at: meta.taken_at,
            latitude: meta.latitude,
            longitude: meta.longitude,
            created_at: utc_now(),
        };
        apply_text(&mut photo.caption, meta.caption);
        self.storage.create_photo(&photo).await?;
        touch_report(self.storage.as_ref(), &mut report).await?;

        metrics::photos::uploaded(upload.bytes.len());
        info!(
            "Stored photo {} ({} bytes) on report {}",
            photo.filename, photo.size_bytes, report.report_number
        );
        Ok(photo)
    }

    pub async fn update_photo(
        &self,
        acting: &User,
        report_id: Uuid,
        photo_id: Uuid,
        update: PhotoUpdate,
    ) -> Result<Photo> {
        let mut report = self.editable_report(acting, report_id).await?;
        let mut photo = in_report(
            self.storage.get_photo(photo_id).await?,
            report_id,
            |p| p.report_id,
            "photo",
            photo_id,
        )?;
        self.check_defect_link(report_id, update.defect_id.flatten()).await?;
        self.check_element_link(report_id, update.roof_element_id.flatten()).await?;

        if let Some(defect_id) = update.defect_id {
            photo.defect_id = defect_id;
        }
        if let Some(element_id) = update.roof_element_id {
            photo.roof_element_id = element_id;
        }
        if let Some(order) = update.sort_order {
            photo.sort_order = order;
        }
        apply_text(&mut photo.caption, update.caption);
        self.storage.update_photo(&photo).await?;
        touch_report(self.storage.as_ref(), &mut report).await?;
        Ok(photo)
    }

    /// Removes the photo record. The binary stays in the content-addressed
    /// store since other records may share it.
    pub async fn delete_photo(&self, acting: &User, report_id: Uuid, photo_id: Uuid) -> Result<()> {
        let mut report = self.editable_report(acting, report_id).await?;
        in_report(
            self.storage.get_photo(photo_id).await?,
            report_id,
            |p| p.report_id,
            "photo",
            photo_id,
        )?;
        self.storage.delete_photo(photo_id).await?;
        touch_report(self.storage.as_ref(), &mut report).await
    }

    pub async fn photo_file(
        &self,
        acting: &User,
        report_id: Uuid,
        photo_id: Uuid,
    ) -> Result<(Photo, Vec<u8>)> {
        let report = load_report(self.storage.as_ref(), report_id).await?;
        lifecycle::ensure_can_read(acting, &report)?;
        let photo = in_report(
            self.storage.get_photo(photo_id).await?,
            report_id,
            |p| p.report_id,
            "photo",
            photo_id,
        )?;
        let bytes = self.photos.get(&photo.storage_ref).await?;
        Ok((photo, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::Fixture;
    use crate::app::ReportUseCase;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    async fn setup() -> (Fixture, ReportItemsUseCase, User, Report) {
        let fx = Fixture::new();
        let owner = fx.user(UserRole::Inspector).await;
        let report = ReportUseCase::new(fx.storage.clone(), fx.photos.clone())
            .create(
                &owner,
                NewReport {
                    property_address: "3 Rimu Lane".to_string(),
                    client_name: "Client".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let uc = ReportItemsUseCase::new(fx.storage.clone(), fx.photos.clone(), 1024);
        (fx, uc, owner, report)
    }

    fn element(location: &str) -> NewRoofElement {
        NewRoofElement {
            id: None,
            element_type: ElementType::Gutter,
            location: location.to_string(),
            material: Some("PVC".to_string()),
            manufacturer: None,
            pitch_degrees: None,
            area_m2: None,
            age_years: None,
            condition: None,
            comments: None,
        }
    }

    fn defect(title: &str, roof_element_id: Option<Uuid>) -> NewDefect {
        NewDefect {
            id: None,
            roof_element_id,
            title: title.to_string(),
            location: "North face".to_string(),
            description: "Sagging between brackets".to_string(),
            classification: DefectClass::MinorDefect,
            severity: Severity::High,
            observation: None,
            analysis: None,
            opinion: None,
            code_clause: None,
            recommendation: None,
        }
    }

    fn jpeg(name: &str) -> PhotoUpload {
        PhotoUpload {
            filename: name.to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: JPEG.to_vec(),
        }
    }

    #[tokio::test]
    async fn element_rules_are_enforced() {
        let (fx, uc, owner, report) = setup().await;
        assert!(uc.add_element(&owner, report.id, element("  ")).await.is_err());

        let steep = NewRoofElement {
            pitch_degrees: Some(95.0),
            ..element("Main roof")
        };
        assert!(matches!(
            uc.add_element(&owner, report.id, steep).await,
            Err(AppError::Validation { .. })
        ));

        let added = uc.add_element(&owner, report.id, element("Rear gutter")).await.unwrap();
        assert_eq!(added.condition, ConditionRating::NotInspected);
        let stored = fx.storage.get_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::InProgress);
    }

    #[tokio::test]
    async fn defects_are_numbered_per_report() {
        let (_fx, uc, owner, report) = setup().await;
        let gutter = uc.add_element(&owner, report.id, element("Front")).await.unwrap();
        let first = uc
            .add_defect(&owner, report.id, defect("Sag", Some(gutter.id)))
            .await
            .unwrap();
        let second = uc.add_defect(&owner, report.id, defect("Leak", None)).await.unwrap();
        assert_eq!((first.defect_number, second.defect_number), (1, 2));

        let stranger = uc
            .add_defect(&owner, report.id, defect("Ghost", Some(Uuid::new_v4())))
            .await;
        assert!(matches!(stranger, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn photo_uploads_are_checked_and_stored() {
        let (fx, uc, owner, report) = setup().await;

        let gif = PhotoUpload {
            content_type: "image/gif".to_string(),
            ..jpeg("a.gif")
        };
        assert!(matches!(
            uc.upload_photo(&owner, report.id, gif, PhotoMeta::default()).await,
            Err(AppError::Validation { .. })
        ));

        let empty = PhotoUpload {
            bytes: Vec::new(),
            ..jpeg("a.jpg")
        };
        assert!(uc
            .upload_photo(&owner, report.id, empty, PhotoMeta::default())
            .await
            .is_err());

        let huge = PhotoUpload {
            bytes: vec![0u8; 2048],
            ..jpeg("a.jpg")
        };
        assert!(matches!(
            uc.upload_photo(&owner, report.id, huge, PhotoMeta::default()).await,
            Err(AppError::PayloadTooLarge { size: 2048, limit: 1024 })
        ));

        let first = uc
            .upload_photo(&owner, report.id, jpeg("../../etc/ridge cap.jpg"), PhotoMeta::default())
            .await
            .unwrap();
        assert_eq!(first.filename, "ridge_cap.jpg");
        assert_eq!(first.sort_order, 0);
        let second = uc
            .upload_photo(&owner, report.id, jpeg("b.jpg"), PhotoMeta::default())
            .await
            .unwrap();
        assert_eq!(second.sort_order, 1);
        assert_eq!(first.storage_ref, second.storage_ref);

        let (_, bytes) = uc.photo_file(&owner, report.id, first.id).await.unwrap();
        assert_eq!(bytes, JPEG);

        uc.delete_photo(&owner, report.id, first.id).await.unwrap();
        assert_eq!(fx.photos.get(&second.storage_ref).await.unwrap(), JPEG);
    }

    #[tokio::test]
    async fn deleting_a_defect_detaches_its_photos() {
        let (fx, uc, owner, report) = setup().await;
        let d = uc.add_defect(&owner, report.id, defect("Rust", None)).await.unwrap();
        let photo = uc
            .upload_photo(
                &owner,
                report.id,
                jpeg("rust.jpg"),
                PhotoMeta {
                    defect_id: Some(d.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(photo.defect_id, Some(d.id));

        uc.delete_defect(&owner, report.id, d.id).await.unwrap();
        let stored = fx.storage.get_photo(photo.id).await.unwrap().unwrap();
        assert_eq!(stored.defect_id, None);
    }

    #[tokio::test]
    async fn children_cannot_be_reached_through_another_report() {
        let (fx, uc, owner, report) = setup().await;
        let other = ReportUseCase::new(fx.storage.clone(), fx.photos.clone())
            .create(
                &owner,
                NewReport {
                    property_address: "9 Totara Road".to_string(),
                    client_name: "Other".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let d = uc.add_defect(&owner, report.id, defect("Crack", None)).await.unwrap();
        assert!(matches!(
            uc.delete_defect(&owner, other.id, d.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("IMG 0001.JPG", "image/jpeg"), "IMG_0001.JPG");
        assert_eq!(sanitize_filename("", "image/png"), "photo.png");
        assert_eq!(sanitize_filename("..", "image/webp"), "photo.webp");
    }
}
