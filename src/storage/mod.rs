pub mod in_memory;
pub mod sqlite;
mod traits;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::Storage;

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::domain::{Report, ReportBundle};
use crate::error::Result;

/// Opens the configured SQLite database, migrations included.
pub fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage = if config.is_in_memory() {
        SqliteStorage::open_in_memory()?
    } else {
        SqliteStorage::open(&config.path)?
    };
    Ok(Arc::new(storage))
}

/// Loads every child of `report` into a bundle.
pub async fn load_bundle(storage: &dyn Storage, report: Report) -> Result<ReportBundle> {
    let id = report.id;
    Ok(ReportBundle {
        roof_elements: storage.list_roof_elements(id).await?,
        defects: storage.list_defects(id).await?,
        photos: storage.list_photos(id).await?,
        compliance: storage.get_compliance(id).await?,
        report,
    })
}

/// Parses the sequence part of `RPT-<year>-<seq>` for the given year.
pub(crate) fn report_sequence(report_number: &str, year: i32) -> Option<u32> {
    let prefix = format!("{}-{}-", crate::constants::REPORT_NUMBER_PREFIX, year);
    report_number.strip_prefix(&prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::report_sequence;

    #[test]
    fn report_sequence_only_matches_same_year() {
        assert_eq!(report_sequence("RPT-2026-0042", 2026), Some(42));
        assert_eq!(report_sequence("RPT-2025-0042", 2026), None);
        assert_eq!(report_sequence("RPT-2026-abc", 2026), None);
    }
}
