use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::app::ports::PhotoStore;
use crate::app::{
    ComplaintUseCase, DashboardUseCase, ReportItemsUseCase, ReportUseCase, SyncUseCase,
    UserUseCase,
};
use crate::config::Config;
use crate::storage::Storage;

/// Shared by every request. Use cases are cheap to build per request.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub photos: Arc<dyn PhotoStore>,
    pub config: Arc<Config>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, photos: Arc<dyn PhotoStore>, config: Config) -> Self {
        Self {
            storage,
            photos,
            config: Arc::new(config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn users(&self) -> UserUseCase {
        UserUseCase::new(self.storage.clone())
    }

    pub fn reports(&self) -> ReportUseCase {
        ReportUseCase::new(self.storage.clone(), self.photos.clone())
    }

    pub fn items(&self) -> ReportItemsUseCase {
        ReportItemsUseCase::new(
            self.storage.clone(),
            self.photos.clone(),
            self.config.photos.max_bytes,
        )
    }

    pub fn complaints(&self) -> ComplaintUseCase {
        ComplaintUseCase::new(self.storage.clone())
    }

    pub fn sync(&self) -> SyncUseCase {
        SyncUseCase::new(self.storage.clone())
    }

    pub fn dashboard(&self) -> DashboardUseCase {
        DashboardUseCase::new(self.storage.clone())
    }
}
