pub mod bills;
pub mod health;

use crate::{
    auth::HandoffTokenIssuer,
    config::AppConfig,
    db::DbPool,
    services::{BillService, IngestionService},
    storage::StorageGateway,
    workflow::ExtractionWorkflow,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub ingestion: Arc<IngestionService>,
    pub bills: Arc<BillService>,
}

impl AppServices {
    /// Wires the services over already-constructed provider clients.
    pub fn new(
        db_pool: Arc<DbPool>,
        storage: StorageGateway,
        issuer: Arc<HandoffTokenIssuer>,
        workflow: Arc<dyn ExtractionWorkflow>,
        config: &AppConfig,
    ) -> Self {
        let ingestion = Arc::new(IngestionService::new(
            db_pool.clone(),
            storage.clone(),
            issuer,
            workflow,
        ));
        let bills = Arc::new(BillService::new(
            db_pool,
            storage,
            config.default_list_limit,
            config.default_stats_period_days,
        ));

        Self { ingestion, bills }
    }
}
