// Bill ingestion pipeline
pub mod ingestion;

// Queries, aggregates and lifecycle
pub mod bills;

pub use bills::BillService;
pub use ingestion::IngestionService;
