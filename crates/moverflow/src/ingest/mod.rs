//! Daily-mover ingestion with same-day deduplication.

pub mod batch;
pub mod ingestor;

pub use batch::{MoverBatch, MoverCandidate, MoverType, ScraperError, ValidCandidate};
pub use ingestor::{IngestConfig, IngestionReport, Ingestor};
