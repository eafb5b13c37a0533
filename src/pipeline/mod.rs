// Country-fact pipeline: ingestion, refinement, storage and export

pub mod export;
pub mod ingestion;
pub mod processing;
pub mod refine;
pub mod storage;

pub use refine::{BatchReport, RefinedCountry, Refiner};
