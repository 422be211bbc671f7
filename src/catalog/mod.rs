// Read-only view of the show/episode catalog fed by the metadata import pipeline
pub mod models;
pub mod repository;

pub use models::{Episode, Show};
pub use repository::{CatalogRepository, InMemoryCatalogRepository};
