// API module for the dispatch backend
pub mod api;

// Re-export api modules at crate root so internal paths (crate::models,
// crate::routes, ...) resolve identically in the library and the binary.
pub use api::middleware;
pub use api::models;
pub use api::routes;
pub use api::services;
pub use api::storage;
