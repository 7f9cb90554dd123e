//! Interfaces the computer consumes from the graph store.

pub mod backend;
pub mod scan;
pub mod vertex;

pub use strata_api::core::entities::IdManager;
