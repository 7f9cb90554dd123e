pub mod entities;
pub mod state;
pub mod utils;

pub use utils::errors::StateError;
