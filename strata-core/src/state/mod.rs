pub mod memory;
pub mod partition;
pub mod vertex_memory;
pub mod vertex_state;
