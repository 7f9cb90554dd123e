pub mod combiner;
pub mod compute_keys;
pub mod scope;
