//! # Strata
//!
//! A bulk synchronous, vertex-centric graph computer that runs over a key-column-value style
//! graph store.
//!
//! A [`VertexProgram`](crate::db::task::program::VertexProgram) is executed for every vertex in a
//! sequence of supersteps. In each superstep a vertex reads the messages sent to it in the
//! superstep before, updates its compute-key values and sends new messages; a global memory
//! carries values shared by all vertices. Once the program terminates, optional
//! [`MapReduce`](crate::db::task::map_reduce::MapReduce) jobs aggregate the per-vertex results and
//! the computed values can be written back to the graph.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::prelude::*;
//! use strata::algorithms::degree::DegreeCounter;
//!
//! let graph = InMemoryGraph::new();
//! graph.add_edge(1, 2, "knows");
//! graph.add_edge(1, 3, "knows");
//!
//! let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
//! let mut computer = factory.compute();
//! computer
//!     .program(DegreeCounter::new(1))
//!     .unwrap()
//!     .result_mode(ResultMode::Persist);
//! computer.submit().unwrap();
//!
//! assert_eq!(graph.property(VID(1), "degree"), Some(Prop::I64(2)));
//! ```

pub mod algorithms;
pub mod config;
pub mod db;
pub mod errors;
pub mod graph;
pub mod prelude;
