//! Vertex programs and map/reduce jobs that ship with the computer.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::algorithms::connected_components::{ConnectedComponents, COMPONENT};
//! use strata::prelude::*;
//!
//! let graph = InMemoryGraph::new();
//! graph.add_edge(1, 2, "link");
//! graph.add_edge(3, 2, "link");
//! graph.add_edge(4, 5, "link");
//!
//! let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
//! let mut computer = factory.compute();
//! computer
//!     .program(ConnectedComponents::new())
//!     .unwrap()
//!     .result_mode(ResultMode::Persist);
//! computer.submit().unwrap();
//!
//! assert_eq!(graph.property(VID(3), COMPONENT), Some(Prop::U64(1)));
//! assert_eq!(graph.property(VID(5), COMPONENT), Some(Prop::U64(4)));
//! ```

pub mod connected_components;
pub mod degree;
pub mod shortest_distance;
