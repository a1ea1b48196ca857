//! Restmap Graph
//!
//! Typed declaration nodes and the resolution graph that holds them. Every
//! cross-reference between nodes is an `Arc` to the node already stored in
//! the graph, so a resolved graph never contains a dangling name.

mod graph;
mod nodes;

pub use graph::ResolutionGraph;
pub use nodes::{
  Endpoint, EndpointKind, Method, Output, OutputKind, Param, ResolverKind, ResolverNode, SinkKind,
};
