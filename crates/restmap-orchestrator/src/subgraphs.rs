use std::collections::{BTreeSet, VecDeque};
use std::iter::FusedIterator;

use crate::graph::OrchestrationGraph;

/// Lazy iterator over the independently deployable parts of a graph.
///
/// Seeds are the roots in name order, then every remaining node, so nodes
/// that sit on a cycle still land in a component. Each component is found
/// by a breadth-first walk that follows edges both ways. The iterator ends
/// once every seed is visited and can be rewound with [`Subgraphs::restart`].
pub struct Subgraphs<'g> {
  graph: &'g OrchestrationGraph,
  seeds: Vec<&'g str>,
  cursor: usize,
  visited: BTreeSet<&'g str>,
}

impl<'g> Subgraphs<'g> {
  pub(crate) fn new(graph: &'g OrchestrationGraph) -> Self {
    let roots = graph.roots();
    let rest: Vec<&str> = graph.names().filter(|name| !roots.contains(name)).collect();
    let seeds = roots.into_iter().chain(rest).collect();
    Self {
      graph,
      seeds,
      cursor: 0,
      visited: BTreeSet::new(),
    }
  }

  /// Start over from the first root.
  pub fn restart(&mut self) {
    self.cursor = 0;
    self.visited.clear();
  }

  fn component(&mut self, seed: &'g str) -> BTreeSet<String> {
    let graph = self.graph;
    let mut component = BTreeSet::new();
    let mut queue = VecDeque::from([seed]);
    self.visited.insert(seed);

    while let Some(name) = queue.pop_front() {
      component.insert(name.to_string());
      let neighbours = graph.downstream(name).chain(graph.upstream(name));
      for next in neighbours {
        if self.visited.insert(next) {
          queue.push_back(next);
        }
      }
    }

    component
  }
}

impl Iterator for Subgraphs<'_> {
  type Item = OrchestrationGraph;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(&seed) = self.seeds.get(self.cursor) {
      self.cursor += 1;
      if self.visited.contains(seed) {
        continue;
      }
      let names = self.component(seed);
      return Some(self.graph.induced(&names));
    }
    None
  }
}

impl FusedIterator for Subgraphs<'_> {}
