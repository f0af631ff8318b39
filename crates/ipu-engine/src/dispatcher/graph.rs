//! Producer/consumer dependency graph of one phase

use crate::actor::ActorDescriptor;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Edges point from producer to consumer; nodes are indices into the actor
/// slice the graph was built from.
#[derive(Debug)]
pub(crate) struct DependencyGraph<'a> {
    actors: &'a [Arc<ActorDescriptor>],
    inner: DiGraphMap<usize, ()>,
}

impl<'a> DependencyGraph<'a> {
    /// An actor that produces and consumes the same type gets no self edge.
    pub(crate) fn build(actors: &'a [Arc<ActorDescriptor>]) -> Self {
        let mut inner = DiGraphMap::new();
        for i in 0..actors.len() {
            inner.add_node(i);
        }
        for (i, producer) in actors.iter().enumerate() {
            for (j, consumer) in actors.iter().enumerate() {
                if i != j && producer.feeds(consumer) {
                    inner.add_edge(i, j, ());
                }
            }
        }
        Self { actors, inner }
    }

    /// Topological order, ties broken by lexical actor name
    ///
    /// On a cycle, returns the lexically sorted members of the cycle whose
    /// smallest member name sorts first.
    pub(crate) fn ordered(&self) -> Result<Vec<usize>, Vec<String>> {
        if is_cyclic_directed(&self.inner) {
            return Err(self.cycle_members());
        }

        let mut in_degree: Vec<usize> = (0..self.actors.len())
            .map(|n| {
                self.inner
                    .neighbors_directed(n, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(&str, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| Reverse((self.actors[n].name(), n)))
            .collect();

        let mut order = Vec::with_capacity(self.actors.len());
        while let Some(Reverse((_, n))) = ready.pop() {
            order.push(n);
            for next in self.inner.neighbors_directed(n, Direction::Outgoing) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((self.actors[next].name(), next)));
                }
            }
        }
        Ok(order)
    }

    fn cycle_members(&self) -> Vec<String> {
        let mut components: Vec<Vec<String>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|c| {
                let mut names: Vec<String> =
                    c.iter().map(|n| self.actors[*n].name().to_string()).collect();
                names.sort();
                names
            })
            .collect();
        components.sort();
        components.into_iter().next().unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }
}
