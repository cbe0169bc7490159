//! Edge accumulation cache.
//!
//! Contributions are collected per destination while streaming and turned
//! into a [`DiGraph`] in one shot:
//!
//! 1. [`EdgeCache::add`] merges `source → weight` contributions into the
//!    pending map of a destination.
//! 2. [`EdgeCache::flush`] drains the pending map, assigning dense node ids in
//!    first-seen order, and produces the edge list. It can run only once.
//! 3. [`EdgeCache::into_graph`] consumes the cache and builds the graph.
//!
//! ```
//! use sonet::edgecache::{EdgeCache, Weight};
//!
//! let mut ec: EdgeCache<()> = EdgeCache::new();
//! ec.add("me", [("him", Weight::Count(1)), ("her", Weight::Count(3))]).unwrap();
//! ec.add("you", [("him", Weight::Count(3))]).unwrap();
//! ec.flush().unwrap();
//! assert_eq!(ec.nodes().get("you"), Some(3));
//! assert_eq!(ec.edge_count(), 3);
//! ```

use crate::error::EdgeCacheError;
use crate::graph::{DiGraph, Edge};
use rustc_hash::FxHashMap;
use tracing::{error, info};

/// Weight of a pending edge: a plain counter or the ordered list of events
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Weight<E> {
    Count(u64),
    Events(Vec<E>),
}

impl<E> Weight<E> {
    /// Single event payload.
    pub fn event(event: E) -> Self {
        Weight::Events(vec![event])
    }

    /// Summed count, or the number of events.
    pub fn magnitude(&self) -> u64 {
        match self {
            Weight::Count(n) => *n,
            Weight::Events(events) => events.len() as u64,
        }
    }

    pub fn events(&self) -> &[E] {
        match self {
            Weight::Count(_) => &[],
            Weight::Events(events) => events,
        }
    }

    /// `int + int` or `list.extend(list)`. Mixed kinds hand `other` back.
    fn merge(&mut self, other: Self) -> Result<(), Self> {
        match (self, other) {
            (Weight::Count(a), Weight::Count(b)) => {
                *a += b;
                Ok(())
            }
            (Weight::Events(a), Weight::Events(b)) => {
                a.extend(b);
                Ok(())
            }
            (_, other) => Err(other),
        }
    }
}

/// Label → dense id, assigned in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct NodeIndex {
    ids: FxHashMap<String, usize>,
    labels: Vec<String>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `label`, assigning the next free one if unseen.
    pub fn insert(&mut self, label: &str) -> usize {
        if let Some(id) = self.ids.get(label) {
            return *id;
        }
        let id = self.labels.len();
        self.ids.insert(label.to_string(), id);
        self.labels.push(label.to_string());
        id
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn into_labels(self) -> Vec<String> {
        self.labels
    }
}

/// Sources pointing at one destination, in insertion order.
struct Pending<E> {
    sources: Vec<(String, Weight<E>)>,
    index: FxHashMap<String, usize>,
}

impl<E> Pending<E> {
    fn new() -> Self {
        Self {
            sources: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    fn merge(&mut self, destination: &str, source: String, weight: Weight<E>) -> Result<(), EdgeCacheError> {
        match self.index.get(&source) {
            Some(&pos) => self.sources[pos].1.merge(weight).map_err(|_| {
                EdgeCacheError::MixedWeights {
                    sender: source,
                    destination: destination.to_string(),
                }
            }),
            None => {
                self.index.insert(source.clone(), self.sources.len());
                self.sources.push((source, weight));
                Ok(())
            }
        }
    }
}

pub struct EdgeCache<E> {
    pending: Vec<(String, Pending<E>)>,
    destinations: FxHashMap<String, usize>,
    nodes: NodeIndex,
    edges: Vec<Edge<Weight<E>>>,
    flushed: bool,
}

impl<E> Default for EdgeCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EdgeCache<E> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            destinations: FxHashMap::default(),
            nodes: NodeIndex::new(),
            edges: Vec::new(),
            flushed: false,
        }
    }

    /// Merges `contributions` (source label → weight) into the pending edges
    /// of `destination`.
    pub fn add<I, S>(&mut self, destination: &str, contributions: I) -> Result<(), EdgeCacheError>
    where
        I: IntoIterator<Item = (S, Weight<E>)>,
        S: Into<String>,
    {
        if self.flushed {
            return Err(EdgeCacheError::AddAfterFlush {
                destination: destination.to_string(),
            });
        }

        let pos = match self.destinations.get(destination) {
            Some(&pos) => pos,
            None => {
                let pos = self.pending.len();
                self.destinations.insert(destination.to_string(), pos);
                self.pending.push((destination.to_string(), Pending::new()));
                pos
            }
        };

        let pending = &mut self.pending[pos].1;
        for (source, weight) in contributions {
            pending.merge(destination, source.into(), weight)?;
        }
        Ok(())
    }

    /// Number of destinations with pending contributions.
    pub fn pending_destinations(&self) -> usize {
        self.pending.len()
    }

    /// Number of (source, destination) pairs waiting for a flush.
    pub fn pending_edges(&self) -> usize {
        self.pending.iter().map(|(_, p)| p.sources.len()).sum()
    }

    /// Drains every pending contribution into the edge list.
    ///
    /// Each destination must have received all its contributions before this
    /// call: the cache refuses any later [`EdgeCache::add`].
    pub fn flush(&mut self) -> Result<(), EdgeCacheError> {
        if self.flushed {
            return Err(EdgeCacheError::AlreadyFlushed);
        }
        self.flushed = true;

        // Counted before draining.
        let expected = self.destinations.len();
        let expected_edges = self.pending_edges();
        let edges_before = self.edges.len();
        info!(destinations = expected, edges = expected_edges, "Flushing pending edges");

        let mut flushed = 0usize;
        for (destination, pending) in self.pending.drain(..) {
            if self.destinations.remove(&destination).is_none() {
                continue;
            }
            let target = self.nodes.insert(&destination);
            for (source, weight) in pending.sources {
                let source = self.nodes.insert(&source);
                self.edges.push(Edge {
                    source,
                    target,
                    weight,
                });
            }
            flushed += 1;
        }

        let remaining = self.destinations.len();
        let edges_flushed = self.edges.len() - edges_before;
        self.destinations.clear();
        if flushed != expected || remaining != 0 || edges_flushed != expected_edges {
            error!(flushed, remaining, edges_flushed, "Not all the edges have been flushed");
            return Err(EdgeCacheError::CountMismatch { flushed, remaining });
        }

        info!(flushed, edges = self.edges.len(), nodes = self.nodes.len(), "Flushed edges");
        Ok(())
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn nodes(&self) -> &NodeIndex {
        &self.nodes
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Builds the graph: one vertex per node id, one edge per flushed
    /// (source, destination) pair. The cache is consumed.
    pub fn into_graph(
        self,
        vertex_label: &str,
        edge_label: &str,
    ) -> Result<DiGraph<Weight<E>>, EdgeCacheError> {
        if !self.flushed {
            return Err(EdgeCacheError::NotFlushed);
        }
        Ok(DiGraph::new(
            vertex_label,
            edge_label,
            self.nodes.into_labels(),
            self.edges,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts<'a>(pairs: &[(&'a str, u64)]) -> Vec<(&'a str, Weight<()>)> {
        pairs.iter().map(|(s, n)| (*s, Weight::Count(*n))).collect()
    }

    fn weight_of(ec: &EdgeCache<()>, source: &str, target: &str) -> Option<u64> {
        let s = ec.nodes.get(source)?;
        let t = ec.nodes.get(target)?;
        ec.edges
            .iter()
            .find(|e| e.source == s && e.target == t)
            .map(|e| e.weight.magnitude())
    }

    #[test]
    fn flush_assigns_ids_in_first_seen_order() {
        let mut ec = EdgeCache::new();
        ec.add("me", counts(&[("him", 1), ("her", 3)])).unwrap();
        ec.add("you", counts(&[("him", 3)])).unwrap();
        ec.flush().unwrap();

        assert_eq!(ec.nodes.get("me"), Some(0));
        assert_eq!(ec.nodes.get("him"), Some(1));
        assert_eq!(ec.nodes.get("her"), Some(2));
        assert_eq!(ec.nodes.get("you"), Some(3));

        let mut triples: Vec<_> = ec
            .edges
            .iter()
            .map(|e| (e.source, e.target, e.weight.magnitude()))
            .collect();
        triples.sort();
        assert_eq!(triples, vec![(1, 0, 1), (1, 3, 3), (2, 0, 3)]);
    }

    #[test]
    fn merge_is_order_independent() {
        let mut forward = EdgeCache::new();
        forward.add("d", counts(&[("a", 2)])).unwrap();
        forward.add("d", counts(&[("a", 3)])).unwrap();
        forward.flush().unwrap();

        let mut backward = EdgeCache::new();
        backward.add("d", counts(&[("a", 3)])).unwrap();
        backward.add("d", counts(&[("a", 2)])).unwrap();
        backward.flush().unwrap();

        assert_eq!(weight_of(&forward, "a", "d"), Some(5));
        assert_eq!(weight_of(&backward, "a", "d"), Some(5));
        assert_eq!(forward.edge_count(), 1);
    }

    #[test]
    fn new_sources_are_added_verbatim() {
        let mut ec = EdgeCache::new();
        ec.add("d", counts(&[("a", 1)])).unwrap();
        ec.add("d", counts(&[("b", 4), ("a", 1)])).unwrap();
        assert_eq!(ec.pending_destinations(), 1);
        assert_eq!(ec.pending_edges(), 2);
        ec.flush().unwrap();
        assert_eq!(weight_of(&ec, "a", "d"), Some(2));
        assert_eq!(weight_of(&ec, "b", "d"), Some(4));
    }

    #[test]
    fn event_lists_are_extended_in_order() {
        let mut ec: EdgeCache<u32> = EdgeCache::new();
        ec.add("d", [("a", Weight::event(1))]).unwrap();
        ec.add("d", [("a", Weight::Events(vec![2, 3]))]).unwrap();
        ec.flush().unwrap();
        let graph = ec.into_graph("username", "timestamp").unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[0].weight.events(), &[1, 2, 3]);
    }

    #[test]
    fn mixed_weights_are_rejected() {
        let mut ec: EdgeCache<u32> = EdgeCache::new();
        ec.add("d", [("a", Weight::Count(1))]).unwrap();
        let err = ec.add("d", [("a", Weight::event(7))]).unwrap_err();
        assert_eq!(
            err,
            EdgeCacheError::MixedWeights {
                sender: "a".to_string(),
                destination: "d".to_string()
            }
        );
    }

    #[test]
    fn add_after_flush_is_rejected() {
        let mut ec = EdgeCache::new();
        ec.add("d", counts(&[("a", 1)])).unwrap();
        ec.flush().unwrap();
        assert!(matches!(
            ec.add("d", counts(&[("a", 1)])),
            Err(EdgeCacheError::AddAfterFlush { .. })
        ));
        assert_eq!(ec.flush(), Err(EdgeCacheError::AlreadyFlushed));
    }

    #[test]
    fn graph_requires_flush() {
        let mut ec = EdgeCache::new();
        ec.add("d", counts(&[("a", 1)])).unwrap();
        assert!(matches!(
            ec.into_graph("username", "weight"),
            Err(EdgeCacheError::NotFlushed)
        ));
    }

    #[test]
    fn unflushed_destination_is_a_count_mismatch() {
        let mut ec = EdgeCache::new();
        ec.add("d", counts(&[("a", 1)])).unwrap();
        ec.destinations.insert("ghost".to_string(), 1);
        assert_eq!(
            ec.flush(),
            Err(EdgeCacheError::CountMismatch {
                flushed: 1,
                remaining: 1
            })
        );
    }

    #[test]
    fn ids_are_dense_for_many_labels() {
        let mut ec: EdgeCache<()> = EdgeCache::new();
        for i in 0..50 {
            let dest = format!("d{}", i % 7);
            let src = format!("s{}", i % 11);
            ec.add(&dest, [(src, Weight::Count(1))]).unwrap();
        }
        ec.flush().unwrap();
        let n = ec.nodes.len();
        assert_eq!(n, 18);
        let mut ids: Vec<_> = (0..n)
            .map(|id| ec.nodes.get(ec.nodes.label(id).unwrap()).unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn self_loops_are_kept() {
        let mut ec = EdgeCache::new();
        ec.add("a", counts(&[("a", 2)])).unwrap();
        ec.flush().unwrap();
        let graph = ec.into_graph("username", "weight").unwrap();
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.self_loops(), 1);
    }

    #[test]
    fn node_index_is_stable() {
        let mut idx = NodeIndex::new();
        assert_eq!(idx.insert("x"), 0);
        assert_eq!(idx.insert("y"), 1);
        assert_eq!(idx.insert("x"), 0);
        assert_eq!(idx.label(1), Some("y"));
        assert_eq!(idx.len(), 2);
    }
}
