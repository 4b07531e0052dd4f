//! Relationship graph
//!
//! Declared relationships are resolved against the catalog into edges
//! between resource ids. Every edge orders its source before its target;
//! edges that carry a callback also subscribe the target to the source's
//! events.
//!
//! # Ordering
//!
//! [`RelationshipGraph::topological_order`] uses Kahn's algorithm with a
//! min-heap of ready vertices, so independent resources keep catalog
//! insertion order and the result is deterministic. When vertices are left
//! over a cycle exists; a depth-first walk over the leftovers recovers the
//! actual cycle path for the error message.

use crate::catalog::{Catalog, ResourceId};
use crate::error::{Error, Result};
use declarative::{Event, ResourceRef};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

/// Callback used by `notify` / `subscribe` relationships
pub const REFRESH: &str = "refresh";

/// Which events of the source an edge reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTrigger {
    /// Ordering only
    None,
    /// Any event
    All,
    /// Only events with this name
    Named(String),
}

impl EventTrigger {
    pub fn matches(&self, event_name: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Named(name) => name == event_name,
        }
    }
}

/// A declared relationship between two resource references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub source: ResourceRef,
    pub target: ResourceRef,
    pub event: EventTrigger,
    pub callback: Option<String>,
}

impl Relationship {
    /// `source` is applied before `target`
    pub fn before(source: ResourceRef, target: ResourceRef) -> Self {
        Self {
            source,
            target,
            event: EventTrigger::None,
            callback: None,
        }
    }

    /// `dependent` requires `dependency`
    pub fn require(dependent: ResourceRef, dependency: ResourceRef) -> Self {
        Self::before(dependency, dependent)
    }

    /// `source` is applied first and refreshes `target` when it changes
    pub fn notify(source: ResourceRef, target: ResourceRef) -> Self {
        Self {
            source,
            target,
            event: EventTrigger::All,
            callback: Some(REFRESH.to_string()),
        }
    }

    /// `subscriber` is refreshed when `publisher` changes
    pub fn subscribe(subscriber: ResourceRef, publisher: ResourceRef) -> Self {
        Self::notify(publisher, subscriber)
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_event(mut self, event: EventTrigger) -> Self {
        self.event = event;
        self
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.callback.is_some() { "~>" } else { "->" };
        write!(f, "{} {arrow} {}", self.source, self.target)
    }
}

/// A resolved relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: ResourceId,
    pub target: ResourceId,
    pub event: EventTrigger,
    pub callback: Option<String>,
}

impl Edge {
    /// Plain ordering edge
    pub fn ordering(source: ResourceId, target: ResourceId) -> Self {
        Self {
            source,
            target,
            event: EventTrigger::None,
            callback: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RelationshipGraph {
    vertices: Vec<ResourceId>,
    vertex_set: HashSet<ResourceId>,
    out_edges: HashMap<ResourceId, Vec<Edge>>,
    in_edges: HashMap<ResourceId, Vec<ResourceId>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every catalog relationship into an edge
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let mut graph = Self::new();
        for id in catalog.ids() {
            graph.add_vertex(id);
        }

        for rel in catalog.relationships() {
            let resolve = |reference: &ResourceRef| {
                catalog
                    .find_resource(reference)
                    .ok_or_else(|| Error::UnknownResource {
                        reference: reference.clone(),
                        relationship: rel.to_string(),
                    })
            };
            graph.add_edge(Edge {
                source: resolve(&rel.source)?,
                target: resolve(&rel.target)?,
                event: rel.event.clone(),
                callback: rel.callback.clone(),
            });
        }

        Ok(graph)
    }

    pub fn add_vertex(&mut self, id: ResourceId) {
        if self.vertex_set.insert(id) {
            self.vertices.push(id);
        }
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.add_vertex(edge.source);
        self.add_vertex(edge.target);
        self.in_edges.entry(edge.target).or_default().push(edge.source);
        self.out_edges.entry(edge.source).or_default().push(edge);
    }

    pub fn has_edge(&self, source: ResourceId, target: ResourceId) -> bool {
        self.out_edges
            .get(&source)
            .is_some_and(|edges| edges.iter().any(|e| e.target == target))
    }

    pub fn edges_from(&self, source: ResourceId) -> &[Edge] {
        self.out_edges.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resources that `id` directly depends on
    pub fn dependencies(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut deps = self.in_edges.get(&id).cloned().unwrap_or_default();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Resources that directly depend on `id`
    pub fn dependents(&self, id: ResourceId) -> Vec<ResourceId> {
        let mut deps: Vec<ResourceId> = self.edges_from(id).iter().map(|e| e.target).collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Edges out of `source` whose trigger accepts `event`
    pub fn matching_edges(&self, event: &Event, source: ResourceId) -> Vec<&Edge> {
        self.edges_from(source)
            .iter()
            .filter(|edge| edge.event.matches(&event.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Order vertices so every edge's source precedes its target
    pub fn topological_order(&self, catalog: &Catalog) -> Result<Vec<ResourceId>> {
        let mut in_degree: HashMap<ResourceId, usize> =
            self.vertices.iter().map(|&v| (v, 0)).collect();
        for edges in self.out_edges.values() {
            for edge in edges {
                *in_degree.entry(edge.target).or_default() += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<ResourceId>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&v, _)| Reverse(v))
            .collect();

        let mut order = Vec::with_capacity(self.vertices.len());
        while let Some(Reverse(vertex)) = ready.pop() {
            order.push(vertex);
            for edge in self.edges_from(vertex) {
                if let Some(degree) = in_degree.get_mut(&edge.target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(edge.target));
                    }
                }
            }
        }

        if order.len() < self.vertices.len() {
            let placed: HashSet<ResourceId> = order.iter().copied().collect();
            let cycle = self.find_cycle(&placed);
            return Err(Error::DependencyCycle {
                cycle: cycle
                    .into_iter()
                    .map(|id| catalog.reference(id).to_string())
                    .collect(),
            });
        }

        Ok(order)
    }

    /// Depth-first search over unplaced vertices for a back edge
    ///
    /// Iterative, so arbitrarily long cycles cannot exhaust the stack.
    fn find_cycle(&self, placed: &HashSet<ResourceId>) -> Vec<ResourceId> {
        let mut visited = HashSet::new();
        let mut start: Vec<ResourceId> = self
            .vertices
            .iter()
            .copied()
            .filter(|v| !placed.contains(v))
            .collect();
        start.sort_unstable();

        for root in start {
            if !visited.insert(root) {
                continue;
            }
            // (vertex, index of the next out-edge to follow)
            let mut stack: Vec<(ResourceId, usize)> = vec![(root, 0)];
            let mut on_path: HashSet<ResourceId> = HashSet::from([root]);

            while let Some(frame) = stack.last_mut() {
                let vertex = frame.0;
                let Some(edge) = self.edges_from(vertex).get(frame.1) else {
                    on_path.remove(&vertex);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                let target = edge.target;
                if placed.contains(&target) {
                    continue;
                }
                if on_path.contains(&target) {
                    let pos = stack.iter().position(|&(v, _)| v == target).unwrap_or(0);
                    let mut cycle: Vec<ResourceId> = stack[pos..].iter().map(|&(v, _)| v).collect();
                    cycle.push(target);
                    return cycle;
                }
                if visited.insert(target) {
                    on_path.insert(target);
                    stack.push((target, 0));
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestResource;
    use declarative::EventStatus;

    fn r(title: &str) -> ResourceRef {
        ResourceRef::new("file", title)
    }

    fn catalog_of(titles: &[&str]) -> Catalog {
        let mut catalog = Catalog::new("host");
        for title in titles {
            catalog
                .add_resource(Box::new(TestResource::new("file", title)))
                .unwrap();
        }
        catalog
    }

    fn titles(catalog: &Catalog, order: &[ResourceId]) -> Vec<String> {
        order
            .iter()
            .map(|&id| catalog.reference(id).title)
            .collect()
    }

    #[test]
    fn test_order_respects_edges() {
        let mut catalog = catalog_of(&["c", "b", "a"]);
        catalog.add_relationship(Relationship::before(r("a"), r("b")));
        catalog.add_relationship(Relationship::require(r("c"), r("b")));

        let graph = RelationshipGraph::from_catalog(&catalog).unwrap();
        let order = graph.topological_order(&catalog).unwrap();
        assert_eq!(titles(&catalog, &order), ["a", "b", "c"]);
    }

    #[test]
    fn test_independent_resources_keep_insertion_order() {
        let catalog = catalog_of(&["z", "y", "x"]);
        let graph = RelationshipGraph::from_catalog(&catalog).unwrap();
        let order = graph.topological_order(&catalog).unwrap();
        assert_eq!(titles(&catalog, &order), ["z", "y", "x"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut catalog = catalog_of(&["a", "b", "c", "d"]);
        catalog.add_relationship(Relationship::before(r("a"), r("b")));
        catalog.add_relationship(Relationship::before(r("b"), r("c")));
        catalog.add_relationship(Relationship::before(r("c"), r("b")));

        let graph = RelationshipGraph::from_catalog(&catalog).unwrap();
        match graph.topological_order(&catalog) {
            Err(Error::DependencyCycle { cycle }) => {
                assert_eq!(cycle, ["File[b]", "File[c]", "File[b]"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_long_cycle_is_reported_without_recursion() {
        const LEN: usize = 100_000;
        let mut catalog = Catalog::new("host");
        for i in 0..LEN {
            catalog
                .add_resource(Box::new(TestResource::new("file", &format!("f{i}"))))
                .unwrap();
        }
        for i in 0..LEN {
            let next = (i + 1) % LEN;
            catalog.add_relationship(Relationship::before(r(&format!("f{i}")), r(&format!("f{next}"))));
        }

        let graph = RelationshipGraph::from_catalog(&catalog).unwrap();
        assert_eq!(graph.len(), LEN);
        match graph.topological_order(&catalog) {
            Err(Error::DependencyCycle { cycle }) => {
                assert_eq!(cycle.len(), LEN + 1);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected cycle, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_unknown_resource_in_relationship() {
        let mut catalog = catalog_of(&["a"]);
        catalog.add_relationship(Relationship::notify(r("a"), r("missing")));

        let err = RelationshipGraph::from_catalog(&catalog).unwrap_err();
        assert!(matches!(err, Error::UnknownResource { .. }));
    }

    #[test]
    fn test_matching_edges_by_trigger() {
        let mut catalog = catalog_of(&["src", "all", "named", "order"]);
        catalog.add_relationship(Relationship::notify(r("src"), r("all")));
        catalog.add_relationship(
            Relationship::notify(r("src"), r("named"))
                .with_event(EventTrigger::Named("restarted".into())),
        );
        catalog.add_relationship(Relationship::before(r("src"), r("order")));

        let graph = RelationshipGraph::from_catalog(&catalog).unwrap();
        let src = catalog.find_resource(&r("src")).unwrap();

        let changed = Event::new(r("src"), "file_changed", EventStatus::Success);
        let targets: Vec<_> = graph
            .matching_edges(&changed, src)
            .iter()
            .map(|e| catalog.reference(e.target).title)
            .collect();
        assert_eq!(targets, ["all"]);

        let restarted = Event::new(r("src"), "restarted", EventStatus::Success);
        assert_eq!(graph.matching_edges(&restarted, src).len(), 2);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let mut catalog = catalog_of(&["a", "b", "c"]);
        catalog.add_relationship(Relationship::before(r("a"), r("c")));
        catalog.add_relationship(Relationship::notify(r("b"), r("c")));
        catalog.add_relationship(Relationship::subscribe(r("c"), r("b")));

        let graph = RelationshipGraph::from_catalog(&catalog).unwrap();
        let id = |t: &str| catalog.find_resource(&r(t)).unwrap();

        assert_eq!(graph.dependencies(id("c")), [id("a"), id("b")]);
        assert_eq!(graph.dependents(id("b")), [id("c")]);
        assert!(graph.has_edge(id("a"), id("c")));
        assert!(!graph.has_edge(id("c"), id("a")));
    }
}
