//! The weighted relation graph over lesson ids.
//!
//! No general-purpose graph crate is pulled in: the relation graph is a
//! small adjacency-list structure with an iterative power-method PageRank
//! and a union-find pass for connected components — the two query shapes
//! the store actually needs (centrality for ranking, clusters for the
//! curator's duplicate census). This keeps the dependency stack aligned
//! with the teacher rather than introducing a new graph dependency for a
//! capability we can hand-roll in well under a hundred lines.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One directed, weighted edge between two lessons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub to: Uuid,
    pub weight: f64,
    pub link_type: LinkType,
}

/// The two link kinds the store distinguishes: `Related` for ordinary
/// overlap, `Similar` for heavily-overlapping pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Related,
    Similar,
    Llm,
}

/// Directed multigraph over lesson ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationGraph {
    nodes: Vec<Uuid>,
    edges: HashMap<Uuid, Vec<Edge>>,
}

impl RelationGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: Uuid) {
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
        self.edges.entry(id).or_default();
    }

    /// Add a directed edge `from -> to`. Persisted only by callers that
    /// already clipped `weight` to `[0,1]` and checked the `>= 0.3`
    /// persistence threshold — the graph itself does not re-derive
    /// that policy, it just stores what it is given.
    pub fn add_link(&mut self, from: Uuid, to: Uuid, weight: f64, link_type: LinkType) {
        self.add_node(from);
        self.add_node(to);
        self.edges.entry(from).or_default().push(Edge { to, weight, link_type });
    }

    #[must_use]
    pub fn outgoing(&self, id: Uuid) -> &[Edge] {
        self.edges.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Neighbors reachable by an outgoing or incoming edge whose weight is
    /// at least `min_weight`, sorted by weight descending, capped at
    /// `limit`.
    #[must_use]
    pub fn related(&self, id: Uuid, min_weight: f64, limit: usize) -> Vec<(Uuid, f64)> {
        let mut found: Vec<(Uuid, f64)> = self
            .outgoing(id)
            .iter()
            .filter(|e| e.weight >= min_weight)
            .map(|e| (e.to, e.weight))
            .collect();

        for (&from, edges) in &self.edges {
            for e in edges {
                if e.to == id && e.weight >= min_weight {
                    found.push((from, e.weight));
                }
            }
        }

        found.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        found.dedup_by_key(|(id, _)| *id);
        found.truncate(limit);
        found
    }

    /// Multiply every edge weight by `factor` (curator graph decay).
    pub fn decay_all(&mut self, factor: f64) {
        for edges in self.edges.values_mut() {
            for e in edges {
                e.weight *= factor;
            }
        }
    }

    /// Drop edges whose weight has decayed below `min_weight`.
    pub fn prune_below(&mut self, min_weight: f64) -> usize {
        let mut dropped = 0;
        for edges in self.edges.values_mut() {
            let before = edges.len();
            edges.retain(|e| e.weight >= min_weight);
            dropped += before - edges.len();
        }
        dropped
    }

    /// Iterative power-method PageRank over the directed graph. Dangling
    /// nodes (no outgoing edges) redistribute their mass uniformly, matching
    /// `networkx.pagerank`'s default handling closely enough for a ranking
    /// signal rather than an exact replica.
    #[must_use]
    pub fn pagerank(&self, damping: f64, iterations: u32) -> HashMap<Uuid, f64> {
        let n = self.nodes.len();
        if n == 0 {
            return HashMap::new();
        }
        let base = 1.0 / n as f64;
        let mut scores: HashMap<Uuid, f64> = self.nodes.iter().map(|&id| (id, base)).collect();

        let out_weight: HashMap<Uuid, f64> = self
            .nodes
            .iter()
            .map(|&id| (id, self.outgoing(id).iter().map(|e| e.weight).sum::<f64>()))
            .collect();

        for _ in 0..iterations {
            let dangling_mass: f64 = self
                .nodes
                .iter()
                .filter(|&&id| out_weight.get(&id).copied().unwrap_or(0.0) <= f64::EPSILON)
                .map(|id| scores[id])
                .sum();

            let mut next: HashMap<Uuid, f64> =
                self.nodes.iter().map(|&id| (id, (1.0 - damping) * base)).collect();

            for &id in &self.nodes {
                next.entry(id).and_modify(|v| *v += damping * dangling_mass * base);
            }

            for (&from, edges) in &self.edges {
                let total_w = out_weight.get(&from).copied().unwrap_or(0.0);
                if total_w <= f64::EPSILON {
                    continue;
                }
                let contribution = damping * scores[&from];
                for e in edges {
                    let share = contribution * (e.weight / total_w);
                    *next.entry(e.to).or_insert(0.0) += share;
                }
            }

            scores = next;
        }

        scores
    }

    /// Connected components (treating edges as undirected) via union-find,
    /// used by the curator's duplicate census and by any clustering report.
    #[must_use]
    pub fn clusters(&self) -> Vec<Vec<Uuid>> {
        let mut parent: HashMap<Uuid, Uuid> = self.nodes.iter().map(|&id| (id, id)).collect();

        fn find(parent: &mut HashMap<Uuid, Uuid>, x: Uuid) -> Uuid {
            let p = parent[&x];
            if p == x {
                x
            } else {
                let root = find(parent, p);
                parent.insert(x, root);
                root
            }
        }

        for (&from, edges) in &self.edges {
            for e in edges {
                let ra = find(&mut parent, from);
                let rb = find(&mut parent, e.to);
                if ra != rb {
                    parent.insert(ra, rb);
                }
            }
        }

        let mut groups: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for &id in &self.nodes {
            let root = find(&mut parent, id);
            groups.entry(root).or_default().push(id);
        }
        groups.into_values().collect()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}
