//! In-memory knowledge graph for one campaign.
//!
//! A directed labeled graph holding every narrative entity a campaign has
//! accumulated and the relationships between them. The graph is the context
//! source for every generator prompt, so all queries and the prompt
//! rendering are deterministic: node and edge iteration follow insertion
//! order.
//!
//! Representation is a plain adjacency map: node map + out-edge lists +
//! in-edge index, with at most one edge per (source, target, type).
//! Persistence lives in the engine crate; this module is pure state.

mod query;
mod render;
mod types;

pub use query::{
    CharacterKnowledge, FactionInfo, FactionMember, FactionRelation, FactionStatus, GraphStats,
    LocationContext,
};
pub use render::{NO_CONTEXT, NO_ENTITIES, NO_SECTIONS};
pub use types::{
    Direction, GraphEdge, GraphError, GraphNode, NeighborNode, NodeType, Properties,
    TraversedEdge,
};

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub use types::EdgeType;

use crate::ids::CampaignId;

/// Serialized form of a whole graph, used for export and round-tripping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub campaign_id: Option<CampaignId>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// The in-memory knowledge graph. Scoped to a single campaign; loading a
/// different campaign clears all state.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    campaign_id: Option<CampaignId>,
    nodes: HashMap<String, GraphNode>,
    /// Node ids in insertion order
    order: Vec<String>,
    /// Outgoing edges per source, in insertion order
    out_edges: HashMap<String, Vec<GraphEdge>>,
    /// Sources pointing at each target, in insertion order
    in_edges: HashMap<String, Vec<String>>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn campaign_id(&self) -> Option<CampaignId> {
        self.campaign_id
    }

    pub fn set_campaign_id(&mut self, campaign_id: CampaignId) {
        self.campaign_id = Some(campaign_id);
    }

    /// Drop all nodes, edges, and the campaign binding.
    pub fn clear(&mut self) {
        self.campaign_id = None;
        self.nodes.clear();
        self.order.clear();
        self.out_edges.clear();
        self.in_edges.clear();
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out_edges.values().map(Vec::len).sum()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Add an entity node. Idempotent on id: a second call replaces the
    /// node's data but keeps its position and edges. Importance is clamped
    /// to 1..=10.
    pub fn add_entity(
        &mut self,
        node_id: impl Into<String>,
        node_type: NodeType,
        name: impl Into<String>,
        description: Option<String>,
        properties: Option<Properties>,
        importance: i32,
    ) -> &GraphNode {
        let node_id = node_id.into();
        let now = Utc::now();
        if !self.nodes.contains_key(&node_id) {
            self.order.push(node_id.clone());
        }
        let node = GraphNode {
            id: node_id.clone(),
            node_type,
            name: name.into(),
            description: description.unwrap_or_default(),
            properties: properties.unwrap_or_default(),
            importance: importance.clamp(1, 10),
            created_at: now,
            updated_at: now,
        };
        self.nodes.insert(node_id.clone(), node);
        self.nodes
            .get(&node_id)
            .unwrap_or_else(|| unreachable!("node inserted above"))
    }

    /// Partially update a node. Properties merge shallowly; the timestamp is
    /// bumped. Returns the updated node, or `None` when absent.
    pub fn update_entity(
        &mut self,
        node_id: &str,
        name: Option<String>,
        description: Option<String>,
        properties: Option<Properties>,
        importance: Option<i32>,
    ) -> Option<GraphNode> {
        let node = self.nodes.get_mut(node_id)?;
        if let Some(name) = name {
            node.name = name;
        }
        if let Some(description) = description {
            node.description = description;
        }
        if let Some(properties) = properties {
            for (key, value) in properties {
                node.properties.insert(key, value);
            }
        }
        if let Some(importance) = importance {
            node.importance = importance.clamp(1, 10);
        }
        node.updated_at = Utc::now();
        Some(node.clone())
    }

    /// Remove a node and every edge that touches it.
    pub fn remove_entity(&mut self, node_id: &str) -> bool {
        if self.nodes.remove(node_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != node_id);

        // Outgoing edges: unlink this node from each target's in-index.
        if let Some(edges) = self.out_edges.remove(node_id) {
            for edge in edges {
                if let Some(sources) = self.in_edges.get_mut(&edge.target) {
                    sources.retain(|source| source != node_id);
                }
            }
        }

        // Incoming edges: drop every edge pointing at this node.
        if let Some(sources) = self.in_edges.remove(node_id) {
            let unique: HashSet<String> = sources.into_iter().collect();
            for source in unique {
                if let Some(edges) = self.out_edges.get_mut(&source) {
                    edges.retain(|edge| edge.target != node_id);
                }
            }
        }
        true
    }

    /// Add a relationship edge. Both endpoints must exist. An existing edge
    /// of the same (source, target, type) is replaced.
    pub fn add_relationship(
        &mut self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
        properties: Option<Properties>,
    ) -> Result<GraphEdge, GraphError> {
        if !self.nodes.contains_key(source) {
            return Err(GraphError::MissingEndpoint(source.to_string()));
        }
        if !self.nodes.contains_key(target) {
            return Err(GraphError::MissingEndpoint(target.to_string()));
        }

        let edge = GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            edge_type,
            properties: properties.unwrap_or_default(),
            created_at: Utc::now(),
            is_active: true,
        };

        let edges = self.out_edges.entry(source.to_string()).or_default();
        if let Some(existing) = edges
            .iter_mut()
            .find(|e| e.target == target && e.edge_type == edge_type)
        {
            *existing = edge.clone();
        } else {
            edges.push(edge.clone());
            self.in_edges
                .entry(target.to_string())
                .or_default()
                .push(source.to_string());
        }
        Ok(edge)
    }

    /// Remove the edge of a given type between two nodes, or every edge
    /// between them when `edge_type` is `None`.
    pub fn remove_relationship(
        &mut self,
        source: &str,
        target: &str,
        edge_type: Option<EdgeType>,
    ) -> bool {
        let Some(edges) = self.out_edges.get_mut(source) else {
            return false;
        };
        let before = edges.len();
        edges.retain(|edge| {
            !(edge.target == target && edge_type.map_or(true, |t| edge.edge_type == t))
        });
        let removed = before - edges.len();
        if removed == 0 {
            return false;
        }
        let remaining = edges.iter().filter(|e| e.target == target).count();
        if let Some(sources) = self.in_edges.get_mut(target) {
            // Drop one in-index entry per removed edge, keeping one per survivor.
            let mut kept = 0usize;
            let allowed = remaining;
            sources.retain(|s| {
                if s == source {
                    kept += 1;
                    kept <= allowed
                } else {
                    true
                }
            });
        }
        true
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn get_entity(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    /// All nodes of one type, in insertion order.
    pub fn get_nodes_by_type(&self, node_type: NodeType) -> Vec<&GraphNode> {
        self.iter_nodes()
            .filter(|node| node.node_type == node_type)
            .collect()
    }

    /// All nodes in insertion order.
    pub(crate) fn iter_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub(crate) fn outgoing(&self, node_id: &str) -> &[GraphEdge] {
        self.out_edges.get(node_id).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn incoming_sources(&self, node_id: &str) -> &[String] {
        self.in_edges.get(node_id).map_or(&[], Vec::as_slice)
    }

    /// The edge of a given type between two nodes, if present.
    pub fn get_edge(&self, source: &str, target: &str, edge_type: EdgeType) -> Option<&GraphEdge> {
        self.outgoing(source)
            .iter()
            .find(|edge| edge.target == target && edge.edge_type == edge_type)
    }

    /// Every edge, grouped by source in node insertion order.
    pub fn all_edges(&self) -> Vec<&GraphEdge> {
        self.order
            .iter()
            .flat_map(|id| self.outgoing(id).iter())
            .collect()
    }

    // =========================================================================
    // Snapshot / serialization
    // =========================================================================

    /// Cheap state snapshot for unit-of-work rollback.
    pub fn snapshot(&self) -> KnowledgeGraph {
        self.clone()
    }

    /// Export the graph for persistence or transfer.
    pub fn serialize(&self) -> GraphExport {
        GraphExport {
            campaign_id: self.campaign_id,
            nodes: self.iter_nodes().cloned().collect(),
            edges: self.all_edges().into_iter().cloned().collect(),
        }
    }

    /// Rebuild a graph from an export. Node and edge timestamps are
    /// preserved; the result is isomorphic to the exported graph.
    pub fn deserialize(export: GraphExport) -> Self {
        let mut graph = Self::new();
        graph.campaign_id = export.campaign_id;
        for node in export.nodes {
            graph.order.push(node.id.clone());
            graph.nodes.insert(node.id.clone(), node);
        }
        for edge in export.edges {
            if !graph.nodes.contains_key(&edge.source) || !graph.nodes.contains_key(&edge.target) {
                continue;
            }
            graph
                .in_edges
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
            graph.out_edges.entry(edge.source.clone()).or_default().push(edge);
        }
        graph
    }

    /// Insert a node preserving its stored timestamps (hydration path).
    pub fn insert_node(&mut self, node: GraphNode) {
        if !self.nodes.contains_key(&node.id) {
            self.order.push(node.id.clone());
        }
        let mut node = node;
        node.importance = node.importance.clamp(1, 10);
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge preserving its stored metadata (hydration path).
    /// Endpoints must already be present.
    pub fn insert_edge(&mut self, edge: GraphEdge) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(GraphError::MissingEndpoint(edge.source));
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(GraphError::MissingEndpoint(edge.target));
        }
        let edges = self.out_edges.entry(edge.source.clone()).or_default();
        if let Some(existing) = edges
            .iter_mut()
            .find(|e| e.target == edge.target && e.edge_type == edge.edge_type)
        {
            *existing = edge;
        } else {
            self.in_edges
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
            edges.push(edge);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(names: &[(&str, NodeType, &str)]) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for (id, node_type, name) in names {
            graph.add_entity(*id, *node_type, *name, None, None, 5);
        }
        graph
    }

    #[test]
    fn add_entity_clamps_importance() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("n1", NodeType::Lore, "Prophecy", None, None, 99);
        assert_eq!(graph.get_entity("n1").expect("node").importance, 10);
        graph.add_entity("n2", NodeType::Lore, "Rumor", None, None, -4);
        assert_eq!(graph.get_entity("n2").expect("node").importance, 1);
    }

    #[test]
    fn add_entity_is_idempotent_on_id() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("n1", NodeType::Character, "Alice", None, None, 5);
        graph.add_entity("n1", NodeType::Character, "Alice the Bold", None, None, 7);
        assert_eq!(graph.node_count(), 1);
        let node = graph.get_entity("n1").expect("node");
        assert_eq!(node.name, "Alice the Bold");
        assert_eq!(node.importance, 7);
    }

    #[test]
    fn update_entity_merges_properties_shallowly() {
        let mut graph = KnowledgeGraph::new();
        let mut props = Properties::new();
        props.insert("role".into(), serde_json::json!("innkeeper"));
        graph.add_entity("n1", NodeType::Character, "Greta", None, Some(props), 5);

        let mut update = Properties::new();
        update.insert("mood".into(), serde_json::json!("cheerful"));
        let node = graph
            .update_entity("n1", None, Some("Runs the inn".into()), Some(update), None)
            .expect("updated");
        assert_eq!(node.description, "Runs the inn");
        assert_eq!(node.properties["role"], serde_json::json!("innkeeper"));
        assert_eq!(node.properties["mood"], serde_json::json!("cheerful"));
    }

    #[test]
    fn update_missing_entity_returns_none() {
        let mut graph = KnowledgeGraph::new();
        assert!(graph.update_entity("ghost", None, None, None, None).is_none());
    }

    #[test]
    fn relationship_requires_both_endpoints() {
        let mut graph = graph_with(&[("a", NodeType::Character, "Alice")]);
        let err = graph
            .add_relationship("a", "missing", EdgeType::Knows, None)
            .expect_err("missing endpoint");
        assert_eq!(err, GraphError::MissingEndpoint("missing".to_string()));
    }

    #[test]
    fn duplicate_relationship_replaces() {
        let mut graph = graph_with(&[
            ("a", NodeType::Character, "Alice"),
            ("b", NodeType::Character, "Bob"),
        ]);
        let mut props = Properties::new();
        props.insert("sentiment".into(), serde_json::json!("friendly"));
        graph
            .add_relationship("a", "b", EdgeType::Knows, None)
            .expect("add");
        graph
            .add_relationship("a", "b", EdgeType::Knows, Some(props))
            .expect("replace");
        assert_eq!(graph.edge_count(), 1);
        let edge = graph.get_edge("a", "b", EdgeType::Knows).expect("edge");
        assert_eq!(edge.properties["sentiment"], serde_json::json!("friendly"));
    }

    #[test]
    fn distinct_edge_types_coexist() {
        let mut graph = graph_with(&[
            ("a", NodeType::Character, "Alice"),
            ("b", NodeType::Faction, "Guild"),
        ]);
        graph.add_relationship("a", "b", EdgeType::MemberOf, None).expect("add");
        graph.add_relationship("a", "b", EdgeType::AlliedWith, None).expect("add");
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn remove_entity_drops_incident_edges() {
        let mut graph = graph_with(&[
            ("a", NodeType::Character, "Alice"),
            ("inn", NodeType::Location, "Inn"),
            ("sword", NodeType::Item, "Sword"),
        ]);
        graph.add_relationship("a", "inn", EdgeType::LocatedIn, None).expect("add");
        graph.add_relationship("sword", "a", EdgeType::Owns, None).expect("add");
        assert!(graph.remove_entity("a"));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.incoming_sources("inn").is_empty());
    }

    #[test]
    fn remove_relationship_specific_type() {
        let mut graph = graph_with(&[
            ("a", NodeType::Character, "Alice"),
            ("b", NodeType::Faction, "Guild"),
        ]);
        graph.add_relationship("a", "b", EdgeType::MemberOf, None).expect("add");
        graph.add_relationship("a", "b", EdgeType::AlliedWith, None).expect("add");
        assert!(graph.remove_relationship("a", "b", Some(EdgeType::MemberOf)));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.get_edge("a", "b", EdgeType::AlliedWith).is_some());
    }

    #[test]
    fn remove_relationship_all_types() {
        let mut graph = graph_with(&[
            ("a", NodeType::Character, "Alice"),
            ("b", NodeType::Faction, "Guild"),
        ]);
        graph.add_relationship("a", "b", EdgeType::MemberOf, None).expect("add");
        graph.add_relationship("a", "b", EdgeType::AlliedWith, None).expect("add");
        assert!(graph.remove_relationship("a", "b", None));
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.remove_relationship("a", "b", None));
    }

    #[test]
    fn serialize_deserialize_is_isomorphic() {
        let mut graph = graph_with(&[
            ("n1", NodeType::Character, "Alice"),
            ("n2", NodeType::Location, "Inn"),
            ("n3", NodeType::Item, "Sword"),
        ]);
        graph.add_relationship("n1", "n2", EdgeType::LocatedIn, None).expect("add");
        graph.add_relationship("n1", "n3", EdgeType::Owns, None).expect("add");

        let restored = KnowledgeGraph::deserialize(graph.serialize());
        assert_eq!(restored.node_count(), 3);
        assert_eq!(restored.edge_count(), 2);
        assert_eq!(restored.get_entity("n1").expect("node").name, "Alice");
        assert!(restored.get_edge("n1", "n2", EdgeType::LocatedIn).is_some());
        assert!(restored.get_edge("n1", "n3", EdgeType::Owns).is_some());

        // Queries behave identically on the restored graph.
        let found = restored.search("alice", None, 20);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "n1");

        let neighbors: Vec<String> = restored
            .get_neighbors("n1", None, Direction::Both, 1)
            .into_iter()
            .map(|n| n.node.id)
            .collect();
        assert_eq!(neighbors, vec!["n2".to_string(), "n3".to_string()]);

        let path: Vec<String> = restored
            .query_path("n2", "n3")
            .expect("path")
            .into_iter()
            .map(|node| node.id)
            .collect();
        assert_eq!(path, vec!["n2".to_string(), "n1".to_string(), "n3".to_string()]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut graph = graph_with(&[("n1", NodeType::Character, "Alice")]);
        graph.set_campaign_id(CampaignId::new());
        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.campaign_id().is_none());
    }
}
