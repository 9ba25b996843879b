//! Read-side queries over the knowledge graph: traversal, search, paths,
//! timeline, and the composite context views used to build prompts.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::types::{
    Direction, EdgeType, GraphNode, NeighborNode, NodeType, Properties, TraversedEdge,
};
use super::KnowledgeGraph;

/// Composite context around one location (depth-2 neighborhood)
#[derive(Debug, Clone, Serialize)]
pub struct LocationContext {
    pub location: Option<GraphNode>,
    pub characters: Vec<NeighborNode>,
    pub items: Vec<NeighborNode>,
    pub recent_events: Vec<NeighborNode>,
    pub connected_locations: Vec<NeighborNode>,
    pub factions: Vec<NeighborNode>,
}

/// What a character knows: the depth-2 neighborhood bucketed by relation
#[derive(Debug, Clone, Serialize)]
pub struct CharacterKnowledge {
    pub character: Option<GraphNode>,
    pub known_characters: Vec<NeighborNode>,
    pub known_locations: Vec<NeighborNode>,
    pub known_items: Vec<NeighborNode>,
    pub participated_events: Vec<NeighborNode>,
    pub faction_memberships: Vec<NeighborNode>,
}

/// A faction with its member roster
#[derive(Debug, Clone, Serialize)]
pub struct FactionInfo {
    pub node: GraphNode,
    pub members: Vec<FactionMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactionMember {
    pub id: String,
    pub name: String,
}

/// A direct edge between two factions
#[derive(Debug, Clone, Serialize)]
pub struct FactionRelation {
    pub source: String,
    pub source_name: String,
    pub target: String,
    pub target_name: String,
    pub relationship: EdgeType,
    pub properties: Properties,
}

/// The political landscape: every faction, its members, and inter-faction
/// edges
#[derive(Debug, Clone, Serialize)]
pub struct FactionStatus {
    pub factions: Vec<FactionInfo>,
    pub relationships: Vec<FactionRelation>,
}

/// Node and edge counts, bucketed by type
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

impl KnowledgeGraph {
    /// Breadth-first neighborhood of a node, bounded by `depth`. The visited
    /// set is seeded with the origin, so cycles terminate. Each reached node
    /// is annotated with the edge that was traversed to reach it first.
    pub fn get_neighbors(
        &self,
        node_id: &str,
        edge_type: Option<EdgeType>,
        direction: Direction,
        depth: usize,
    ) -> Vec<NeighborNode> {
        if !self.contains(node_id) {
            return Vec::new();
        }

        let mut neighbors = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([node_id.to_string()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(node_id.to_string(), 1)]);

        while let Some((current, current_depth)) = queue.pop_front() {
            if current_depth > depth {
                continue;
            }

            if direction.follows_outgoing() {
                for edge in self.outgoing(&current) {
                    if visited.contains(&edge.target) {
                        continue;
                    }
                    if edge_type.is_some_and(|t| edge.edge_type != t) {
                        continue;
                    }
                    let Some(node) = self.get_entity(&edge.target) else {
                        continue;
                    };
                    visited.insert(edge.target.clone());
                    neighbors.push(NeighborNode {
                        node: node.clone(),
                        edge: TraversedEdge {
                            source: current.clone(),
                            target: edge.target.clone(),
                            direction: Direction::Outgoing,
                            edge_type: edge.edge_type,
                            properties: edge.properties.clone(),
                        },
                    });
                    queue.push_back((edge.target.clone(), current_depth + 1));
                }
            }

            if direction.follows_incoming() {
                for source in self.incoming_sources(&current) {
                    if visited.contains(source) {
                        continue;
                    }
                    let Some(edge) = self
                        .outgoing(source)
                        .iter()
                        .find(|e| e.target == current && edge_type.map_or(true, |t| e.edge_type == t))
                    else {
                        continue;
                    };
                    let Some(node) = self.get_entity(source) else {
                        continue;
                    };
                    visited.insert(source.clone());
                    neighbors.push(NeighborNode {
                        node: node.clone(),
                        edge: TraversedEdge {
                            source: source.clone(),
                            target: current.clone(),
                            direction: Direction::Incoming,
                            edge_type: edge.edge_type,
                            properties: edge.properties.clone(),
                        },
                    });
                    queue.push_back((source.clone(), current_depth + 1));
                }
            }
        }

        neighbors
    }

    /// Everything relevant to a location, bucketed from its depth-2
    /// neighborhood.
    pub fn get_context_for_location(&self, location_id: &str) -> LocationContext {
        let mut context = LocationContext {
            location: self.get_entity(location_id).cloned(),
            characters: Vec::new(),
            items: Vec::new(),
            recent_events: Vec::new(),
            connected_locations: Vec::new(),
            factions: Vec::new(),
        };
        if context.location.is_none() {
            return context;
        }

        for neighbor in self.get_neighbors(location_id, None, Direction::Both, 2) {
            match (neighbor.node.node_type, neighbor.edge.edge_type) {
                (NodeType::Character, EdgeType::LocatedIn) => context.characters.push(neighbor),
                (NodeType::Item, EdgeType::LocatedIn) => context.items.push(neighbor),
                (NodeType::Event, EdgeType::OccurredAt) => context.recent_events.push(neighbor),
                (NodeType::Location, EdgeType::ConnectedTo) => {
                    context.connected_locations.push(neighbor);
                }
                (NodeType::Faction, _) => context.factions.push(neighbor),
                _ => {}
            }
        }
        context
    }

    /// What a character knows and remembers, bucketed from its depth-2
    /// neighborhood.
    pub fn get_character_knowledge(&self, character_id: &str) -> CharacterKnowledge {
        let mut knowledge = CharacterKnowledge {
            character: self.get_entity(character_id).cloned(),
            known_characters: Vec::new(),
            known_locations: Vec::new(),
            known_items: Vec::new(),
            participated_events: Vec::new(),
            faction_memberships: Vec::new(),
        };
        if knowledge.character.is_none() {
            return knowledge;
        }

        for neighbor in self.get_neighbors(character_id, None, Direction::Both, 2) {
            match (neighbor.node.node_type, neighbor.edge.edge_type) {
                (NodeType::Character, EdgeType::Knows) => knowledge.known_characters.push(neighbor),
                (NodeType::Location, EdgeType::LocatedIn) => {
                    knowledge.known_locations.push(neighbor);
                }
                (NodeType::Item, EdgeType::Owns) => knowledge.known_items.push(neighbor),
                (NodeType::Event, EdgeType::ParticipatedIn) => {
                    knowledge.participated_events.push(neighbor);
                }
                (NodeType::Faction, EdgeType::MemberOf) => {
                    knowledge.faction_memberships.push(neighbor);
                }
                _ => {}
            }
        }
        knowledge
    }

    /// Every faction, its member roster (via incoming `member_of` edges),
    /// and all direct edges between factions.
    pub fn get_faction_status(&self) -> FactionStatus {
        let factions: Vec<&GraphNode> = self.get_nodes_by_type(NodeType::Faction);

        let infos: Vec<FactionInfo> = factions
            .iter()
            .map(|faction| {
                let members = self
                    .incoming_sources(&faction.id)
                    .iter()
                    .filter(|source| {
                        self.get_edge(source, &faction.id, EdgeType::MemberOf).is_some()
                    })
                    .filter_map(|source| self.get_entity(source))
                    .map(|node| FactionMember {
                        id: node.id.clone(),
                        name: node.name.clone(),
                    })
                    .collect();
                FactionInfo {
                    node: (*faction).clone(),
                    members,
                }
            })
            .collect();

        let mut relationships = Vec::new();
        for faction in &factions {
            for other in &factions {
                if faction.id == other.id {
                    continue;
                }
                for edge in self.outgoing(&faction.id) {
                    if edge.target == other.id {
                        relationships.push(FactionRelation {
                            source: faction.id.clone(),
                            source_name: faction.name.clone(),
                            target: other.id.clone(),
                            target_name: other.name.clone(),
                            relationship: edge.edge_type,
                            properties: edge.properties.clone(),
                        });
                    }
                }
            }
        }

        FactionStatus {
            factions: infos,
            relationships,
        }
    }

    /// Shortest path between two nodes, ignoring edge direction. `None`
    /// when either endpoint is missing or the nodes are disconnected.
    pub fn query_path(&self, source: &str, target: &str) -> Option<Vec<GraphNode>> {
        if !self.contains(source) || !self.contains(target) {
            return None;
        }
        if source == target {
            return Some(vec![self.get_entity(source)?.clone()]);
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::from([source.to_string()]);
        let mut queue: VecDeque<String> = VecDeque::from([source.to_string()]);

        'search: while let Some(current) = queue.pop_front() {
            let forward = self.outgoing(&current).iter().map(|e| e.target.clone());
            let backward = self.incoming_sources(&current).iter().cloned();
            for next in forward.chain(backward) {
                if visited.contains(&next) {
                    continue;
                }
                visited.insert(next.clone());
                parents.insert(next.clone(), current.clone());
                if next == target {
                    break 'search;
                }
                queue.push_back(next);
            }
        }

        if !parents.contains_key(target) {
            return None;
        }

        let mut path_ids = vec![target.to_string()];
        let mut cursor = target.to_string();
        while let Some(parent) = parents.get(&cursor) {
            path_ids.push(parent.clone());
            cursor = parent.clone();
        }
        path_ids.reverse();
        path_ids
            .iter()
            .map(|id| self.get_entity(id).cloned())
            .collect()
    }

    /// Event nodes, newest first.
    pub fn get_timeline(&self, limit: usize) -> Vec<GraphNode> {
        let mut events: Vec<(usize, &GraphNode)> = self
            .iter_nodes()
            .enumerate()
            .filter(|(_, node)| node.node_type == NodeType::Event)
            .collect();
        events.sort_by(|(index_a, a), (index_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| index_b.cmp(index_a))
        });
        events
            .into_iter()
            .take(limit)
            .map(|(_, node)| node.clone())
            .collect()
    }

    /// Case-insensitive substring search over names and descriptions.
    ///
    /// Results are ranked exact-name match first, then substring-in-name,
    /// then substring-in-description only; higher importance wins within a
    /// tier, and ties keep insertion order.
    pub fn search(
        &self,
        query: &str,
        node_type: Option<NodeType>,
        limit: usize,
    ) -> Vec<GraphNode> {
        let query = query.to_lowercase();

        let mut matches: Vec<(&GraphNode, u8)> = self
            .iter_nodes()
            .filter(|node| node_type.map_or(true, |t| node.node_type == t))
            .filter_map(|node| {
                let name = node.name.to_lowercase();
                let description = node.description.to_lowercase();
                let tier = if name == query {
                    0
                } else if name.contains(&query) {
                    1
                } else if description.contains(&query) {
                    2
                } else {
                    return None;
                };
                Some((node, tier))
            })
            .collect();

        // Stable sort: ties on (tier, importance) keep insertion order.
        matches.sort_by(|(a, tier_a), (b, tier_b)| {
            tier_a
                .cmp(tier_b)
                .then_with(|| b.importance.cmp(&a.importance))
        });

        matches
            .into_iter()
            .take(limit)
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Node and edge counts by type.
    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.iter_nodes() {
            *nodes_by_type.entry(node.node_type.as_str().to_string()).or_default() += 1;
        }
        let mut edges_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for edge in self.all_edges() {
            *edges_by_type.entry(edge.edge_type.as_str().to_string()).or_default() += 1;
        }
        GraphStats {
            total_nodes: self.node_count(),
            total_edges: self.edge_count(),
            nodes_by_type,
            edges_by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("alice", NodeType::Character, "Alice", None, None, 5);
        graph.add_entity("inn", NodeType::Location, "Inn", None, None, 5);
        graph.add_entity("sword", NodeType::Item, "Sword", None, None, 5);
        graph
            .add_relationship("alice", "inn", EdgeType::LocatedIn, None)
            .expect("edge");
        graph
            .add_relationship("alice", "sword", EdgeType::Owns, None)
            .expect("edge");
        graph
    }

    #[test]
    fn neighbors_depth_one_returns_direct() {
        let graph = sample_graph();
        let neighbors = graph.get_neighbors("alice", None, Direction::Both, 1);
        let ids: Vec<&str> = neighbors.iter().map(|n| n.node.id.as_str()).collect();
        assert_eq!(ids, vec!["inn", "sword"]);
    }

    #[test]
    fn neighbors_respects_edge_type_filter() {
        let graph = sample_graph();
        let neighbors = graph.get_neighbors("alice", Some(EdgeType::Owns), Direction::Both, 1);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].node.id, "sword");
        assert_eq!(neighbors[0].edge.edge_type, EdgeType::Owns);
    }

    #[test]
    fn neighbors_respects_direction() {
        let graph = sample_graph();
        let outgoing = graph.get_neighbors("inn", None, Direction::Outgoing, 1);
        assert!(outgoing.is_empty());
        let incoming = graph.get_neighbors("inn", None, Direction::Incoming, 1);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].node.id, "alice");
        assert_eq!(incoming[0].edge.direction, Direction::Incoming);
    }

    #[test]
    fn neighbors_terminates_on_cycles() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("a", NodeType::Location, "A", None, None, 5);
        graph.add_entity("b", NodeType::Location, "B", None, None, 5);
        graph.add_relationship("a", "b", EdgeType::ConnectedTo, None).expect("edge");
        graph.add_relationship("b", "a", EdgeType::ConnectedTo, None).expect("edge");
        let neighbors = graph.get_neighbors("a", None, Direction::Both, 5);
        assert_eq!(neighbors.len(), 1);
    }

    #[test]
    fn neighbors_depth_two_reaches_transitive() {
        let mut graph = sample_graph();
        graph.add_entity("cellar", NodeType::Location, "Cellar", None, None, 5);
        graph
            .add_relationship("cellar", "inn", EdgeType::PartOf, None)
            .expect("edge");
        let depth_one: Vec<String> = graph
            .get_neighbors("alice", None, Direction::Both, 1)
            .into_iter()
            .map(|n| n.node.id)
            .collect();
        assert!(!depth_one.contains(&"cellar".to_string()));
        let depth_two: Vec<String> = graph
            .get_neighbors("alice", None, Direction::Both, 2)
            .into_iter()
            .map(|n| n.node.id)
            .collect();
        assert!(depth_two.contains(&"cellar".to_string()));
    }

    #[test]
    fn location_context_buckets_by_type_and_edge() {
        let mut graph = sample_graph();
        graph.add_entity("brawl", NodeType::Event, "Bar brawl", None, None, 5);
        graph.add_entity("market", NodeType::Location, "Market", None, None, 5);
        graph.add_entity("guild", NodeType::Faction, "Guild", None, None, 5);
        graph.add_relationship("brawl", "inn", EdgeType::OccurredAt, None).expect("edge");
        graph.add_relationship("inn", "market", EdgeType::ConnectedTo, None).expect("edge");
        graph.add_relationship("guild", "inn", EdgeType::Contains, None).expect("edge");

        let context = graph.get_context_for_location("inn");
        assert_eq!(context.location.expect("location").id, "inn");
        assert_eq!(context.characters.len(), 1);
        assert_eq!(context.recent_events.len(), 1);
        assert_eq!(context.connected_locations.len(), 1);
        assert_eq!(context.factions.len(), 1);
    }

    #[test]
    fn character_knowledge_buckets() {
        let mut graph = sample_graph();
        graph.add_entity("bob", NodeType::Character, "Bob", None, None, 5);
        graph.add_entity("guild", NodeType::Faction, "Guild", None, None, 5);
        graph.add_entity("heist", NodeType::Event, "The Heist", None, None, 5);
        graph.add_relationship("alice", "bob", EdgeType::Knows, None).expect("edge");
        graph.add_relationship("alice", "guild", EdgeType::MemberOf, None).expect("edge");
        graph
            .add_relationship("alice", "heist", EdgeType::ParticipatedIn, None)
            .expect("edge");

        let knowledge = graph.get_character_knowledge("alice");
        assert_eq!(knowledge.known_characters.len(), 1);
        assert_eq!(knowledge.known_locations.len(), 1);
        assert_eq!(knowledge.known_items.len(), 1);
        assert_eq!(knowledge.participated_events.len(), 1);
        assert_eq!(knowledge.faction_memberships.len(), 1);
    }

    #[test]
    fn faction_status_lists_members_and_relations() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("guild", NodeType::Faction, "Guild", None, None, 5);
        graph.add_entity("cult", NodeType::Faction, "Cult", None, None, 5);
        graph.add_entity("alice", NodeType::Character, "Alice", None, None, 5);
        graph.add_relationship("alice", "guild", EdgeType::MemberOf, None).expect("edge");
        graph.add_relationship("guild", "cult", EdgeType::EnemyOf, None).expect("edge");

        let status = graph.get_faction_status();
        assert_eq!(status.factions.len(), 2);
        assert_eq!(status.factions[0].members.len(), 1);
        assert_eq!(status.factions[0].members[0].name, "Alice");
        assert_eq!(status.relationships.len(), 1);
        assert_eq!(status.relationships[0].relationship, EdgeType::EnemyOf);
    }

    #[test]
    fn path_traverses_undirected() {
        let graph = sample_graph();
        // inn <- alice -> sword: the undirected path goes through alice.
        let path = graph.query_path("inn", "sword").expect("path");
        let ids: Vec<&str> = path.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["inn", "alice", "sword"]);
    }

    #[test]
    fn path_returns_none_when_disconnected() {
        let mut graph = sample_graph();
        graph.add_entity("moon", NodeType::Location, "Moon", None, None, 5);
        assert!(graph.query_path("alice", "moon").is_none());
        assert!(graph.query_path("alice", "ghost").is_none());
    }

    #[test]
    fn timeline_returns_events_newest_first() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("e1", NodeType::Event, "First", None, None, 5);
        graph.add_entity("e2", NodeType::Event, "Second", None, None, 5);
        graph.add_entity("e3", NodeType::Event, "Third", None, None, 5);
        graph.add_entity("npc", NodeType::Character, "Bystander", None, None, 5);

        let timeline = graph.get_timeline(10);
        let names: Vec<&str> = timeline.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Third", "Second", "First"]);

        let limited = graph.get_timeline(2);
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn search_ranks_exact_before_name_before_description() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity(
            "d",
            NodeType::Lore,
            "Old tale",
            Some("A story about the dragon".into()),
            None,
            10,
        );
        graph.add_entity("n", NodeType::Location, "Dragon's Lair", None, None, 1);
        graph.add_entity("e", NodeType::Character, "Dragon", None, None, 1);

        let results = graph.search("dragon", None, 20);
        let ids: Vec<&str> = results.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["e", "n", "d"]);
    }

    #[test]
    fn search_orders_by_importance_within_tier() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("low", NodeType::Character, "Iron Golem", None, None, 2);
        graph.add_entity("high", NodeType::Character, "Iron Duke", None, None, 9);
        let results = graph.search("iron", None, 20);
        let ids: Vec<&str> = results.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[test]
    fn search_filters_by_type_and_respects_limit() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("c", NodeType::Character, "Mirror", None, None, 5);
        graph.add_entity("i", NodeType::Item, "Mirror", None, None, 5);
        let results = graph.search("mirror", Some(NodeType::Item), 20);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "i");

        graph.add_entity("c2", NodeType::Character, "Mirror twin", None, None, 5);
        assert_eq!(graph.search("mirror", None, 2).len(), 2);
    }

    #[test]
    fn search_is_case_insensitive() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("a", NodeType::Character, "ALICE", None, None, 5);
        assert_eq!(graph.search("alice", None, 20).len(), 1);
    }

    #[test]
    fn stats_counts_by_type() {
        let graph = sample_graph();
        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.total_edges, 2);
        assert_eq!(stats.nodes_by_type["character"], 1);
        assert_eq!(stats.edges_by_type["located_in"], 1);
    }
}
