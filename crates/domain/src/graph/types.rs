//! Node and edge vocabulary for the knowledge graph.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by graph mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Invalid node type: {0}")]
    UnknownNodeType(String),
    #[error("Invalid edge type: {0}")]
    UnknownEdgeType(String),
    #[error("Edge endpoint not in graph: {0}")]
    MissingEndpoint(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

/// The closed set of entity categories a node may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Character,
    Location,
    Event,
    Item,
    Faction,
    Quest,
    Lore,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        Self::Character,
        Self::Location,
        Self::Event,
        Self::Item,
        Self::Faction,
        Self::Quest,
        Self::Lore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Event => "event",
            Self::Item => "item",
            Self::Faction => "faction",
            Self::Quest => "quest",
            Self::Lore => "lore",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "character" => Ok(Self::Character),
            "location" => Ok(Self::Location),
            "event" => Ok(Self::Event),
            "item" => Ok(Self::Item),
            "faction" => Ok(Self::Faction),
            "quest" => Ok(Self::Quest),
            "lore" => Ok(Self::Lore),
            other => Err(GraphError::UnknownNodeType(other.to_string())),
        }
    }
}

/// The closed relationship vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    LocatedIn,
    Owns,
    Knows,
    MemberOf,
    ParticipatedIn,
    OccurredAt,
    LeadsTo,
    Requires,
    ConnectedTo,
    Contains,
    CreatedBy,
    DestroyedBy,
    AlliedWith,
    EnemyOf,
    RelatedTo,
    PartOf,
    GaveTo,
    ReceivedFrom,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocatedIn => "located_in",
            Self::Owns => "owns",
            Self::Knows => "knows",
            Self::MemberOf => "member_of",
            Self::ParticipatedIn => "participated_in",
            Self::OccurredAt => "occurred_at",
            Self::LeadsTo => "leads_to",
            Self::Requires => "requires",
            Self::ConnectedTo => "connected_to",
            Self::Contains => "contains",
            Self::CreatedBy => "created_by",
            Self::DestroyedBy => "destroyed_by",
            Self::AlliedWith => "allied_with",
            Self::EnemyOf => "enemy_of",
            Self::RelatedTo => "related_to",
            Self::PartOf => "part_of",
            Self::GaveTo => "gave_to",
            Self::ReceivedFrom => "received_from",
        }
    }

    /// The human-readable form used in prompt rendering ("located in").
    pub fn as_phrase(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "located_in" => Ok(Self::LocatedIn),
            "owns" => Ok(Self::Owns),
            "knows" => Ok(Self::Knows),
            "member_of" => Ok(Self::MemberOf),
            "participated_in" => Ok(Self::ParticipatedIn),
            "occurred_at" => Ok(Self::OccurredAt),
            "leads_to" => Ok(Self::LeadsTo),
            "requires" => Ok(Self::Requires),
            "connected_to" => Ok(Self::ConnectedTo),
            "contains" => Ok(Self::Contains),
            "created_by" => Ok(Self::CreatedBy),
            "destroyed_by" => Ok(Self::DestroyedBy),
            "allied_with" => Ok(Self::AlliedWith),
            "enemy_of" => Ok(Self::EnemyOf),
            "related_to" => Ok(Self::RelatedTo),
            "part_of" => Ok(Self::PartOf),
            "gave_to" => Ok(Self::GaveTo),
            "received_from" => Ok(Self::ReceivedFrom),
            other => Err(GraphError::UnknownEdgeType(other.to_string())),
        }
    }
}

/// Free-form property bag on nodes and edges
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// A node in the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub description: String,
    pub properties: Properties,
    /// Context-selection weight, clamped to 1..=10
    pub importance: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A directed edge. At most one edge of a given type exists between any
/// ordered pair of nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Traversal direction for neighbor queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
}

impl Direction {
    pub fn follows_outgoing(&self) -> bool {
        matches!(self, Self::Outgoing | Self::Both)
    }

    pub fn follows_incoming(&self) -> bool {
        matches!(self, Self::Incoming | Self::Both)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            "both" => Ok(Self::Both),
            other => Err(format!("Unknown direction: {other}")),
        }
    }
}

/// The edge a neighbor query traversed to reach a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversedEdge {
    pub source: String,
    pub target: String,
    pub direction: Direction,
    pub edge_type: EdgeType,
    pub properties: Properties,
}

/// A node reached by a neighbor query, annotated with the traversed edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborNode {
    pub node: GraphNode,
    pub edge: TraversedEdge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_rejects_unknown() {
        assert!(matches!(
            "dragon".parse::<NodeType>(),
            Err(GraphError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn edge_vocabulary_round_trips() {
        let all = [
            "located_in",
            "owns",
            "knows",
            "member_of",
            "participated_in",
            "occurred_at",
            "leads_to",
            "requires",
            "connected_to",
            "contains",
            "created_by",
            "destroyed_by",
            "allied_with",
            "enemy_of",
            "related_to",
            "part_of",
            "gave_to",
            "received_from",
        ];
        for name in all {
            let parsed: EdgeType = name.parse().expect("known edge type");
            assert_eq!(parsed.as_str(), name);
        }
        assert!(matches!(
            "visited".parse::<EdgeType>(),
            Err(GraphError::UnknownEdgeType(_))
        ));
    }

    #[test]
    fn edge_phrase_spaces_underscores() {
        assert_eq!(EdgeType::LocatedIn.as_phrase(), "located in");
        assert_eq!(EdgeType::MemberOf.as_phrase(), "member of");
    }
}
