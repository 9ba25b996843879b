//! Deterministic textual projection of a bounded graph neighborhood.
//!
//! This is the string that becomes generator context, so its output is
//! pinned by tests: fixed inputs must render byte-identical text.

use std::collections::HashSet;

use super::types::{Direction, NodeType};
use super::KnowledgeGraph;

/// Returned when no seed entities were supplied.
pub const NO_CONTEXT: &str = "No specific context available.";

/// Returned when no seed entity exists in the graph (or the node cap is 0).
pub const NO_ENTITIES: &str = "No relevant entities found in the knowledge graph.";

/// Fallback when the surviving nodes produce no renderable section.
pub const NO_SECTIONS: &str = "No context available.";

/// Section order, with the per-section caps applied during rendering.
const SECTION_ORDER: [(NodeType, &str); 7] = [
    (NodeType::Character, "CHARACTERS"),
    (NodeType::Location, "LOCATIONS"),
    (NodeType::Faction, "FACTIONS"),
    (NodeType::Item, "NOTABLE ITEMS"),
    (NodeType::Event, "RECENT EVENTS"),
    (NodeType::Quest, "ACTIVE QUESTS"),
    (NodeType::Lore, "WORLD LORE"),
];

const MAX_EVENTS: usize = 10;
const MAX_RELATIONSHIPS: usize = 20;

impl KnowledgeGraph {
    /// Render the neighborhood of `seed_ids` as prompt context.
    ///
    /// Breadth-first from every seed up to `max_depth`, accumulating at most
    /// `max_nodes` nodes, then bucketing the survivors into fixed sections
    /// and listing every edge whose endpoints both survived.
    pub fn render_for_prompt(
        &self,
        seed_ids: &[String],
        max_depth: usize,
        max_nodes: usize,
    ) -> String {
        if seed_ids.is_empty() {
            return NO_CONTEXT.to_string();
        }

        // Collect the bounded node set: seeds first, then their neighborhoods.
        let mut relevant: HashSet<String> = HashSet::new();
        for seed in seed_ids {
            if relevant.len() >= max_nodes {
                break;
            }
            if self.contains(seed) {
                relevant.insert(seed.clone());
            }
        }
        for seed in seed_ids {
            if !self.contains(seed) {
                continue;
            }
            for neighbor in self.get_neighbors(seed, None, Direction::Both, max_depth) {
                if relevant.len() >= max_nodes {
                    break;
                }
                relevant.insert(neighbor.node.id);
            }
        }

        if relevant.is_empty() {
            return NO_ENTITIES.to_string();
        }

        // Bucket surviving nodes by type, in graph insertion order.
        let mut sections: Vec<Vec<String>> = vec![Vec::new(); SECTION_ORDER.len()];
        let mut relationships: Vec<String> = Vec::new();

        for node in self.iter_nodes() {
            if !relevant.contains(&node.id) {
                continue;
            }
            let entry = if node.description.is_empty() {
                format!("- {}", node.name)
            } else {
                format!("- {}: {}", node.name, node.description)
            };
            if let Some(index) = SECTION_ORDER
                .iter()
                .position(|(node_type, _)| *node_type == node.node_type)
            {
                sections[index].push(entry);
            }

            for edge in self.outgoing(&node.id) {
                if !relevant.contains(&edge.target) {
                    continue;
                }
                let Some(target) = self.get_entity(&edge.target) else {
                    continue;
                };
                let mut line = format!(
                    "- {} {} {}",
                    node.name,
                    edge.edge_type.as_phrase(),
                    target.name
                );
                if let Some(sentiment) = edge.properties.get("sentiment").and_then(|v| v.as_str())
                {
                    line.push_str(&format!(" ({sentiment})"));
                }
                relationships.push(line);
            }
        }

        let mut output: Vec<String> = Vec::new();
        for (index, (node_type, title)) in SECTION_ORDER.iter().enumerate() {
            let entries = &sections[index];
            if entries.is_empty() {
                continue;
            }
            let capped: Vec<&String> = if *node_type == NodeType::Event {
                entries.iter().take(MAX_EVENTS).collect()
            } else {
                entries.iter().collect()
            };
            let body: Vec<&str> = capped.iter().map(|s| s.as_str()).collect();
            output.push(format!("{}:\n{}", title, body.join("\n")));
        }

        if !relationships.is_empty() {
            let capped: Vec<&str> = relationships
                .iter()
                .take(MAX_RELATIONSHIPS)
                .map(String::as_str)
                .collect();
            output.push(format!("KEY RELATIONSHIPS:\n{}", capped.join("\n")));
        }

        if output.is_empty() {
            NO_SECTIONS.to_string()
        } else {
            output.join("\n\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{EdgeType, Properties};
    use super::*;

    fn alice_at_inn() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("alice", NodeType::Character, "Alice", None, None, 5);
        graph.add_entity("inn", NodeType::Location, "Inn", None, None, 5);
        graph
            .add_relationship("alice", "inn", EdgeType::LocatedIn, None)
            .expect("edge");
        graph
    }

    #[test]
    fn empty_seed_list_yields_no_context_sentinel() {
        let graph = alice_at_inn();
        assert_eq!(graph.render_for_prompt(&[], 2, 50), NO_CONTEXT);
    }

    #[test]
    fn unknown_seeds_yield_no_entities_sentinel() {
        let graph = alice_at_inn();
        let output = graph.render_for_prompt(&["ghost".to_string()], 2, 50);
        assert_eq!(output, NO_ENTITIES);
    }

    #[test]
    fn zero_node_cap_yields_no_entities_sentinel() {
        let graph = alice_at_inn();
        let output = graph.render_for_prompt(&["inn".to_string()], 2, 0);
        assert_eq!(output, NO_ENTITIES);
    }

    #[test]
    fn renders_sections_and_relationships_deterministically() {
        let graph = alice_at_inn();
        let output = graph.render_for_prompt(&["inn".to_string()], 1, 50);
        assert_eq!(
            output,
            "CHARACTERS:\n- Alice\n\nLOCATIONS:\n- Inn\n\nKEY RELATIONSHIPS:\n- Alice located in Inn"
        );
    }

    #[test]
    fn description_is_appended_after_colon() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity(
            "inn",
            NodeType::Location,
            "Inn",
            Some("A smoky taproom".into()),
            None,
            5,
        );
        let output = graph.render_for_prompt(&["inn".to_string()], 1, 50);
        assert_eq!(output, "LOCATIONS:\n- Inn: A smoky taproom");
    }

    #[test]
    fn sentiment_property_is_parenthesized() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("a", NodeType::Character, "Alice", None, None, 5);
        graph.add_entity("b", NodeType::Character, "Bob", None, None, 5);
        let mut props = Properties::new();
        props.insert("sentiment".into(), serde_json::json!("wary"));
        graph
            .add_relationship("a", "b", EdgeType::Knows, Some(props))
            .expect("edge");
        let output = graph.render_for_prompt(&["a".to_string()], 1, 50);
        assert!(output.contains("- Alice knows Bob (wary)"));
    }

    #[test]
    fn events_section_caps_at_ten() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("hub", NodeType::Location, "Hub", None, None, 5);
        for index in 0..15 {
            let id = format!("e{index}");
            graph.add_entity(&id, NodeType::Event, format!("Event {index}"), None, None, 5);
            graph
                .add_relationship(&id, "hub", EdgeType::OccurredAt, None)
                .expect("edge");
        }
        let output = graph.render_for_prompt(&["hub".to_string()], 1, 50);
        let events_section = output
            .split("\n\n")
            .find(|section| section.starts_with("RECENT EVENTS:"))
            .expect("events section");
        assert_eq!(events_section.lines().count(), 11);
    }

    #[test]
    fn relationships_cap_at_twenty() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("hub", NodeType::Location, "Hub", None, None, 5);
        for index in 0..25 {
            let id = format!("c{index}");
            graph.add_entity(&id, NodeType::Character, format!("Char {index}"), None, None, 5);
            graph
                .add_relationship(&id, "hub", EdgeType::LocatedIn, None)
                .expect("edge");
        }
        let output = graph.render_for_prompt(&["hub".to_string()], 1, 50);
        let relationships = output
            .split("\n\n")
            .find(|section| section.starts_with("KEY RELATIONSHIPS:"))
            .expect("relationships section");
        assert_eq!(relationships.lines().count(), 21);
    }

    #[test]
    fn node_cap_bounds_the_collected_set() {
        let mut graph = KnowledgeGraph::new();
        graph.add_entity("hub", NodeType::Location, "Hub", None, None, 5);
        for index in 0..30 {
            let id = format!("c{index}");
            graph.add_entity(&id, NodeType::Character, format!("Char {index}"), None, None, 5);
            graph
                .add_relationship(&id, "hub", EdgeType::LocatedIn, None)
                .expect("edge");
        }
        let output = graph.render_for_prompt(&["hub".to_string()], 1, 5);
        let characters = output
            .split("\n\n")
            .find(|section| section.starts_with("CHARACTERS:"))
            .expect("characters section");
        // Hub plus four characters survive the cap of 5.
        assert_eq!(characters.lines().count(), 5);
    }
}
