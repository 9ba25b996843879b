//! Prompt catalog: named, parameterized templates for every generator call.
//!
//! The catalog is data, not logic. Each template declares the slot names it
//! requires; rendering is pure `{slot}` substitution and fails with
//! `PromptError::SlotMissing` when a declared slot is absent. Every template
//! that expects structured output instructs the model to answer with JSON
//! only (the generator appends the final JSON-only reminder itself).

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Unknown prompt template: {0}")]
    UnknownTemplate(String),
    #[error("Template '{template}' is missing slot '{slot}'")]
    SlotMissing { template: String, slot: String },
}

/// Groups used to organize the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateGroup {
    Narrative,
    Opening,
    NpcGeneration,
    NpcDialogue,
    EncounterGeneration,
    CombatAction,
    LocationGeneration,
    Recap,
    ItemGeneration,
    ContextSummary,
}

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub key: &'static str,
    pub group: TemplateGroup,
    /// Slot names that must be supplied at render time.
    pub slots: &'static [&'static str],
    pub text: &'static str,
}

/// All template keys as constants.
pub mod keys {
    pub const NARRATIVE_SYSTEM: &str = "narrative.system";
    pub const NARRATIVE_USER: &str = "narrative.user";
    pub const OPENING_USER: &str = "opening.user";
    pub const NPC_GENERATION_SYSTEM: &str = "npc_generation.system";
    pub const NPC_GENERATION_USER: &str = "npc_generation.user";
    pub const NPC_DIALOGUE_SYSTEM: &str = "npc_dialogue.system";
    pub const NPC_DIALOGUE_USER: &str = "npc_dialogue.user";
    pub const ENCOUNTER_SYSTEM: &str = "encounter_generation.system";
    pub const ENCOUNTER_COMBAT_USER: &str = "encounter_generation.combat_user";
    pub const ENCOUNTER_SOCIAL_USER: &str = "encounter_generation.social_user";
    pub const ENCOUNTER_PUZZLE_USER: &str = "encounter_generation.puzzle_user";
    pub const COMBAT_ACTION_SYSTEM: &str = "combat_action.system";
    pub const COMBAT_ACTION_USER: &str = "combat_action.user";
    pub const LOCATION_SYSTEM: &str = "location_generation.system";
    pub const LOCATION_USER: &str = "location_generation.user";
    pub const RECAP_SYSTEM: &str = "recap.system";
    pub const RECAP_USER: &str = "recap.user";
    pub const ITEM_SYSTEM: &str = "item_generation.system";
    pub const LOOT_USER: &str = "item_generation.loot_user";
    pub const CONTEXT_SUMMARY_SYSTEM: &str = "context_summary.system";
    pub const CONTEXT_SUMMARY_USER: &str = "context_summary.user";
}

macro_rules! template {
    ($key:expr, $group:expr, [$($slot:expr),*], $text:expr) => {
        PromptTemplate {
            key: $key,
            group: $group,
            slots: &[$($slot),*],
            text: $text,
        }
    };
}

static CATALOG: Lazy<BTreeMap<&'static str, PromptTemplate>> = Lazy::new(|| {
    let templates = [
        template!(
            keys::NARRATIVE_SYSTEM,
            TemplateGroup::Narrative,
            [
                "genre",
                "campaign_name",
                "tone",
                "knowledge_graph_context",
                "recent_events_summary",
                "character_summaries",
                "location_description"
            ],
            r#"You are Lorekeeper, a master Dungeon Master running a {genre} campaign called "{campaign_name}".
Your storytelling style is {tone}. You maintain perfect narrative consistency and never contradict established facts.

CRITICAL RULES:
- Never contradict established facts in the world state below
- Reference NPCs by name and maintain their established personalities
- Track cause and effect: actions have consequences that ripple through the world
- Present 2-3 meaningful choices when appropriate
- Describe sensory details (sight, sound, smell, texture)
- Keep narrative responses between 150-300 words
- End with a clear prompt for player action or present choices
- If dice rolls are needed, specify them clearly

WORLD STATE:
{knowledge_graph_context}

RECENT EVENTS:
{recent_events_summary}

ACTIVE CHARACTERS:
{character_summaries}

CURRENT LOCATION:
{location_description}"#
        ),
        template!(
            keys::NARRATIVE_USER,
            TemplateGroup::Narrative,
            ["player_action", "additional_context"],
            r#"The player declares their action:
"{player_action}"

{additional_context}

Respond with a JSON object containing:
{
    "narrative": "The story text in markdown format. Include sensory details and consequences.",
    "choices": ["2-4 suggested player actions as strings. Omit if the situation doesn't call for explicit choices."],
    "mood": "One of: tense, calm, mysterious, triumphant, somber, humorous, urgent, peaceful",
    "new_entities": [
        {"name": "Entity name", "type": "character/location/item/faction", "description": "Brief description"}
    ],
    "knowledge_updates": [
        {"entity": "Entity name", "relationship": "relationship_type", "target": "Target entity name"}
    ],
    "xp_awarded": null or number (only for significant achievements),
    "dice_required": null or {"type": "skill_check/attack/saving_throw", "skill": "skill name", "dc": number}
}"#
        ),
        template!(
            keys::OPENING_USER,
            TemplateGroup::Opening,
            ["style", "recap_section"],
            r#"Generate an opening scene for a new adventure in this campaign. Set the stage dramatically.

Style: {style}
{recap_section}

Create an evocative opening that:
1. Establishes the immediate setting and atmosphere
2. Introduces or references the current situation
3. Creates intrigue or a call to action
4. Ends with an invitation for player input

Respond with the same JSON format as narrative responses:
{
    "narrative": "...",
    "choices": ["..."],
    "mood": "...",
    "new_entities": [],
    "knowledge_updates": [],
    "xp_awarded": null
}"#
        ),
        template!(
            keys::NPC_GENERATION_SYSTEM,
            TemplateGroup::NpcGeneration,
            ["genre", "tone", "knowledge_graph_context"],
            r#"You are creating an NPC for a {genre} tabletop RPG campaign.
The campaign tone is {tone}. Create believable, memorable characters with depth.

EXISTING WORLD CONTEXT:
{knowledge_graph_context}

NPCs should feel like real people with:
- Consistent personality traits (3-5 descriptors)
- Clear motivation (what they want)
- A secret (something they're hiding)
- Distinctive speech patterns
- Connections to the world"#
        ),
        template!(
            keys::NPC_GENERATION_USER,
            TemplateGroup::NpcGeneration,
            ["role", "location", "personality_hints"],
            r#"Create an NPC with the following parameters:
- Role: {role}
- Location: {location}
- Personality hints: {personality_hints}

Respond with a JSON object:
{
    "name": "Character name appropriate to the setting",
    "race": "Race/species",
    "occupation": "Their job or role",
    "personality_traits": ["3-5 personality descriptors"],
    "motivation": "What they want most",
    "secret": "Something they're hiding",
    "speech_pattern": "One of: formal, casual, archaic, broken, eloquent, gruff, nervous",
    "appearance": "Physical description",
    "backstory": "Brief backstory (2-3 sentences)",
    "knowledge": ["Things they know about the world that players might learn"],
    "initial_disposition": number from -50 to 50 (attitude toward strangers)
}"#
        ),
        template!(
            keys::NPC_DIALOGUE_SYSTEM,
            TemplateGroup::NpcDialogue,
            [
                "npc_name",
                "genre",
                "personality_traits",
                "motivation",
                "secret",
                "speech_pattern",
                "disposition",
                "npc_memory",
                "knowledge_graph_context",
                "current_situation"
            ],
            r#"You are roleplaying as {npc_name}, an NPC in a {genre} campaign.

YOUR PERSONALITY:
- Traits: {personality_traits}
- Motivation: {motivation}
- Secret: {secret}
- Speech pattern: {speech_pattern}
- Current disposition toward the party: {disposition}/100

YOUR MEMORY OF THE PARTY:
{npc_memory}

WORLD CONTEXT:
{knowledge_graph_context}

CURRENT SITUATION:
{current_situation}

Stay in character. Your responses should:
- Match your speech pattern consistently
- Reflect your personality and disposition
- Guard your secret unless trust is earned
- Share knowledge naturally if it comes up
- React to how you've been treated before"#
        ),
        template!(
            keys::NPC_DIALOGUE_USER,
            TemplateGroup::NpcDialogue,
            ["player_message", "context"],
            r#"The player says to you:
"{player_message}"

{context}

Respond with a JSON object:
{
    "dialogue": "Your response in character (use quotation marks for speech, italics for actions)",
    "mood": "Your emotional state: friendly, suspicious, nervous, aggressive, helpful, evasive, etc.",
    "disposition_change": number from -20 to 20 (how this interaction affects your feelings),
    "revealed_information": ["Any world/plot information revealed in this exchange"],
    "internal_thoughts": "What you're really thinking (not said aloud)",
    "knowledge_updates": [
        {"entity": "entity name", "relationship": "type", "target": "target name"}
    ]
}"#
        ),
        template!(
            keys::ENCOUNTER_SYSTEM,
            TemplateGroup::EncounterGeneration,
            [
                "encounter_type",
                "genre",
                "difficulty",
                "party_size",
                "party_level",
                "location_description",
                "knowledge_graph_context",
                "recent_events"
            ],
            r#"You are designing a {encounter_type} encounter for a {genre} tabletop RPG.
The encounter should be {difficulty} difficulty for a party of {party_size} level {party_level} characters.

LOCATION:
{location_description}

WORLD CONTEXT:
{knowledge_graph_context}

RECENT EVENTS:
{recent_events}

Design encounters that:
- Fit the location and situation naturally
- Have interesting tactical elements
- Create memorable moments
- Scale appropriately to the party's power level"#
        ),
        template!(
            keys::ENCOUNTER_COMBAT_USER,
            TemplateGroup::EncounterGeneration,
            ["theme", "party_size", "party_level", "difficulty", "location"],
            r#"Design a combat encounter with these parameters:
- Theme: {theme}
- Party: {party_size} characters, average level {party_level}
- Difficulty: {difficulty}
- Location: {location}

Respond with a JSON object:
{
    "name": "Encounter name",
    "description": "Narrative description of the encounter (2-3 sentences)",
    "enemies": [
        {
            "name": "Enemy name",
            "type": "Enemy type (goblin, undead, etc.)",
            "hp_max": number,
            "armor_class": number,
            "abilities": {"strength": 10, "dexterity": 10, "constitution": 10, "intelligence": 10, "wisdom": 10, "charisma": 10},
            "attacks": [
                {"name": "Attack name", "damage": "1d6+2", "damage_type": "slashing", "to_hit": "+4"}
            ],
            "special_abilities": [
                {"name": "Ability name", "description": "What it does"}
            ]
        }
    ],
    "environmental_effects": ["List of environmental hazards or features"],
    "terrain_features": ["Tactical terrain elements"],
    "tactics": "How the enemies will fight",
    "rewards": {
        "xp": total XP value,
        "gold": gold amount,
        "items": ["Potential loot items"]
    }
}"#
        ),
        template!(
            keys::ENCOUNTER_SOCIAL_USER,
            TemplateGroup::EncounterGeneration,
            ["stakes", "npcs", "location", "tension"],
            r#"Design a social encounter with these parameters:
- Stakes: {stakes}
- NPCs involved: {npcs}
- Location: {location}
- Tension level: {tension}

Respond with a JSON object:
{
    "name": "Encounter name",
    "description": "The social situation",
    "participants": ["NPC names involved"],
    "stakes": "What's at stake",
    "goals": {"party": "What the party wants", "opposition": "What the NPCs want"},
    "social_dynamics": "Power dynamics and relationships",
    "skill_challenges": [
        {"skill": "Persuasion/Deception/etc", "dc": number, "effect": "What success achieves"}
    ],
    "possible_outcomes": ["Different ways this could resolve"],
    "rewards": {
        "success": "Benefits of successful negotiation",
        "partial": "Benefits of partial success",
        "failure": "Consequences of failure"
    }
}"#
        ),
        template!(
            keys::ENCOUNTER_PUZZLE_USER,
            TemplateGroup::EncounterGeneration,
            ["theme", "difficulty", "location"],
            r#"Design a puzzle or riddle encounter:
- Theme: {theme}
- Difficulty: {difficulty}
- Location: {location}

Respond with a JSON object:
{
    "name": "Puzzle name",
    "description": "The puzzle as players see it",
    "puzzle_type": "riddle/mechanical/magical/environmental",
    "setup": "Detailed description of the puzzle elements",
    "solution": "The actual solution (hidden from players)",
    "hints": ["Progressively more helpful hints"],
    "failure_consequence": "What happens on failure",
    "success_reward": "What success grants",
    "skill_alternatives": ["Skills that can help and how"]
}"#
        ),
        template!(
            keys::COMBAT_ACTION_SYSTEM,
            TemplateGroup::CombatAction,
            [
                "genre",
                "current_round",
                "active_combatant",
                "enemies_state",
                "party_status",
                "environmental_effects"
            ],
            r#"You are adjudicating combat in a {genre} tabletop RPG.

CURRENT COMBAT STATE:
- Round: {current_round}
- Active combatant: {active_combatant}
- Enemies: {enemies_state}
- Party status: {party_status}
- Environmental effects: {environmental_effects}

Adjudicate actions fairly and create exciting combat narrative."#
        ),
        template!(
            keys::COMBAT_ACTION_USER,
            TemplateGroup::CombatAction,
            [
                "actor_name",
                "action_type",
                "target_name",
                "dice_result",
                "action_details"
            ],
            r#"The current combatant takes an action:
Actor: {actor_name}
Action: {action_type}
Target: {target_name}
Dice result: {dice_result}
Additional details: {action_details}

Resolve this action and respond with a JSON object:
{
    "success": true/false,
    "description": "Vivid narrative description of what happens",
    "damage_dealt": number or null,
    "damage_taken": number or null (if counterattack/reaction),
    "healing": number or null,
    "conditions_applied": ["Any conditions applied"],
    "conditions_removed": ["Any conditions removed"],
    "target_defeated": true/false,
    "triggered_effects": ["Any triggered abilities or environmental effects"]
}"#
        ),
        template!(
            keys::LOCATION_SYSTEM,
            TemplateGroup::LocationGeneration,
            ["genre", "tone", "knowledge_graph_context"],
            r#"You are creating locations for a {genre} campaign.
The tone is {tone}. Locations should be evocative and full of potential for adventure.

EXISTING WORLD:
{knowledge_graph_context}"#
        ),
        template!(
            keys::LOCATION_USER,
            TemplateGroup::LocationGeneration,
            ["location_type", "theme", "danger_level", "connected_locations"],
            r#"Generate a location with these parameters:
- Type: {location_type}
- Theme: {theme}
- Danger level: {danger_level} (1-10)
- Connected to: {connected_locations}

Respond with a JSON object:
{
    "name": "Location name",
    "location_type": "{location_type}",
    "description": "General description (2-3 sentences)",
    "detailed_description": "Rich, evocative description for when players arrive (paragraph)",
    "atmosphere": "Mood and sensory details",
    "terrain": "Terrain type",
    "climate": "Weather/climate",
    "danger_level": {danger_level},
    "points_of_interest": [
        {"name": "POI name", "description": "What it is", "secrets": "Hidden aspects"}
    ],
    "resources": ["Available resources"],
    "environmental_effects": ["Any hazards or special effects"],
    "potential_encounters": ["Types of encounters that fit here"],
    "connected_locations": [
        {"name": "Connected place", "path_type": "road/trail/hidden/etc", "travel_time": "in hours"}
    ],
    "npcs": ["NPCs that might be found here"],
    "lore": "Historical or mythological significance"
}"#
        ),
        template!(
            keys::RECAP_SYSTEM,
            TemplateGroup::Recap,
            ["genre", "tone"],
            r#"You are generating a "Previously on..." style recap for a {genre} campaign.
The tone is {tone}. Create dramatic, engaging recaps that remind players of key events."#
        ),
        template!(
            keys::RECAP_USER,
            TemplateGroup::Recap,
            [
                "session_number",
                "events_summary",
                "characters",
                "locations",
                "items"
            ],
            r#"Generate a recap for session {session_number} based on these events:

EVENTS:
{events_summary}

CHARACTERS INVOLVED:
{characters}

LOCATIONS VISITED:
{locations}

ITEMS ACQUIRED:
{items}

Create an engaging recap that:
1. Highlights the most dramatic moments
2. Reminds players of unresolved threads
3. Sets up anticipation for the next session
4. Is 150-250 words long

Respond with a JSON object:
{
    "recap": "The narrative recap text",
    "key_events": ["3-5 most important events"],
    "unresolved_threads": ["Plot threads still open"],
    "dramatic_question": "The main question going into next session"
}"#
        ),
        template!(
            keys::ITEM_SYSTEM,
            TemplateGroup::ItemGeneration,
            ["genre"],
            r#"You are creating items for a {genre} tabletop RPG.
Items should be interesting, balanced, and fit the world."#
        ),
        template!(
            keys::LOOT_USER,
            TemplateGroup::ItemGeneration,
            ["difficulty", "encounter_type", "party_level", "theme", "location"],
            r#"Generate loot for a {difficulty} encounter:
- Encounter type: {encounter_type}
- Party level: {party_level}
- Theme: {theme}
- Location: {location}

Respond with a JSON object:
{
    "gold": amount,
    "items": [
        {
            "name": "Item name",
            "type": "weapon/armor/potion/scroll/misc",
            "rarity": "common/uncommon/rare/very_rare",
            "description": "What it is",
            "properties": ["Special properties"],
            "value": gold value
        }
    ]
}"#
        ),
        template!(
            keys::CONTEXT_SUMMARY_SYSTEM,
            TemplateGroup::ContextSummary,
            [],
            r#"Summarize the following knowledge graph data into natural language context
for use in an AI prompt. Be concise but include all relevant relationships and facts."#
        ),
        template!(
            keys::CONTEXT_SUMMARY_USER,
            TemplateGroup::ContextSummary,
            ["nodes", "edges"],
            r#"Summarize this knowledge graph data:

NODES:
{nodes}

RELATIONSHIPS:
{edges}

Create a concise natural language summary (max 500 words) that captures:
1. Key entities and their types
2. Important relationships between entities
3. Recent events and their consequences
4. Current state of the world"#
        ),
    ];

    templates
        .into_iter()
        .map(|template| (template.key, template))
        .collect()
});

/// Look up a template by key.
pub fn get(key: &str) -> Result<&'static PromptTemplate, PromptError> {
    CATALOG
        .get(key)
        .ok_or_else(|| PromptError::UnknownTemplate(key.to_string()))
}

/// All registered template keys, sorted.
pub fn template_keys() -> Vec<&'static str> {
    CATALOG.keys().copied().collect()
}

/// Render a template. Every declared slot must be supplied; extra values
/// are ignored. Substitution is literal, so JSON braces in template bodies
/// pass through untouched.
pub fn render(key: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
    let template = get(key)?;
    let mut output = template.text.to_string();
    for slot in template.slots {
        let value = values
            .iter()
            .find(|(name, _)| name == slot)
            .map(|(_, value)| *value)
            .ok_or_else(|| PromptError::SlotMissing {
                template: key.to_string(),
                slot: (*slot).to_string(),
            })?;
        output = output.replace(&format!("{{{slot}}}"), value);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_declared_slot_appears_in_its_template() {
        for key in template_keys() {
            let template = get(key).expect("template");
            for slot in template.slots {
                assert!(
                    template.text.contains(&format!("{{{slot}}}")),
                    "template {key} never uses slot {slot}"
                );
            }
        }
    }

    #[test]
    fn render_substitutes_all_slots() {
        let output = render(
            keys::RECAP_SYSTEM,
            &[("genre", "fantasy"), ("tone", "epic")],
        )
        .expect("render");
        assert!(output.contains("fantasy campaign"));
        assert!(output.contains("The tone is epic."));
        assert!(!output.contains('{'));
    }

    #[test]
    fn missing_slot_is_an_error() {
        let err = render(keys::RECAP_SYSTEM, &[("genre", "fantasy")]).expect_err("missing slot");
        assert_eq!(
            err,
            PromptError::SlotMissing {
                template: keys::RECAP_SYSTEM.to_string(),
                slot: "tone".to_string(),
            }
        );
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(matches!(
            render("nope.nothing", &[]),
            Err(PromptError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn json_braces_survive_substitution() {
        let output = render(
            keys::NARRATIVE_USER,
            &[("player_action", "open the door"), ("additional_context", "None")],
        )
        .expect("render");
        assert!(output.contains("\"narrative\":"));
        assert!(output.contains("open the door"));
    }

    #[test]
    fn catalog_covers_all_groups() {
        let groups: Vec<TemplateGroup> = template_keys()
            .into_iter()
            .filter_map(|key| get(key).ok())
            .map(|template| template.group)
            .collect();
        for group in [
            TemplateGroup::Narrative,
            TemplateGroup::Opening,
            TemplateGroup::NpcGeneration,
            TemplateGroup::NpcDialogue,
            TemplateGroup::EncounterGeneration,
            TemplateGroup::CombatAction,
            TemplateGroup::LocationGeneration,
            TemplateGroup::Recap,
            TemplateGroup::ItemGeneration,
            TemplateGroup::ContextSummary,
        ] {
            assert!(groups.contains(&group), "missing group {group:?}");
        }
    }
}
