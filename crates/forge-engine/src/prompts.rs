use forge_contracts::character::Character;
use serde_json::{json, Value};

pub const DRAFT_INSTRUCTION: &str = "Generate a unique fantasy TCG card character. \
Stats should be balanced for a trading card game.";

/// Sampling temperature for drafts; above 1.0 to favor variety.
pub const DRAFT_TEMPERATURE: f64 = 1.1;

pub const PORTRAIT_ASPECT_RATIO: &str = "4:3";

const PORTRAIT_STYLE: &str =
    "High fantasy digital art, dynamic lighting, detailed background. Aspect ratio 4:3.";

/// Structured-output schema sent with draft requests (Gemini `responseSchema`).
pub fn draft_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING", "description": "The unique name of the character" },
            "title": { "type": "STRING", "description": "An epic title, e.g., 'The Firewalker'" },
            "characterClass": {
                "type": "STRING",
                "description": "Class like Mage, Rogue, Paladin, etc."
            },
            "race": { "type": "STRING", "description": "Race like Human, Elf, Dwarf, Orc, etc." },
            "alignment": {
                "type": "STRING",
                "description": "D&D style alignment, e.g., Chaotic Good"
            },
            "bio": {
                "type": "STRING",
                "description": "A short, engaging backstory (max 2 sentences)."
            },
            "skills": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "2 unique skills or spells"
            },
            "tcgStats": {
                "type": "OBJECT",
                "properties": {
                    "health": { "type": "INTEGER", "description": "Health points (1-50)" },
                    "mana": { "type": "INTEGER", "description": "Mana/Energy points (1-50)" },
                    "strength": { "type": "INTEGER", "description": "Attack strength (1-20)" }
                },
                "required": ["health", "mana", "strength"]
            }
        },
        "required": [
            "name",
            "characterClass",
            "race",
            "bio",
            "tcgStats",
            "title",
            "alignment",
            "skills"
        ]
    })
}

pub fn portrait_prompt(character: &Character) -> String {
    format!(
        "Fantasy trading card illustration.\n\
Subject: {}, a {} {}.\n\
Appearance: {}\n\
Style: {PORTRAIT_STYLE}",
        character.name, character.race, character.character_class, character.bio
    )
}

pub fn backstory_prompt(character: &Character) -> String {
    format!(
        "Rewrite the flavor text/backstory for this TCG card character.\n\
Name: {}\n\
Class: {}\n\
Keep it short, punchy, and atmospheric (max 2 sentences).",
        character.name, character.character_class
    )
}

#[cfg(test)]
mod tests {
    use forge_contracts::character::{Character, CharacterId, TcgStats};

    use super::{backstory_prompt, draft_response_schema, portrait_prompt};

    fn thorne() -> Character {
        Character {
            id: CharacterId::new(),
            name: "Thorne".to_string(),
            title: "The Frostwarden".to_string(),
            character_class: "Paladin".to_string(),
            race: "Dwarf".to_string(),
            alignment: "Lawful Good".to_string(),
            bio: "Sworn to the glacier halls.".to_string(),
            skills: vec!["Frost Bolt".to_string(), "Shield Wall".to_string()],
            tcg_stats: TcgStats {
                health: 30,
                mana: 10,
                strength: 7,
            },
            image_url: None,
        }
    }

    #[test]
    fn portrait_prompt_embeds_only_descriptive_fields() {
        let prompt = portrait_prompt(&thorne());
        assert!(prompt.contains("Subject: Thorne, a Dwarf Paladin."));
        assert!(prompt.contains("Appearance: Sworn to the glacier halls."));
        assert!(prompt.contains("Aspect ratio 4:3."));
        assert!(!prompt.contains("Frostwarden"));
        assert!(!prompt.contains("Lawful"));
    }

    #[test]
    fn backstory_prompt_uses_name_and_class() {
        let prompt = backstory_prompt(&thorne());
        assert!(prompt.contains("Name: Thorne\n"));
        assert!(prompt.contains("Class: Paladin\n"));
        assert!(!prompt.contains("glacier"));
        assert!(prompt.ends_with("(max 2 sentences)."));
    }

    #[test]
    fn schema_requires_every_card_field() {
        let schema = draft_response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .map(|rows| rows.iter().filter_map(|row| row.as_str()).collect())
            .unwrap_or_default();
        for field in [
            "name",
            "title",
            "characterClass",
            "race",
            "alignment",
            "bio",
            "skills",
            "tcgStats",
        ] {
            assert!(required.contains(&field), "missing {field}");
        }
        assert_eq!(
            schema["properties"]["tcgStats"]["properties"]["strength"]["type"],
            "INTEGER"
        );
    }
}
