use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const HEALTH_RANGE: RangeInclusive<i64> = 1..=50;
pub const MANA_RANGE: RangeInclusive<i64> = 1..=50;
pub const STRENGTH_RANGE: RangeInclusive<i64> = 1..=20;

/// Number of skills a card face has room for.
pub const DISPLAYED_SKILLS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CharacterId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcgStats {
    pub health: i64,
    pub mana: i64,
    pub strength: i64,
}

impl TcgStats {
    /// Stats outside the range the draft request asks for. A display hint, never
    /// a validation failure.
    pub fn out_of_range(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !HEALTH_RANGE.contains(&self.health) {
            out.push("health");
        }
        if !MANA_RANGE.contains(&self.mana) {
            out.push("mana");
        }
        if !STRENGTH_RANGE.contains(&self.strength) {
            out.push("strength");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub title: String,
    pub character_class: String,
    pub race: String,
    pub alignment: String,
    pub bio: String,
    pub skills: Vec<String>,
    pub tcg_stats: TcgStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Character {
    pub fn displayed_skills(&self) -> &[String] {
        let end = self.skills.len().min(DISPLAYED_SKILLS);
        &self.skills[..end]
    }

    pub fn has_portrait(&self) -> bool {
        self.image_url
            .as_deref()
            .map(|value| !value.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftSchemaError {
    #[error("draft payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("draft payload must be a JSON object")]
    NotAnObject,
    #[error("draft payload is missing field '{0}'")]
    MissingField(&'static str),
    #[error("draft field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Validated structured output of a character draft request: every
/// [`Character`] field except the locally minted id and the portrait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterDraft {
    pub name: String,
    pub title: String,
    pub character_class: String,
    pub race: String,
    pub alignment: String,
    pub bio: String,
    pub skills: Vec<String>,
    pub tcg_stats: TcgStats,
}

impl CharacterDraft {
    pub fn from_json_text(raw: &str) -> Result<Self, DraftSchemaError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|err| DraftSchemaError::InvalidJson(err.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, DraftSchemaError> {
        let object = value.as_object().ok_or(DraftSchemaError::NotAnObject)?;
        let stats = required(object, "tcgStats")?
            .as_object()
            .ok_or(DraftSchemaError::WrongType {
                field: "tcgStats",
                expected: "an object",
            })?;

        Ok(Self {
            name: required_string(object, "name")?,
            title: required_string(object, "title")?,
            character_class: required_string(object, "characterClass")?,
            race: required_string(object, "race")?,
            alignment: required_string(object, "alignment")?,
            bio: required_string(object, "bio")?,
            skills: required_string_list(object, "skills")?,
            tcg_stats: TcgStats {
                health: required_integer(stats, "health")?,
                mana: required_integer(stats, "mana")?,
                strength: required_integer(stats, "strength")?,
            },
        })
    }

    pub fn into_character(self, id: CharacterId) -> Character {
        Character {
            id,
            name: self.name,
            title: self.title,
            character_class: self.character_class,
            race: self.race,
            alignment: self.alignment,
            bio: self.bio,
            skills: self.skills,
            tcg_stats: self.tcg_stats,
            image_url: None,
        }
    }
}

fn required<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, DraftSchemaError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DraftSchemaError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn required_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<String, DraftSchemaError> {
    required(object, field)?
        .as_str()
        .map(|value| value.trim().to_string())
        .ok_or(DraftSchemaError::WrongType {
            field,
            expected: "a string",
        })
}

fn required_string_list(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, DraftSchemaError> {
    let wrong_type = DraftSchemaError::WrongType {
        field,
        expected: "an array of strings",
    };
    let items = required(object, field)?
        .as_array()
        .ok_or_else(|| wrong_type.clone())?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|value| value.trim().to_string())
                .ok_or_else(|| wrong_type.clone())
        })
        .collect()
}

fn required_integer(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<i64, DraftSchemaError> {
    let value = required(object, field)?;
    if let Some(int) = value.as_i64() {
        return Ok(int);
    }
    // Models occasionally emit `30.0` for integer schema fields.
    if let Some(float) = value.as_f64() {
        if float.fract() == 0.0 && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
            return Ok(float as i64);
        }
    }
    Err(DraftSchemaError::WrongType {
        field,
        expected: "an integer",
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{Character, CharacterDraft, CharacterId, DraftSchemaError, TcgStats};

    fn thorne_payload() -> Value {
        json!({
            "name": "Thorne",
            "title": "The Frostwarden",
            "characterClass": "Paladin",
            "race": "Dwarf",
            "alignment": "Lawful Good",
            "bio": "  Sworn to the glacier halls.  ",
            "skills": ["Frost Bolt", "Shield Wall"],
            "tcgStats": { "health": 30, "mana": 10, "strength": 7 }
        })
    }

    #[test]
    fn draft_parses_and_trims_fields() -> anyhow::Result<()> {
        let draft = CharacterDraft::from_json_text(&thorne_payload().to_string())?;
        assert_eq!(draft.name, "Thorne");
        assert_eq!(draft.bio, "Sworn to the glacier halls.");
        assert_eq!(draft.skills, vec!["Frost Bolt", "Shield Wall"]);
        assert_eq!(
            draft.tcg_stats,
            TcgStats {
                health: 30,
                mana: 10,
                strength: 7
            }
        );
        Ok(())
    }

    #[test]
    fn draft_reports_missing_and_mistyped_fields() {
        let mut payload = thorne_payload();
        if let Some(object) = payload.as_object_mut() {
            object.remove("race");
        }
        assert_eq!(
            CharacterDraft::from_value(&payload),
            Err(DraftSchemaError::MissingField("race"))
        );

        let mut payload = thorne_payload();
        payload["tcgStats"]["mana"] = json!("ten");
        assert_eq!(
            CharacterDraft::from_value(&payload),
            Err(DraftSchemaError::WrongType {
                field: "mana",
                expected: "an integer"
            })
        );

        let mut payload = thorne_payload();
        payload["skills"] = json!(["Frost Bolt", 3]);
        assert!(matches!(
            CharacterDraft::from_value(&payload),
            Err(DraftSchemaError::WrongType { field: "skills", .. })
        ));

        assert_eq!(
            CharacterDraft::from_value(&json!(["not", "an", "object"])),
            Err(DraftSchemaError::NotAnObject)
        );
        assert!(matches!(
            CharacterDraft::from_json_text("{\"name\": "),
            Err(DraftSchemaError::InvalidJson(_))
        ));
    }

    #[test]
    fn draft_accepts_integral_floats_and_out_of_range_stats() -> anyhow::Result<()> {
        let mut payload = thorne_payload();
        payload["tcgStats"] = json!({ "health": 30.0, "mana": -4, "strength": 99 });
        let draft = CharacterDraft::from_value(&payload)?;
        assert_eq!(draft.tcg_stats.health, 30);
        assert_eq!(draft.tcg_stats.out_of_range(), vec!["mana", "strength"]);

        payload["tcgStats"]["health"] = json!(30.5);
        assert!(CharacterDraft::from_value(&payload).is_err());
        Ok(())
    }

    #[test]
    fn character_serializes_with_wire_field_names() -> anyhow::Result<()> {
        let id: CharacterId = "9f0d5a2e-3c1b-4d8e-9a57-1c2b3d4e5f60".parse()?;
        let character = CharacterDraft::from_value(&thorne_payload())?.into_character(id);
        let value = serde_json::to_value(&character)?;
        assert_eq!(value["id"], json!("9f0d5a2e-3c1b-4d8e-9a57-1c2b3d4e5f60"));
        assert_eq!(value["characterClass"], json!("Paladin"));
        assert_eq!(value["tcgStats"]["strength"], json!(7));
        assert!(value.get("imageUrl").is_none());

        let back: Character = serde_json::from_value(value)?;
        assert_eq!(back, character);
        Ok(())
    }

    #[test]
    fn displayed_skills_tolerates_any_count() -> anyhow::Result<()> {
        let mut character =
            CharacterDraft::from_value(&thorne_payload())?.into_character(CharacterId::new());
        character.skills = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(character.displayed_skills(), ["a", "b"]);
        character.skills.clear();
        assert!(character.displayed_skills().is_empty());
        assert!(!character.has_portrait());
        Ok(())
    }

    #[test]
    fn minted_ids_are_unique() {
        let ids: std::collections::HashSet<CharacterId> =
            (0..256).map(|_| CharacterId::new()).collect();
        assert_eq!(ids.len(), 256);
    }
}
