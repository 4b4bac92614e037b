use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::character::{Character, CharacterId};

/// Deck entry as recorded in `summary.json`; portraits are reduced to a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckEntry {
    pub id: CharacterId,
    pub name: String,
    pub title: String,
    pub has_portrait: bool,
}

impl From<&Character> for DeckEntry {
    fn from(character: &Character) -> Self {
        Self {
            id: character.id,
            name: character.name.clone(),
            title: character.title.clone(),
            has_portrait: character.has_portrait(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub characters_drafted: u64,
    pub deck: Vec<DeckEntry>,
}

impl SessionSummary {
    pub fn new(
        session_id: impl Into<String>,
        started_at: impl Into<String>,
        characters_drafted: u64,
        deck: &[Character],
    ) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: started_at.into(),
            finished_at: now_utc_iso(),
            characters_drafted,
            deck: deck.iter().map(DeckEntry::from).collect(),
        }
    }
}

pub fn write_summary(
    path: &Path,
    summary: &SessionSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert(
        "deck_size".to_string(),
        Value::Number(summary.deck.len().into()),
    );
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
