use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use forge_contracts::character::{Character, CharacterDraft, CharacterId};
use forge_contracts::session::GenerationKind;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::GenerationError;
use crate::prompts::{backstory_prompt, portrait_prompt};
use crate::{CardGenerator, GenerationSettings};

const PORTRAIT_WIDTH: u32 = 64;
const PORTRAIT_HEIGHT: u32 = 48;

const NAMES: &[&str] = &["Thorne", "Vex", "Maelis", "Brannoc", "Ysolde", "Kestrel"];
const TITLES: &[&str] = &[
    "The Frostwarden",
    "The Ashen Veil",
    "Keeper of Tides",
    "The Hollow Crown",
];
const CLASSES: &[&str] = &["Paladin", "Mage", "Rogue", "Ranger", "Warlock", "Cleric"];
const RACES: &[&str] = &["Dwarf", "Elf", "Human", "Orc", "Tiefling", "Halfling"];
const ALIGNMENTS: &[&str] = &["Lawful Good", "Chaotic Good", "True Neutral", "Chaotic Evil"];
const SKILLS: &[&str] = &[
    "Frost Bolt",
    "Shield Wall",
    "Shadow Step",
    "Ember Lance",
    "Stone Skin",
    "Moonlit Volley",
];
const BACKSTORIES: &[&str] = &[
    "walks where the maps run out. Those who follow rarely return.",
    "traded a name for a blade. The blade has never missed.",
    "remembers the last war. Nobody else is left who does.",
];

/// Offline generator: deterministic per call sequence, no network, real ids.
#[derive(Debug, Default)]
pub struct DryrunGenerator {
    calls: AtomicU64,
    failing: BTreeSet<&'static str>,
}

impl DryrunGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator whose calls of the given kinds always fail.
    pub fn failing(kinds: &[GenerationKind]) -> Self {
        Self {
            calls: AtomicU64::new(0),
            failing: kinds.iter().map(|kind| kind.label()).collect(),
        }
    }

    fn next_seed(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed)
    }

    fn check(&self, kind: GenerationKind) -> Result<(), GenerationError> {
        if !self.failing.contains(kind.label()) {
            return Ok(());
        }
        Err(match kind {
            GenerationKind::Draft => GenerationError::EmptyResponse,
            GenerationKind::Portrait => GenerationError::NoImage,
            GenerationKind::Backstory => GenerationError::EmptyResponse,
        })
    }
}

impl CardGenerator for DryrunGenerator {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn draft_character(
        &self,
        settings: &GenerationSettings,
    ) -> Result<Character, GenerationError> {
        self.check(GenerationKind::Draft)?;
        let seed = self.next_seed();
        let digest = digest_bytes(&settings.text_model, seed);
        let pick = |list: &[&'static str], idx: usize| list[digest[idx] as usize % list.len()];
        let name = pick(NAMES, 0);
        let first_skill = digest[6] as usize % SKILLS.len();
        let skill_offset = 1 + digest[7] as usize % (SKILLS.len() - 1);
        let second_skill = (first_skill + skill_offset) % SKILLS.len();

        let payload = json!({
            "name": name,
            "title": pick(TITLES, 1),
            "characterClass": pick(CLASSES, 2),
            "race": pick(RACES, 3),
            "alignment": pick(ALIGNMENTS, 4),
            "bio": format!("{name} {}", pick(BACKSTORIES, 5)),
            "skills": [SKILLS[first_skill], SKILLS[second_skill]],
            "tcgStats": {
                "health": 1 + i64::from(digest[8]) % 50,
                "mana": 1 + i64::from(digest[9]) % 50,
                "strength": 1 + i64::from(digest[10]) % 20,
            },
        });
        let draft = CharacterDraft::from_value(&payload)?;
        Ok(draft.into_character(CharacterId::new()))
    }

    fn generate_portrait(
        &self,
        _settings: &GenerationSettings,
        character: &Character,
    ) -> Result<String, GenerationError> {
        self.check(GenerationKind::Portrait)?;
        let (r, g, b) = color_from_prompt(&portrait_prompt(character), self.next_seed());
        let image = RgbImage::from_pixel(PORTRAIT_WIDTH, PORTRAIT_HEIGHT, Rgb([r, g, b]));
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| {
                GenerationError::MalformedPayload(format!("png encode failed: {err}"))
            })?;
        Ok(format!(
            "data:image/png;base64,{}",
            BASE64.encode(bytes.into_inner())
        ))
    }

    fn rewrite_backstory(
        &self,
        _settings: &GenerationSettings,
        character: &Character,
    ) -> Result<String, GenerationError> {
        self.check(GenerationKind::Backstory)?;
        let digest = digest_bytes(&backstory_prompt(character), self.next_seed());
        let line = BACKSTORIES[digest[0] as usize % BACKSTORIES.len()];
        Ok(format!(
            "{} the {} {line} (scroll {})",
            character.name,
            character.character_class,
            hex::encode(&digest[..2])
        ))
    }
}

fn digest_bytes(text: &str, seed: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(seed.to_be_bytes());
    hasher.finalize().into()
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let digest = digest_bytes(prompt, seed);
    (digest[0], digest[1], digest[2])
}
