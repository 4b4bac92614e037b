use std::fmt;

use serde::Serialize;

use crate::character::{Character, CharacterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Draft,
    Portrait,
    Backstory,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 3] = [Self::Draft, Self::Portrait, Self::Backstory];

    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Portrait => "portrait",
            Self::Backstory => "backstory",
        }
    }

    /// User-facing message stored in the error slot when a call of this kind fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Draft => {
                "The summoning ritual failed. The spirits are silent. (Check your API Key)"
            }
            Self::Portrait => "The vision is clouded. Could not manifest the portrait.",
            Self::Backstory => "The ink has dried. Could not rewrite the scroll.",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifies one outstanding generation call.
///
/// `target` is the id of `current` when the call was issued; it is `None` for
/// drafts, which replace `current` instead of patching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub kind: GenerationKind,
    pub request_id: u64,
    pub target: Option<CharacterId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlight {
    pub draft: Option<RequestTicket>,
    pub portrait: Option<RequestTicket>,
    pub backstory: Option<RequestTicket>,
}

impl InFlight {
    pub fn get(&self, kind: GenerationKind) -> Option<&RequestTicket> {
        self.slot(kind).as_ref()
    }

    pub fn is_pending(&self, kind: GenerationKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn any_pending(&self) -> bool {
        GenerationKind::ALL
            .into_iter()
            .any(|kind| self.is_pending(kind))
    }

    pub(crate) fn slot(&self, kind: GenerationKind) -> &Option<RequestTicket> {
        match kind {
            GenerationKind::Draft => &self.draft,
            GenerationKind::Portrait => &self.portrait,
            GenerationKind::Backstory => &self.backstory,
        }
    }

    pub(crate) fn slot_mut(&mut self, kind: GenerationKind) -> &mut Option<RequestTicket> {
        match kind {
            GenerationKind::Draft => &mut self.draft,
            GenerationKind::Portrait => &mut self.portrait,
            GenerationKind::Backstory => &mut self.backstory,
        }
    }

    pub(crate) fn clear_all(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub current: Option<Character>,
    pub deck: Vec<Character>,
    pub in_flight: InFlight,
    pub error: Option<String>,
    pub next_request_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_saved(&self, id: CharacterId) -> bool {
        self.deck.iter().any(|card| card.id == id)
    }

    pub fn is_current_saved(&self) -> bool {
        self.current
            .as_ref()
            .map(|character| self.is_saved(character.id))
            .unwrap_or(false)
    }
}
