use crate::character::{Character, CharacterId};

use super::reducer::{reduce, Action, Outcome};
use super::state::{GenerationKind, SessionState};

/// Owns the session state; every mutation goes through [`Store::dispatch`].
#[derive(Debug, Clone, Default)]
pub struct Store {
    state: SessionState,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, action: Action) -> Outcome {
        let (next, outcome) = reduce(std::mem::take(&mut self.state), action);
        self.state = next;
        outcome
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current(&self) -> Option<&Character> {
        self.state.current.as_ref()
    }

    pub fn deck(&self) -> &[Character] {
        &self.state.deck
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn is_pending(&self, kind: GenerationKind) -> bool {
        self.state.in_flight.is_pending(kind)
    }

    pub fn is_saved(&self, id: CharacterId) -> bool {
        self.state.is_saved(id)
    }

    pub fn is_current_saved(&self) -> bool {
        self.state.is_current_saved()
    }

    /// Returns whether a new deck entry was appended.
    pub fn save_current(&mut self) -> bool {
        matches!(self.dispatch(Action::SaveCurrent), Outcome::Saved(_))
    }
}

#[cfg(test)]
mod tests {
    use crate::character::{Character, CharacterId, TcgStats};

    use super::super::state::GenerationKind;
    use super::super::reducer::{Action, Outcome};
    use super::Store;

    fn character(id: CharacterId, name: &str) -> Character {
        Character {
            id,
            name: name.to_string(),
            title: "The Unbroken".to_string(),
            character_class: "Mage".to_string(),
            race: "Elf".to_string(),
            alignment: "Chaotic Good".to_string(),
            bio: "Reads the stars backwards.".to_string(),
            skills: vec!["Frost Bolt".to_string(), "Shield Wall".to_string()],
            tcg_stats: TcgStats {
                health: 30,
                mana: 10,
                strength: 7,
            },
            image_url: None,
        }
    }

    fn draft(store: &mut Store, character: Character) {
        let Outcome::Started(ticket) = store.dispatch(Action::Begin(GenerationKind::Draft)) else {
            panic!("draft did not start");
        };
        assert_eq!(
            store.dispatch(Action::DraftSucceeded { ticket, character }),
            Outcome::Applied(GenerationKind::Draft)
        );
    }

    #[test]
    fn summon_portrait_save_scenario() -> anyhow::Result<()> {
        let id_a: CharacterId = "00000000-0000-4000-8000-00000000000a".parse()?;
        let id_b: CharacterId = "00000000-0000-4000-8000-00000000000b".parse()?;
        let mut store = Store::new();

        draft(&mut store, character(id_a, "Thorne"));
        let current = store.current().cloned();
        assert_eq!(current.as_ref().map(|c| c.name.as_str()), Some("Thorne"));
        assert!(current.map(|c| c.image_url.is_none()).unwrap_or(false));

        let Outcome::Started(ticket) = store.dispatch(Action::Begin(GenerationKind::Portrait))
        else {
            panic!("portrait did not start");
        };
        store.dispatch(Action::PortraitSucceeded {
            ticket,
            image_url: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        });
        let current = store.current().cloned();
        assert_eq!(current.as_ref().map(|c| c.id), Some(id_a));
        assert!(current
            .and_then(|c| c.image_url)
            .unwrap_or_default()
            .starts_with("data:image/png;base64,"));

        assert!(store.save_current());
        assert!(!store.save_current());
        assert_eq!(store.deck().len(), 1);
        assert_eq!(store.deck()[0].id, id_a);

        draft(&mut store, character(id_b, "Vex"));
        assert_eq!(store.current().map(|c| c.id), Some(id_b));
        assert_eq!(store.deck().len(), 1);
        assert!(store.is_saved(id_a));
        assert!(!store.is_current_saved());
        Ok(())
    }

    #[test]
    fn failed_portrait_leaves_current_untouched() -> anyhow::Result<()> {
        let id_a: CharacterId = "00000000-0000-4000-8000-00000000000a".parse()?;
        let mut store = Store::new();
        draft(&mut store, character(id_a, "Thorne"));
        let before = store.state().clone();

        let Outcome::Started(ticket) = store.dispatch(Action::Begin(GenerationKind::Portrait))
        else {
            panic!("portrait did not start");
        };
        assert!(store.is_pending(GenerationKind::Portrait));
        assert_eq!(
            store.dispatch(Action::Failed { ticket }),
            Outcome::Failed(GenerationKind::Portrait)
        );

        assert_eq!(store.current(), before.current.as_ref());
        assert_eq!(store.deck(), before.deck.as_slice());
        assert_eq!(
            store.error(),
            Some("The vision is clouded. Could not manifest the portrait.")
        );
        assert!(!store.is_pending(GenerationKind::Portrait));
        Ok(())
    }
}
