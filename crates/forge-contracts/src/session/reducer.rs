use crate::character::{Character, CharacterId};

use super::state::{GenerationKind, RequestTicket, SessionState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Begin(GenerationKind),
    DraftSucceeded {
        ticket: RequestTicket,
        character: Character,
    },
    PortraitSucceeded {
        ticket: RequestTicket,
        image_url: String,
    },
    BackstorySucceeded {
        ticket: RequestTicket,
        bio: String,
    },
    Failed {
        ticket: RequestTicket,
    },
    SaveCurrent,
    DismissError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Started(RequestTicket),
    Busy(GenerationKind),
    NoTarget(GenerationKind),
    Applied(GenerationKind),
    Failed(GenerationKind),
    Discarded(GenerationKind),
    Saved(CharacterId),
    AlreadySaved(CharacterId),
    NothingToSave,
    ErrorDismissed,
}

/// Applies one action to the session, returning the next state and what happened.
///
/// Completions are applied only while their ticket is still the one recorded for
/// their kind and, for portrait/backstory, while `current` is still the character
/// the call was issued for. Anything else is discarded without touching state.
pub fn reduce(mut state: SessionState, action: Action) -> (SessionState, Outcome) {
    let outcome = match action {
        Action::Begin(kind) => begin(&mut state, kind),
        Action::DraftSucceeded { ticket, character } => {
            if ticket.kind != GenerationKind::Draft || !is_live(&state, &ticket) {
                Outcome::Discarded(ticket.kind)
            } else {
                state.current = Some(character);
                state.in_flight.clear_all();
                state.error = None;
                Outcome::Applied(GenerationKind::Draft)
            }
        }
        Action::PortraitSucceeded { ticket, image_url } => {
            patch_current(&mut state, ticket, GenerationKind::Portrait, |character| {
                character.image_url = Some(image_url);
            })
        }
        Action::BackstorySucceeded { ticket, bio } => {
            patch_current(&mut state, ticket, GenerationKind::Backstory, |character| {
                character.bio = bio;
            })
        }
        Action::Failed { ticket } => {
            if !is_live(&state, &ticket) {
                Outcome::Discarded(ticket.kind)
            } else {
                *state.in_flight.slot_mut(ticket.kind) = None;
                state.error = Some(ticket.kind.failure_message().to_string());
                Outcome::Failed(ticket.kind)
            }
        }
        Action::SaveCurrent => save_current(&mut state),
        Action::DismissError => {
            state.error = None;
            Outcome::ErrorDismissed
        }
    };
    (state, outcome)
}

fn begin(state: &mut SessionState, kind: GenerationKind) -> Outcome {
    if state.in_flight.is_pending(kind) {
        return Outcome::Busy(kind);
    }
    let target = match kind {
        GenerationKind::Draft => None,
        GenerationKind::Portrait | GenerationKind::Backstory => {
            let Some(current) = state.current.as_ref() else {
                return Outcome::NoTarget(kind);
            };
            Some(current.id)
        }
    };
    if kind == GenerationKind::Draft {
        state.error = None;
        state.in_flight.clear_all();
    }

    state.next_request_id += 1;
    let ticket = RequestTicket {
        kind,
        request_id: state.next_request_id,
        target,
    };
    *state.in_flight.slot_mut(kind) = Some(ticket);
    Outcome::Started(ticket)
}

fn is_live(state: &SessionState, ticket: &RequestTicket) -> bool {
    if state.in_flight.get(ticket.kind) != Some(ticket) {
        return false;
    }
    match ticket.target {
        None => true,
        Some(target) => state
            .current
            .as_ref()
            .map(|current| current.id == target)
            .unwrap_or(false),
    }
}

fn patch_current(
    state: &mut SessionState,
    ticket: RequestTicket,
    expected: GenerationKind,
    patch: impl FnOnce(&mut Character),
) -> Outcome {
    if ticket.kind != expected || !is_live(state, &ticket) {
        return Outcome::Discarded(ticket.kind);
    }
    let Some(current) = state.current.as_mut() else {
        return Outcome::Discarded(ticket.kind);
    };
    patch(current);
    *state.in_flight.slot_mut(expected) = None;
    Outcome::Applied(expected)
}

fn save_current(state: &mut SessionState) -> Outcome {
    let Some(current) = state.current.as_ref() else {
        return Outcome::NothingToSave;
    };
    if state.is_saved(current.id) {
        return Outcome::AlreadySaved(current.id);
    }
    let snapshot = current.clone();
    let id = snapshot.id;
    state.deck.push(snapshot);
    Outcome::Saved(id)
}
