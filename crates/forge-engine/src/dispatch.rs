use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use forge_contracts::character::Character;
use forge_contracts::session::{Action, GenerationKind, RequestTicket};

use crate::error::GenerationError;
use crate::{CardGenerator, GenerationSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionValue {
    Character(Character),
    Portrait(String),
    Backstory(String),
}

/// Result of one generation call, tagged with the ticket it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub ticket: RequestTicket,
    pub provider: String,
    pub elapsed: Duration,
    pub outcome: Result<CompletionValue, GenerationError>,
}

impl Completion {
    pub fn into_action(self) -> Action {
        let ticket = self.ticket;
        match self.outcome {
            Ok(CompletionValue::Character(character)) => {
                Action::DraftSucceeded { ticket, character }
            }
            Ok(CompletionValue::Portrait(image_url)) => {
                Action::PortraitSucceeded { ticket, image_url }
            }
            Ok(CompletionValue::Backstory(bio)) => Action::BackstorySucceeded { ticket, bio },
            Err(_) => Action::Failed { ticket },
        }
    }
}

/// Runs generation calls for the session, each on its own worker thread.
pub struct Dispatcher {
    generator: Arc<dyn CardGenerator>,
    settings: GenerationSettings,
}

impl Dispatcher {
    pub fn new(generator: Arc<dyn CardGenerator>, settings: GenerationSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Applies to calls spawned afterwards; calls already running keep the
    /// settings they started with.
    pub fn set_settings(&mut self, settings: GenerationSettings) {
        self.settings = settings;
    }

    pub fn provider(&self) -> &str {
        self.generator.name()
    }

    /// Runs the call matching `ticket.kind` on the calling thread.
    ///
    /// `subject` is the character portrait/backstory calls describe; drafts
    /// ignore it.
    pub fn run_blocking(&self, ticket: RequestTicket, subject: Option<&Character>) -> Completion {
        execute(
            self.generator.as_ref(),
            &self.settings,
            ticket,
            subject,
        )
    }

    /// Runs the call on a new thread and sends its [`Completion`] to `tx`.
    ///
    /// Nothing is sent back if the receiving side has hung up.
    pub fn spawn<T>(
        &self,
        ticket: RequestTicket,
        subject: Option<Character>,
        tx: Sender<T>,
    ) -> thread::JoinHandle<()>
    where
        T: From<Completion> + Send + 'static,
    {
        let generator = Arc::clone(&self.generator);
        let settings = self.settings.clone();
        thread::spawn(move || {
            let completion = execute(generator.as_ref(), &settings, ticket, subject.as_ref());
            if tx.send(T::from(completion)).is_err() {
                tracing::debug!(
                    kind = %ticket.kind,
                    request_id = ticket.request_id,
                    "completion dropped; session already closed"
                );
            }
        })
    }
}

fn execute(
    generator: &dyn CardGenerator,
    settings: &GenerationSettings,
    ticket: RequestTicket,
    subject: Option<&Character>,
) -> Completion {
    let started = Instant::now();
    let outcome = match (ticket.kind, subject) {
        (GenerationKind::Draft, _) => generator
            .draft_character(settings)
            .map(CompletionValue::Character),
        (GenerationKind::Portrait, Some(character)) => generator
            .generate_portrait(settings, character)
            .map(CompletionValue::Portrait),
        (GenerationKind::Backstory, Some(character)) => generator
            .rewrite_backstory(settings, character)
            .map(|bio| CompletionValue::Backstory(bio.trim().to_string())),
        (GenerationKind::Portrait | GenerationKind::Backstory, None) => {
            Err(GenerationError::NoSubject)
        }
    };
    let elapsed = started.elapsed();

    match &outcome {
        Ok(_) => tracing::info!(
            provider = generator.name(),
            kind = %ticket.kind,
            request_id = ticket.request_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "generation succeeded"
        ),
        Err(err) => tracing::warn!(
            provider = generator.name(),
            kind = %ticket.kind,
            request_id = ticket.request_id,
            error_code = err.code(),
            error = %err,
            "generation failed"
        ),
    }

    Completion {
        ticket,
        provider: generator.name().to_string(),
        elapsed,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    use forge_contracts::session::{Action, GenerationKind, Outcome, Store};

    use super::{Completion, CompletionValue, Dispatcher};
    use crate::{DryrunGenerator, GenerationError, GenerationSettings};

    fn settings() -> GenerationSettings {
        GenerationSettings {
            provider: "dryrun".to_string(),
            text_model: "dryrun-text-1".to_string(),
            image_model: "dryrun-image-1".to_string(),
            temperature: 1.1,
            request_timeout: Duration::from_secs(1),
        }
    }

    fn begin(store: &mut Store, kind: GenerationKind) -> forge_contracts::session::RequestTicket {
        match store.dispatch(Action::Begin(kind)) {
            Outcome::Started(ticket) => ticket,
            other => panic!("expected {kind} to start, got {other:?}"),
        }
    }

    #[test]
    fn blocking_runs_flow_through_the_store() {
        let dispatcher = Dispatcher::new(Arc::new(DryrunGenerator::new()), settings());
        let mut store = Store::new();

        let ticket = begin(&mut store, GenerationKind::Draft);
        let completion = dispatcher.run_blocking(ticket, None);
        assert_eq!(completion.provider, "dryrun");
        assert_eq!(
            store.dispatch(completion.into_action()),
            Outcome::Applied(GenerationKind::Draft)
        );
        let drafted = store.current().cloned();
        assert!(drafted.is_some());

        let ticket = begin(&mut store, GenerationKind::Portrait);
        let completion = dispatcher.run_blocking(ticket, store.current());
        store.dispatch(completion.into_action());
        let current = store.current().cloned();
        assert_eq!(current.as_ref().map(|c| c.id), drafted.as_ref().map(|c| c.id));
        assert!(current
            .and_then(|c| c.image_url)
            .unwrap_or_default()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn failed_portrait_sets_error_without_touching_current() {
        let dispatcher = Dispatcher::new(
            Arc::new(DryrunGenerator::failing(&[GenerationKind::Portrait])),
            settings(),
        );
        let mut store = Store::new();
        let ticket = begin(&mut store, GenerationKind::Draft);
        store.dispatch(dispatcher.run_blocking(ticket, None).into_action());
        let before = store.current().cloned();

        let ticket = begin(&mut store, GenerationKind::Portrait);
        let completion = dispatcher.run_blocking(ticket, store.current());
        assert_eq!(completion.outcome, Err(GenerationError::NoImage));
        assert_eq!(
            store.dispatch(completion.into_action()),
            Outcome::Failed(GenerationKind::Portrait)
        );
        assert_eq!(store.current().cloned(), before);
        assert_eq!(
            store.error(),
            Some(GenerationKind::Portrait.failure_message())
        );
    }

    #[test]
    fn portrait_without_subject_fails() {
        let dispatcher = Dispatcher::new(Arc::new(DryrunGenerator::new()), settings());
        let ticket = forge_contracts::session::RequestTicket {
            kind: GenerationKind::Backstory,
            request_id: 7,
            target: None,
        };
        let completion = dispatcher.run_blocking(ticket, None);
        assert_eq!(completion.outcome, Err(GenerationError::NoSubject));
        assert_eq!(completion.into_action(), Action::Failed { ticket });
    }

    #[test]
    fn spawned_calls_report_over_the_channel() -> anyhow::Result<()> {
        let dispatcher = Dispatcher::new(Arc::new(DryrunGenerator::new()), settings());
        let mut store = Store::new();
        let (tx, rx) = mpsc::channel::<Completion>();

        let ticket = begin(&mut store, GenerationKind::Draft);
        dispatcher
            .spawn(ticket, None, tx.clone())
            .join()
            .map_err(|_| anyhow::anyhow!("draft worker panicked"))?;
        let completion = rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(completion.ticket, ticket);
        store.dispatch(completion.into_action());

        let portrait = begin(&mut store, GenerationKind::Portrait);
        let backstory = begin(&mut store, GenerationKind::Backstory);
        let subject = store.current().cloned();
        let handles = vec![
            dispatcher.spawn(portrait, subject.clone(), tx.clone()),
            dispatcher.spawn(backstory, subject, tx),
        ];
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("worker panicked"))?;
        }
        let mut kinds = Vec::new();
        for completion in rx.iter().take(2) {
            kinds.push(completion.ticket.kind);
            assert!(matches!(
                store.dispatch(completion.into_action()),
                Outcome::Applied(_)
            ));
        }
        assert!(kinds.contains(&GenerationKind::Portrait));
        assert!(kinds.contains(&GenerationKind::Backstory));
        assert!(!store.state().in_flight.any_pending());
        assert!(store.current().map(|c| c.has_portrait()).unwrap_or(false));
        Ok(())
    }

    #[test]
    fn completion_values_map_to_matching_actions() {
        let ticket = forge_contracts::session::RequestTicket {
            kind: GenerationKind::Backstory,
            request_id: 1,
            target: None,
        };
        let completion = Completion {
            ticket,
            provider: "dryrun".to_string(),
            elapsed: Duration::from_millis(3),
            outcome: Ok(CompletionValue::Backstory("Frost follows.".to_string())),
        };
        assert_eq!(
            completion.into_action(),
            Action::BackstorySucceeded {
                ticket,
                bio: "Frost follows.".to_string()
            }
        );
    }
}
