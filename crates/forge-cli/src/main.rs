use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use forge_contracts::character::{Character, DISPLAYED_SKILLS};
use forge_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use forge_contracts::events::{
    EventWriter, DECK_SAVED, GENERATION_DISCARDED, GENERATION_FAILED, GENERATION_STARTED,
    GENERATION_SUCCEEDED, SESSION_FINISHED, SESSION_STARTED,
};
use forge_contracts::models::ModelSelector;
use forge_contracts::session::{Action, GenerationKind, Outcome, Store};
use forge_contracts::summary::{now_utc_iso, write_summary, SessionSummary};
use forge_engine::{
    default_generator_registry, Completion, CompletionValue, Dispatcher, GenerationSettings,
    DEFAULT_PROVIDER, DEFAULT_REQUEST_TIMEOUT_S,
};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "forge-rs", version, about = "Fantasy TCG character forge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: summon, illustrate, rewrite and collect cards.
    Forge(ForgeArgs),
    /// Draft one character and print it as JSON.
    Draft(DraftArgs),
}

#[derive(Debug, Parser)]
struct GeneratorArgs {
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_S)]
    timeout: f64,
}

#[derive(Debug, Parser)]
struct ForgeArgs {
    /// Directory for `events.jsonl` and `summary.json`. Nothing is written without it.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Event log path; defaults to `<out>/events.jsonl` when `--out` is given.
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    generator: GeneratorArgs,
}

#[derive(Debug, Parser)]
struct DraftArgs {
    /// Also paint the portrait before printing.
    #[arg(long)]
    portrait: bool,
    #[command(flatten)]
    generator: GeneratorArgs,
}

const LOG_ENV: &str = "FORGE_LOG";
const STAT_BAR_CELLS: i64 = 20;
const EMPTY_WORKBENCH: &str = "The workbench is empty. Forge a new card to begin (/summon).";

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("forge-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Forge(args) => {
            run_forge(args)?;
            Ok(0)
        }
        Command::Draft(args) => run_draft(args),
    }
}

fn build_dispatcher(args: &GeneratorArgs) -> Result<(Dispatcher, ModelSelector)> {
    let generator = default_generator_registry().require(&args.provider)?;
    let selector = ModelSelector::new(None);
    let resolved = GenerationSettings::resolve(
        &selector,
        &args.provider,
        args.text_model.as_deref(),
        args.image_model.as_deref(),
        args.timeout,
    )?;
    for warning in &resolved.warnings {
        eprintln!("{warning}");
    }
    Ok((Dispatcher::new(generator, resolved.settings), selector))
}

fn run_draft(args: DraftArgs) -> Result<i32> {
    let (dispatcher, _) = build_dispatcher(&args.generator)?;
    let mut store = Store::new();

    let mut kinds = vec![GenerationKind::Draft];
    if args.portrait {
        kinds.push(GenerationKind::Portrait);
    }
    for kind in kinds {
        let Outcome::Started(ticket) = store.dispatch(Action::Begin(kind)) else {
            bail!("could not start {kind}");
        };
        let completion = dispatcher.run_blocking(ticket, store.current());
        let failure = completion.outcome.as_ref().err().cloned();
        if let (Outcome::Failed(kind), Some(err)) =
            (store.dispatch(completion.into_action()), failure)
        {
            bail!("{} ({err})", kind.failure_message());
        }
    }

    let Some(character) = store.current() else {
        bail!("no character was drafted");
    };
    println!("{}", serde_json::to_string_pretty(character)?);
    Ok(0)
}

/// Everything the REPL's main thread waits on.
enum Inbox {
    Line(String),
    Eof,
    InputError(io::Error),
    Completion(Completion),
}

impl From<Completion> for Inbox {
    fn from(completion: Completion) -> Self {
        Inbox::Completion(completion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ForgeSession {
    store: Store,
    dispatcher: Dispatcher,
    selector: ModelSelector,
    events: EventWriter,
    inbox: mpsc::Sender<Inbox>,
    started_at: String,
    characters_drafted: u64,
    summary_path: Option<PathBuf>,
    timeout_s: f64,
}

fn run_forge(args: ForgeArgs) -> Result<()> {
    let (dispatcher, selector) = build_dispatcher(&args.generator)?;
    let session_id = uuid::Uuid::new_v4().to_string();
    let events_path = args
        .events
        .clone()
        .or_else(|| args.out.as_ref().map(|out| out.join("events.jsonl")));
    let events = match events_path {
        Some(path) => EventWriter::new(path, session_id),
        None => EventWriter::disabled(session_id),
    };

    let (tx, rx) = mpsc::channel::<Inbox>();
    spawn_stdin_reader(tx.clone());

    let mut session = ForgeSession {
        store: Store::new(),
        dispatcher,
        selector,
        events,
        inbox: tx,
        started_at: now_utc_iso(),
        characters_drafted: 0,
        summary_path: args.out.as_ref().map(|out| out.join("summary.json")),
        timeout_s: args.generator.timeout,
    };
    run_session(&mut session, &rx)
}

/// Drives the session until quit or end of input. The session is finished even
/// when the loop fails, so the event log and summary are still written.
fn run_session(session: &mut ForgeSession, rx: &mpsc::Receiver<Inbox>) -> Result<()> {
    session.start()?;
    let looped = session_loop(session, rx);
    let finished = session.finish();
    looped.and(finished)
}

fn session_loop(session: &mut ForgeSession, rx: &mpsc::Receiver<Inbox>) -> Result<()> {
    let mut closing = false;
    prompt()?;
    while let Ok(message) = rx.recv() {
        match message {
            Inbox::Line(line) => {
                if session.handle_line(&line)? == Flow::Quit {
                    break;
                }
            }
            Inbox::Completion(completion) => session.on_completion(completion)?,
            Inbox::Eof => {
                closing = true;
                if session.store.state().in_flight.any_pending() {
                    println!("Waiting for pending generations...");
                }
            }
            Inbox::InputError(err) => return Err(err).context("failed to read stdin"),
        }
        if closing {
            if !session.store.state().in_flight.any_pending() {
                break;
            }
        } else {
            prompt()?;
        }
    }
    Ok(())
}

fn spawn_stdin_reader(tx: mpsc::Sender<Inbox>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let input = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(Inbox::Line(input)).is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    let _ = tx.send(Inbox::InputError(err));
                    return;
                }
            }
        }
        let _ = tx.send(Inbox::Eof);
    });
}

fn prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush()?;
    Ok(())
}

impl ForgeSession {
    fn start(&mut self) -> Result<()> {
        let settings = self.dispatcher.settings();
        self.events.emit(
            SESSION_STARTED,
            json_object(json!({
                "provider": settings.provider,
                "text_model": settings.text_model,
                "image_model": settings.image_model,
            })),
        )?;
        println!("Forge ready ({}). Type /help for commands.", settings.provider);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.events.emit(
            SESSION_FINISHED,
            json_object(json!({
                "characters_drafted": self.characters_drafted,
                "deck_size": self.store.deck().len(),
            })),
        )?;
        if let Some(path) = self.summary_path.as_ref() {
            let summary = SessionSummary::new(
                self.events.session_id(),
                self.started_at.clone(),
                self.characters_drafted,
                self.store.deck(),
            );
            let mut extra = Map::new();
            extra.insert(
                "provider".to_string(),
                Value::String(self.dispatcher.provider().to_string()),
            );
            write_summary(path, &summary, Some(&extra))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Session summary written to {}", path.display());
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let intent = parse_intent(line);
        match intent.action.as_str() {
            "noop" => {}
            "summon" => self.begin(GenerationKind::Draft)?,
            "portrait" => self.begin(GenerationKind::Portrait)?,
            "backstory" => self.begin(GenerationKind::Backstory)?,
            "save" => self.save()?,
            "show" => self.show(),
            "deck" => println!("{}", render_deck(self.store.deck())),
            "dismiss" => {
                if self.store.dispatch(Action::DismissError) == Outcome::ErrorDismissed {
                    println!("Dismissed.");
                } else {
                    println!("Nothing to dismiss.");
                }
            }
            "status" => println!("{}", self.status()),
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            "quit" => return Ok(Flow::Quit),
            "set_text_model" | "set_image_model" => self.set_model(&intent)?,
            "export_portrait" => self.export_portrait(&intent)?,
            _ => println!("{}", unknown_hint(&intent)),
        }
        Ok(Flow::Continue)
    }

    fn begin(&mut self, kind: GenerationKind) -> Result<()> {
        match self.store.dispatch(Action::Begin(kind)) {
            Outcome::Started(ticket) => {
                let subject = match kind {
                    GenerationKind::Draft => None,
                    GenerationKind::Portrait | GenerationKind::Backstory => {
                        self.store.current().cloned()
                    }
                };
                let settings = self.dispatcher.settings();
                let model = match kind {
                    GenerationKind::Portrait => &settings.image_model,
                    GenerationKind::Draft | GenerationKind::Backstory => &settings.text_model,
                };
                self.events.emit(
                    GENERATION_STARTED,
                    json_object(json!({
                        "kind": kind,
                        "request_id": ticket.request_id,
                        "character_id": ticket.target.map(|id| id.to_string()),
                        "provider": settings.provider,
                        "model": model,
                    })),
                )?;
                println!("{}", pending_label(kind));
                self.dispatcher.spawn(ticket, subject, self.inbox.clone());
            }
            Outcome::Busy(kind) => println!("Still {}; wait for it to finish.", busy_label(kind)),
            Outcome::NoTarget(_) => println!("{EMPTY_WORKBENCH}"),
            other => tracing::debug!(?other, "unexpected outcome for begin"),
        }
        Ok(())
    }

    fn on_completion(&mut self, completion: Completion) -> Result<()> {
        let ticket = completion.ticket;
        let elapsed_ms = completion.elapsed.as_millis() as u64;
        let mut detail = Map::new();
        match &completion.outcome {
            Ok(CompletionValue::Character(character)) => {
                detail.insert("character_id".to_string(), json!(character.id.to_string()));
                detail.insert("name".to_string(), json!(character.name));
            }
            Ok(CompletionValue::Portrait(url)) => {
                let bytes = decode_data_uri(url).map(|(_, bytes)| bytes.len()).ok();
                detail.insert("image_bytes".to_string(), json!(bytes));
            }
            Ok(CompletionValue::Backstory(bio)) => {
                detail.insert("bio_chars".to_string(), json!(bio.chars().count()));
            }
            Err(err) => {
                detail.insert("error_code".to_string(), json!(err.code()));
                detail.insert("error".to_string(), json!(err.to_string()));
            }
        }
        let mut payload = json_object(json!({
            "kind": ticket.kind,
            "request_id": ticket.request_id,
            "provider": completion.provider,
            "elapsed_ms": elapsed_ms,
        }));
        payload.extend(detail);

        println!();
        match self.store.dispatch(completion.into_action()) {
            Outcome::Applied(kind) => {
                if kind == GenerationKind::Draft {
                    self.characters_drafted += 1;
                }
                self.events.emit(GENERATION_SUCCEEDED, payload)?;
                self.show();
            }
            Outcome::Failed(kind) => {
                self.events.emit(GENERATION_FAILED, payload)?;
                println!("! {} (/dismiss to clear)", kind.failure_message());
            }
            Outcome::Discarded(kind) => {
                self.events.emit(GENERATION_DISCARDED, payload)?;
                tracing::debug!(%kind, request_id = ticket.request_id, "stale completion discarded");
            }
            other => tracing::debug!(?other, "unexpected outcome for completion"),
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        match self.store.dispatch(Action::SaveCurrent) {
            Outcome::Saved(id) => {
                self.events.emit(
                    DECK_SAVED,
                    json_object(json!({
                        "character_id": id.to_string(),
                        "deck_size": self.store.deck().len(),
                    })),
                )?;
                println!("Added to Deck ({}).", self.store.deck().len());
            }
            Outcome::AlreadySaved(_) => println!("Already in your deck."),
            Outcome::NothingToSave => println!("{EMPTY_WORKBENCH}"),
            other => tracing::debug!(?other, "unexpected outcome for save"),
        }
        Ok(())
    }

    fn show(&self) {
        if let Some(error) = self.store.error() {
            println!("! {error}");
        }
        let pending: Vec<GenerationKind> = GenerationKind::ALL
            .into_iter()
            .filter(|kind| self.store.is_pending(*kind))
            .collect();
        for kind in &pending {
            println!("({})", busy_label(*kind));
        }
        match self.store.current() {
            Some(character) => {
                println!("{}", render_card(character, self.store.is_current_saved()));
            }
            None if pending.contains(&GenerationKind::Draft) => {}
            None => println!("{EMPTY_WORKBENCH}"),
        }
    }

    fn status(&self) -> String {
        let settings = self.dispatcher.settings();
        let pending: Vec<&str> = GenerationKind::ALL
            .into_iter()
            .filter(|kind| self.store.is_pending(*kind))
            .map(GenerationKind::label)
            .collect();
        let mut lines = vec![
            format!("provider: {}", settings.provider),
            format!("text model: {}", settings.text_model),
            format!("image model: {}", settings.image_model),
            format!(
                "current: {}",
                self.store
                    .current()
                    .map(|character| character.name.as_str())
                    .unwrap_or("none")
            ),
            format!("deck: {}", self.store.deck().len()),
            format!(
                "pending: {}",
                if pending.is_empty() {
                    "none".to_string()
                } else {
                    pending.join(", ")
                }
            ),
        ];
        if let Some(error) = self.store.error() {
            lines.push(format!("error: {error}"));
        }
        if let Some(path) = self.events.path() {
            lines.push(format!("events: {}", path.display()));
        }
        lines.join("\n")
    }

    fn set_model(&mut self, intent: &Intent) -> Result<()> {
        let requested = value_as_non_empty_string(intent.command_args.get("model"));
        let for_text = intent.action == "set_text_model";
        let current = self.dispatcher.settings().clone();
        let Some(requested) = requested else {
            let model = if for_text {
                &current.text_model
            } else {
                &current.image_model
            };
            println!("Current model: {model}");
            return Ok(());
        };

        let (text_model, image_model) = if for_text {
            (requested.as_str(), current.image_model.as_str())
        } else {
            (current.text_model.as_str(), requested.as_str())
        };
        let resolved = GenerationSettings::resolve(
            &self.selector,
            &current.provider,
            Some(text_model),
            Some(image_model),
            self.timeout_s,
        )?;
        for warning in &resolved.warnings {
            println!("{warning}");
        }
        let model = if for_text {
            resolved.settings.text_model.clone()
        } else {
            resolved.settings.image_model.clone()
        };
        self.dispatcher.set_settings(resolved.settings);
        if for_text {
            println!("Text model set to {model}");
        } else {
            println!("Image model set to {model}");
        }
        Ok(())
    }

    fn export_portrait(&self, intent: &Intent) -> Result<()> {
        let Some(path) = value_as_non_empty_string(intent.command_args.get("path")) else {
            println!("/portrait_out requires a path");
            return Ok(());
        };
        let Some(url) = self
            .store
            .current()
            .and_then(|character| character.image_url.as_deref())
        else {
            println!("No portrait yet. Use /portrait first.");
            return Ok(());
        };
        let path = PathBuf::from(path);
        let written = write_portrait(url, &path)?;
        println!("Portrait written to {} ({written} bytes)", path.display());
        Ok(())
    }
}

fn pending_label(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::Draft => "Forging...",
        GenerationKind::Portrait => "Painting the portrait...",
        GenerationKind::Backstory => "Rewriting the scroll...",
    }
}

fn busy_label(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::Draft => "forging a card",
        GenerationKind::Portrait => "painting the portrait",
        GenerationKind::Backstory => "rewriting the backstory",
    }
}

fn unknown_hint(intent: &Intent) -> String {
    let command = value_as_non_empty_string(intent.command_args.get("command"));
    match command {
        Some(command) => format!("Unknown command: /{command}. Type /help for commands."),
        None => "Commands start with '/'. Try /summon, or /help for the full list.".to_string(),
    }
}

fn render_card(character: &Character, saved: bool) -> String {
    let rule = "=".repeat(44);
    let out_of_range = character.tcg_stats.out_of_range();
    let stat_line = |label: &str, key: &str, value: i64| {
        let flag = if out_of_range.iter().any(|name| *name == key) {
            " (!)"
        } else {
            ""
        };
        format!("{label:<9}{} {value}{flag}", stat_bar(value))
    };

    let mut lines = vec![
        rule.clone(),
        format!("{}  [mana {}]", character.name, character.tcg_stats.mana),
        character.title.clone(),
        portrait_line(character),
        format!("{} / {}", character.race, character.character_class),
        format!("Alignment: {}", character.alignment),
        String::new(),
        stat_line("Health", "health", character.tcg_stats.health),
        stat_line("Mana", "mana", character.tcg_stats.mana),
        stat_line("Strength", "strength", character.tcg_stats.strength),
        String::new(),
    ];
    for skill in character.displayed_skills() {
        lines.push(format!("* {skill}"));
    }
    if character.skills.len() > DISPLAYED_SKILLS {
        lines.push(format!(
            "  (+{} more)",
            character.skills.len() - DISPLAYED_SKILLS
        ));
    }
    lines.push(format!("\"{}\"", character.bio));
    lines.push(if saved {
        "[Added to Deck]".to_string()
    } else {
        "/save to add to your deck".to_string()
    });
    lines.push(rule);
    lines.join("\n")
}

/// Fill is `value / 20` of the bar, clamped to empty/full.
fn stat_bar(value: i64) -> String {
    let filled = value.clamp(0, STAT_BAR_CELLS) as usize;
    let empty = STAT_BAR_CELLS as usize - filled;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(empty))
}

fn portrait_line(character: &Character) -> String {
    match character.image_url.as_deref() {
        None => "[ no portrait yet: /portrait ]".to_string(),
        Some(url) => match decode_data_uri(url) {
            Ok((mime, bytes)) => format!("[ portrait: {mime}, {} bytes ]", bytes.len()),
            Err(_) => "[ portrait: unreadable ]".to_string(),
        },
    }
}

fn render_deck(deck: &[Character]) -> String {
    if deck.is_empty() {
        return "My Deck (0)\nNo cards collected yet.".to_string();
    }
    let mut lines = vec![format!("My Deck ({})", deck.len())];
    for (idx, card) in deck.iter().enumerate() {
        lines.push(format!(
            "{:>3}. {:<16} {} {}  STR {} HP {}{}",
            idx + 1,
            card.name,
            card.race,
            card.character_class,
            card.tcg_stats.strength,
            card.tcg_stats.health,
            if card.has_portrait() { "  [art]" } else { "" }
        ));
    }
    lines.join("\n")
}

/// Splits a `data:{mime};base64,{payload}` URI into mime and decoded bytes.
fn decode_data_uri(url: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = url.strip_prefix("data:") else {
        bail!("not a data URI");
    };
    let Some((header, payload)) = rest.split_once(',') else {
        bail!("data URI has no payload");
    };
    let Some(mime) = header.strip_suffix(";base64") else {
        bail!("data URI is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim())
        .context("invalid base64 in data URI")?;
    let mime = if mime.is_empty() { "image/png" } else { mime };
    Ok((mime.to_string(), bytes))
}

fn write_portrait(url: &str, path: &Path) -> Result<usize> {
    let (_, bytes) = decode_data_uri(url)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(bytes.len())
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
