//! Interactive mode: a line-based chat loop with slash commands

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use futures::future::OptionFuture;
use oji_ai::{Attachment, Role};
use oji_chat::{
    ChatConfig, ChatEvent, ConnectionProbe, ConversationId, Orchestrator, ProbeHandle,
    ProbePresentation, ProbeState, ProbeStatus, SendOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::commands::{self, CommandResult, ConversationCommand, ModelCommand};

const WELCOME: &str = "Welcome to Oji\nHow can I help you today?";

type RunningRequest = JoinHandle<oji_chat::Result<SendOutcome>>;

pub struct Repl {
    orchestrator: Arc<Orchestrator>,
    probe: ConnectionProbe,
    config: ChatConfig,
    events: broadcast::Receiver<ChatEvent>,
    probe_rx: watch::Receiver<ProbeState>,
    running: Option<RunningRequest>,
    probe_handle: Option<ProbeHandle>,
    /// Generation of the last probe whose outcome was shown
    reported_probe: u64,
}

impl Repl {
    pub fn new(orchestrator: Arc<Orchestrator>, probe: ConnectionProbe, config: ChatConfig) -> Self {
        let events = orchestrator.subscribe();
        let probe_rx = probe.subscribe();
        Self {
            orchestrator,
            probe,
            config,
            events,
            probe_rx,
            running: None,
            probe_handle: None,
            reported_probe: 0,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        if io::IsTerminal::is_terminal(&io::stderr()) {
            eprintln!("oji ({} @ {})", self.config.model, self.config.base_url);
            eprintln!("Type /help for commands.");
            eprintln!();
        }
        println!("{}\n", WELCOME);
        prompt()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                // Events first so a finished request has printed everything
                // before its completion is handled
                biased;

                event = self.events.recv() => match event {
                    Ok(event) => self.print_event(event)?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Dropped chat events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                Some(joined) = OptionFuture::from(self.running.as_mut()), if self.running.is_some() => {
                    self.running = None;
                    match joined {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) if e.is_silent() => println!("[cancelled]"),
                        // Already shown through ChatEvent::Error
                        Ok(Err(e)) => tracing::debug!(error = %e, "Request failed"),
                        Err(e) => eprintln!("Error: request task failed: {}", e),
                    }
                    prompt()?;
                }

                changed = self.probe_rx.changed() => {
                    if changed.is_ok() {
                        self.report_probe()?;
                    }
                }

                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if !self.handle_line(&line)? {
                        break;
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    if !self.cancel_running() {
                        break;
                    }
                }
            }
        }

        self.cancel_running();
        Ok(())
    }

    /// Returns false when the loop should exit
    fn handle_line(&mut self, line: &str) -> anyhow::Result<bool> {
        let input = line.trim();

        if let Some(command) = commands::execute_command(input) {
            let keep_going = self.apply(command)?;
            if keep_going && self.running.is_none() {
                prompt()?;
            }
            return Ok(keep_going);
        }

        if input.is_empty() {
            if self.running.is_none() {
                prompt()?;
            }
            return Ok(true);
        }

        self.submit(input.to_string(), Vec::new());
        Ok(true)
    }

    fn submit(&mut self, input: String, attachments: Vec<Attachment>) {
        if self.running.is_some() {
            println!("A reply is still being generated. Use /cancel to stop it.");
            return;
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let conversation_id = orchestrator.store().lock().active_id();
        let options = self.config.request_options();
        println!();
        self.running = Some(tokio::spawn(async move {
            orchestrator
                .send(conversation_id, &input, attachments, &options)
                .await
        }));
    }

    /// Cancel whatever is in flight. Returns false if nothing was.
    fn cancel_running(&mut self) -> bool {
        if self.running.is_some() {
            self.orchestrator.abort();
            return true;
        }
        if let Some(handle) = &self.probe_handle {
            if self.probe.state().status == ProbeStatus::Running {
                self.probe.cancel(handle);
                println!("Connection test cancelled.");
                return true;
            }
        }
        false
    }

    fn is_active(&self, conversation_id: ConversationId) -> bool {
        self.orchestrator.store().lock().active_id() == conversation_id
    }

    fn print_event(&self, event: ChatEvent) -> io::Result<()> {
        match event {
            ChatEvent::RequestStart { .. } => {
                if io::IsTerminal::is_terminal(&io::stderr()) {
                    eprintln!("Oji is thinking...");
                }
            }
            ChatEvent::MessageAppended {
                conversation_id,
                message,
            } => {
                if message.role == Role::Assistant && self.is_active(conversation_id) {
                    print!("oji: {}", message.content);
                    io::stdout().flush()?;
                }
            }
            ChatEvent::MessageUpdated {
                conversation_id,
                delta,
                ..
            } => {
                if self.is_active(conversation_id) {
                    print!("{}", delta);
                    io::stdout().flush()?;
                }
            }
            ChatEvent::RequestEnd { .. } => println!("\n"),
            ChatEvent::Error { title, detail, .. } => {
                eprintln!("\n{}\n  {}", title, detail);
            }
        }
        Ok(())
    }

    fn report_probe(&mut self) -> io::Result<()> {
        let state = self.probe_rx.borrow_and_update().clone();
        if !state.status.is_terminal() || state.generation == self.reported_probe {
            return Ok(());
        }
        self.reported_probe = state.generation;

        if state.status == ProbeStatus::Success {
            let models = self.probe.take_discovered_models();
            self.config.commit_models(models);
        }

        match state.presentation() {
            ProbePresentation::Nothing => return Ok(()),
            ProbePresentation::Status(text) => println!("{}", text),
            ProbePresentation::ErrorDialog { title, detail } => {
                eprintln!("{}\n  {}", title, detail);
            }
        }
        if state.status == ProbeStatus::Success {
            println!("Using model: {}", self.config.model);
        }
        if self.running.is_none() {
            prompt()?;
        }
        Ok(())
    }

    /// Apply a parsed command. Returns false to exit.
    fn apply(&mut self, command: CommandResult) -> anyhow::Result<bool> {
        match command {
            CommandResult::NewChat => {
                self.orchestrator.store().lock().create_conversation();
                println!("Started a new chat.\n\n{}", WELCOME);
            }
            CommandResult::List => {
                println!("{}", ConversationCommand::list_text(&self.orchestrator.store().lock()));
            }
            CommandResult::Switch(position) => {
                let mut store = self.orchestrator.store().lock();
                match ConversationCommand::resolve(&store, Some(position)) {
                    Ok(id) => {
                        store.switch_to(id);
                        let name = store.get(id).map(|c| c.display_name.clone()).unwrap_or_default();
                        println!("Switched to: {}\n", name);
                        if store.live_messages().is_empty() {
                            println!("{}", WELCOME);
                        } else {
                            print!("{}", ConversationCommand::transcript(store.live_messages()));
                        }
                    }
                    Err(msg) => println!("{}", msg),
                }
            }
            CommandResult::Rename(name) => {
                let mut store = self.orchestrator.store().lock();
                let id = store.active_id();
                store.rename(id, name.clone());
                println!("Renamed to: {}", name);
            }
            CommandResult::Duplicate(position) => {
                let mut store = self.orchestrator.store().lock();
                match ConversationCommand::resolve(&store, position) {
                    Ok(id) => {
                        if let Some(copy) = store.duplicate(id) {
                            let name = store.get(copy).map(|c| c.display_name.clone()).unwrap_or_default();
                            println!("Created: {} (chat {})", name, store.len());
                        }
                    }
                    Err(msg) => println!("{}", msg),
                }
            }
            CommandResult::Delete(position) => {
                let mut store = self.orchestrator.store().lock();
                match ConversationCommand::resolve(&store, position) {
                    Ok(id) => {
                        let was_active = id == store.active_id();
                        if !store.delete(id) {
                            println!("Cannot delete the last chat.");
                        } else if was_active {
                            let name = store
                                .get(store.active_id())
                                .map(|c| c.display_name.clone())
                                .unwrap_or_default();
                            println!("Deleted. Now in: {}", name);
                        } else {
                            println!("Deleted.");
                        }
                    }
                    Err(msg) => println!("{}", msg),
                }
            }
            CommandResult::Probe => {
                println!("Testing connection to {}...", self.config.base_url);
                self.probe_handle = Some(
                    self.probe
                        .start(&self.config.base_url, self.config.api_key.as_deref()),
                );
            }
            CommandResult::Cancel => {
                if !self.cancel_running() {
                    println!("Nothing to cancel.");
                }
            }
            CommandResult::Models => {
                println!(
                    "{}",
                    ModelCommand::list_models_text(&self.config.model, &self.config.available_models)
                );
            }
            CommandResult::SetModel(query) => {
                match ModelCommand::resolve(&query, &self.config.available_models) {
                    Ok(id) => {
                        println!("Switched to: {}", id);
                        self.config.model = id;
                    }
                    Err(msg) => println!("{}", msg),
                }
            }
            CommandResult::SetStream(on) => {
                self.config.stream = on;
                println!("Streaming {}.", if on { "on" } else { "off" });
            }
            CommandResult::SetSystem(prompt) => {
                match &prompt {
                    Some(text) => println!("System prompt set: {}", text),
                    None => println!("System prompt cleared."),
                }
                self.config.system_prompt = prompt;
            }
            CommandResult::Image { path, prompt } => {
                match crate::utils::load_image(Path::new(&path)) {
                    Ok(attachment) => {
                        self.submit(prompt, vec![attachment]);
                        return Ok(true);
                    }
                    Err(e) => println!("{:#}", e),
                }
            }
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Exit => return Ok(false),
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
        }
        println!();
        Ok(true)
    }
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}
