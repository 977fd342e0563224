//! oji - terminal chat client for OpenAI-compatible endpoints

mod commands;
mod config;
mod repl;
mod utils;

use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use oji_ai::{HttpTransport, Role, Transport};
use oji_chat::{
    ChatConfig, ChatEvent, ConnectionProbe, Orchestrator, ProbePresentation, ProbeStatus,
    SendOutcome, SessionStore,
};
use tracing_subscriber::EnvFilter;

/// oji - chat with any OpenAI-compatible endpoint
#[derive(Parser, Debug)]
#[command(name = "oji")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Endpoint root (default: http://localhost:9068/v1)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Model to use (default: gpt-3.5-turbo)
    #[arg(short, long)]
    model: Option<String>,

    /// API key (default: config file, then OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Upper bound on generated tokens per reply
    #[arg(long)]
    max_completion_tokens: Option<u32>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Test the connection, list models and exit
    #[arg(long)]
    probe: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

impl Args {
    /// Overlay command-line flags on the configured settings
    fn apply(&self, mut config: ChatConfig) -> ChatConfig {
        if let Some(ref base_url) = self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(ref key) = self.api_key {
            config.api_key = Some(key.clone()).filter(|k| !k.trim().is_empty());
        }
        if self.no_stream {
            config.stream = false;
        }
        if let Some(ref system) = self.system {
            config.system_prompt = Some(system.clone()).filter(|s| !s.trim().is_empty());
        }
        if let Some(max) = self.max_completion_tokens {
            config.max_completion_tokens = max;
        }
        config
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("oji=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Merge config with CLI args (CLI takes precedence)
    let cfg = config::Config::load();
    let chat_config = args.apply(cfg.chat_config());
    tracing::debug!(
        base_url = %chat_config.base_url,
        model = %chat_config.model,
        stream = chat_config.stream,
        "Starting"
    );

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new());

    if args.probe {
        return run_probe(transport, &chat_config).await;
    }

    let orchestrator = Arc::new(Orchestrator::new(
        chat_config.client(Arc::clone(&transport)),
        SessionStore::new().shared(),
    ));

    if let Some(command) = args.command {
        return run_command(orchestrator, &chat_config, &command).await;
    }

    let probe = ConnectionProbe::new(transport, chat_config.probe_timeout);
    repl::Repl::new(orchestrator, probe, chat_config).run().await
}

async fn run_command(
    orchestrator: Arc<Orchestrator>,
    config: &ChatConfig,
    command: &str,
) -> anyhow::Result<()> {
    let mut receiver = orchestrator.subscribe();

    // Spawn event handler
    let printer = tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                ChatEvent::MessageAppended { message, .. } if message.role == Role::Assistant => {
                    print!("{}", message.content);
                    std::io::stdout().flush().ok();
                }
                ChatEvent::MessageUpdated { delta, .. } => {
                    print!("{}", delta);
                    std::io::stdout().flush().ok();
                }
                ChatEvent::RequestEnd { .. } => {
                    println!();
                    break;
                }
                _ => {}
            }
        }
    });

    let conversation_id = orchestrator.store().lock().active_id();
    let options = config.request_options();
    let send = orchestrator.send(conversation_id, command, Vec::new(), &options);
    tokio::pin!(send);

    let result = tokio::select! {
        result = &mut send => result,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.abort();
            send.await
        }
    };

    if matches!(result, Ok(SendOutcome::Skipped)) {
        printer.abort();
        anyhow::bail!("Nothing to send");
    }
    let _ = printer.await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_silent() => Ok(()),
        Err(e) => {
            let classified = e.classify();
            anyhow::bail!("{}: {}", classified.title, classified.detail)
        }
    }
}

async fn run_probe(transport: Arc<dyn Transport>, config: &ChatConfig) -> anyhow::Result<()> {
    let probe = ConnectionProbe::new(transport, config.probe_timeout);
    let mut state_rx = probe.subscribe();

    eprintln!("Testing connection to {}...", config.base_url);
    let handle = probe.start(&config.base_url, config.api_key.as_deref());

    let state = tokio::select! {
        state = state_rx.wait_for(|s| s.status.is_terminal()) => state?.clone(),
        _ = tokio::signal::ctrl_c() => {
            probe.cancel(&handle);
            probe.state()
        }
    };

    match state.presentation() {
        ProbePresentation::Nothing => {}
        ProbePresentation::Status(text) => println!("{}", text),
        ProbePresentation::ErrorDialog { title, detail } => {
            anyhow::bail!("{}: {}", title, detail)
        }
    }

    match state.status {
        ProbeStatus::Success => {
            let mut chat_config = config.clone();
            chat_config.commit_models(probe.take_discovered_models());
            for model in &chat_config.available_models {
                let marker = if model.id == chat_config.model { " *" } else { "" };
                println!("  {}{}", model.id, marker);
            }
            Ok(())
        }
        ProbeStatus::Timeout => anyhow::bail!("{}", state.error_detail),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "oji",
            "--base-url",
            "http://example.test/v1",
            "-m",
            "llama3",
            "--no-stream",
            "--system",
            "Be brief",
        ])
        .unwrap();
        let config = args.apply(ChatConfig::default());
        assert_eq!(config.base_url, "http://example.test/v1");
        assert_eq!(config.model, "llama3");
        assert!(!config.stream);
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief"));
        assert_eq!(config.max_completion_tokens, 8192);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::try_parse_from(["oji"]).unwrap();
        let base = ChatConfig {
            model: "configured".into(),
            api_key: Some("sk-config".into()),
            ..ChatConfig::default()
        };
        let config = args.apply(base);
        assert_eq!(config.model, "configured");
        assert_eq!(config.api_key.as_deref(), Some("sk-config"));
        assert!(config.stream);
    }

    #[test]
    fn test_command_flag() {
        let args = Args::try_parse_from(["oji", "-c", "Hello there"]).unwrap();
        assert_eq!(args.command.as_deref(), Some("Hello there"));
    }
}
