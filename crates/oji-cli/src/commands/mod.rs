//! Slash commands for interactive mode

mod conversation;
mod model;

pub use conversation::ConversationCommand;
pub use model::ModelCommand;

/// Result of parsing a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Start a new, empty conversation
    NewChat,
    /// List conversations
    List,
    /// Switch to the conversation at a 1-based position
    Switch(usize),
    /// Rename the active conversation
    Rename(String),
    /// Duplicate a conversation (active when no position is given)
    Duplicate(Option<usize>),
    /// Delete a conversation (active when no position is given)
    Delete(Option<usize>),
    /// Test the connection and discover models
    Probe,
    /// Cancel the running request or probe
    Cancel,
    /// List discovered models
    Models,
    /// Select a model
    SetModel(String),
    /// Turn streaming on or off
    SetStream(bool),
    /// Set the system prompt; `None` clears it
    SetSystem(Option<String>),
    /// Send an image file along with a prompt
    Image { path: String, prompt: String },
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. Returns `None` for plain input.
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewChat,

        "list" | "ls" | "l" => CommandResult::List,

        "switch" | "sw" => match parse_position(args) {
            Some(Some(n)) => CommandResult::Switch(n),
            _ => usage("/switch <n>"),
        },

        "rename" => {
            if args.is_empty() {
                usage("/rename <name>")
            } else {
                CommandResult::Rename(args.to_string())
            }
        }

        "dup" | "duplicate" => match parse_position(args) {
            Some(n) => CommandResult::Duplicate(n),
            None => usage("/dup [n]"),
        },

        "delete" | "del" => match parse_position(args) {
            Some(n) => CommandResult::Delete(n),
            None => usage("/delete [n]"),
        },

        "probe" | "test" => CommandResult::Probe,

        "cancel" => CommandResult::Cancel,

        "models" => CommandResult::Models,

        "model" | "m" => {
            if args.is_empty() {
                CommandResult::Models
            } else {
                CommandResult::SetModel(args.to_string())
            }
        }

        "stream" => match args.to_lowercase().as_str() {
            "on" | "true" | "1" => CommandResult::SetStream(true),
            "off" | "false" | "0" => CommandResult::SetStream(false),
            _ => usage("/stream on|off"),
        },

        "system" => {
            if args.is_empty() {
                CommandResult::SetSystem(None)
            } else {
                CommandResult::SetSystem(Some(args.to_string()))
            }
        }

        "image" | "img" => {
            let mut split = args.splitn(2, ' ');
            match (split.next().filter(|p| !p.is_empty()), split.next()) {
                (Some(path), prompt) => CommandResult::Image {
                    path: path.to_string(),
                    prompt: prompt.map(|p| p.trim().to_string()).unwrap_or_default(),
                },
                _ => usage("/image <path> [prompt]"),
            }
        }

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

/// `""` -> `Some(None)`, a positive number -> `Some(Some(n))`, anything else -> `None`
fn parse_position(args: &str) -> Option<Option<usize>> {
    if args.is_empty() {
        return Some(None);
    }
    match args.parse::<usize>() {
        Ok(n) if n > 0 => Some(Some(n)),
        _ => None,
    }
}

fn usage(form: &str) -> CommandResult {
    CommandResult::Message(format!("Usage: {}", form))
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /new, /n               Start a new chat
  /list, /ls             List chats (* marks the active one)
  /switch <n>            Switch to chat n
  /rename <name>         Rename the active chat
  /dup [n]               Duplicate chat n (default: active)
  /delete [n]            Delete chat n (default: active)
  /image <path> [text]   Send an image with an optional prompt
  /probe                 Test the connection and discover models
  /cancel                Stop the running reply or connection test
  /models                List discovered models
  /model <id>            Select a model
  /stream on|off         Toggle streaming replies
  /system [text]         Set (or clear) the system prompt
  /quit, /exit, /q       Exit oji

Ctrl-C also stops a running reply."#
        .to_string()
}
