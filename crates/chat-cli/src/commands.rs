use std::path::PathBuf;

use thiserror::Error;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Regenerate,
    Edit(String),
    Branches,
    /// Switch the node at thread position `position` to its sibling `index`.
    Switch {
        position: usize,
        index: usize,
    },
    Goto(String),
    New,
    Save(PathBuf),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
  <text>                 send a message at the tip
  /regen                 regenerate the answer to the last user message
  /edit <text>           resend the last user message with new text
  /branches              show the thread with branch positions
  /switch <pos> <index>  show sibling <index> (1-based) of thread entry <pos>
  /goto <node-id>        make the path to a node the active thread
  /new                   start a new conversation
  /save <path>           write a JSON snapshot of the conversation
  /quit                  exit";

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Send(line.to_string())));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "regen" | "regenerate" => Self::Regenerate,
            "edit" if !args.is_empty() => Self::Edit(args.to_string()),
            "edit" => return Err(CommandError::Usage("/edit <text>")),
            "branches" | "b" => Self::Branches,
            "switch" => {
                let mut parts = args.split_whitespace().map(str::parse::<usize>);
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(Ok(position)), Some(Ok(index)), None) if position > 0 && index > 0 => {
                        Self::Switch {
                            position: position - 1,
                            index: index - 1,
                        }
                    }
                    _ => return Err(CommandError::Usage("/switch <pos> <index>")),
                }
            }
            "goto" if !args.is_empty() => Self::Goto(args.to_string()),
            "goto" => return Err(CommandError::Usage("/goto <node-id>")),
            "new" => Self::New,
            "save" if !args.is_empty() => Self::Save(PathBuf::from(args)),
            "save" => return Err(CommandError::Usage("/save <path>")),
            "help" | "h" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}
