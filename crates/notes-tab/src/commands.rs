//! Line-oriented command surface.
//!
//! One command per input line. The first word picks the command, the rest of
//! the line is its argument.

use notes_core::{DocumentValue, NoteId, VersionId};
use serde_json::{Value, json};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("`{0}` takes no argument")]
    UnexpectedArgument(&'static str),

    #[error("Invalid document JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a note and make it active
    New,
    /// List notes, active one marked
    List,
    /// Make a note active
    Open(NoteId),
    /// Deselect the active note
    Close,
    /// Print the active note
    Show,
    /// Edit the active note's title (debounced, local only)
    Title(String),
    /// Replace the active note's content with a JSON document (debounced, broadcast)
    Write(DocumentValue),
    /// Replace the active note's content with plain text
    Text(String),
    /// Delete a note (the active one when no id is given)
    Delete(Option<NoteId>),
    /// Snapshot the active note
    Save,
    /// List the active note's versions
    History,
    /// Restore a version of the active note
    Restore(VersionId),
    /// Drop all versions of the active note
    ClearHistory,
    /// Delete every note
    ClearAll,
    /// Re-hydrate from storage
    Reload,
    /// Commit pending edits now
    Flush,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let no_arg = |command: &'static str, cmd: Command| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(CommandError::UnexpectedArgument(command))
            }
        };

        match word {
            "new" => no_arg("new", Command::New),
            "list" | "ls" => no_arg("list", Command::List),
            "open" => required(rest, "open", "a note id").map(|id| Command::Open(id.into())),
            "close" => no_arg("close", Command::Close),
            "show" => no_arg("show", Command::Show),
            "title" => Ok(Command::Title(rest.to_string())),
            "write" => {
                let json = required(rest, "write", "a JSON document")?;
                let value: Value = serde_json::from_str(json)?;
                Ok(Command::Write(value.into()))
            }
            "text" => Ok(Command::Text(rest.to_string())),
            "delete" | "rm" => Ok(Command::Delete(
                (!rest.is_empty()).then(|| NoteId::from(rest)),
            )),
            "save" => no_arg("save", Command::Save),
            "history" => no_arg("history", Command::History),
            "restore" => {
                required(rest, "restore", "a version id").map(|id| Command::Restore(id.into()))
            }
            "clear-history" => no_arg("clear-history", Command::ClearHistory),
            "clear-all" => no_arg("clear-all", Command::ClearAll),
            "reload" => no_arg("reload", Command::Reload),
            "flush" => no_arg("flush", Command::Flush),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => no_arg("quit", Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn required<'a>(
    rest: &'a str,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument { command, argument })
    } else {
        Ok(rest)
    }
}

pub const HELP: &str = "\
new                    create a note and open it
list                   list notes (* = active)
open <id>              open a note
close                  close the active note
show                   print the active note
title <text>           rename the active note
write <json>           replace content with a document
text <plain text>      replace content with plain text (\\n = new paragraph)
delete [<id>]          delete a note (default: active)
save                   save a version of the active note
history                list versions of the active note
restore <version-id>   restore a version
clear-history          drop all versions of the active note
clear-all              delete every note
reload                 reload from storage
flush                  commit pending edits now
quit                   exit";

/// Build a document with one paragraph per line of `text`.
///
/// A literal `\n` in the input also starts a new paragraph.
pub fn text_to_document(text: &str) -> DocumentValue {
    let text = text.replace("\\n", "\n");
    let paragraphs: Vec<Value> = text
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                json!({"type": "paragraph"})
            } else {
                json!({"type": "paragraph", "content": [{"type": "text", "text": line}]})
            }
        })
        .collect();
    json!({"type": "doc", "content": paragraphs}).into()
}

/// Flatten a document to plain text, one line per block.
pub fn document_to_text(doc: &DocumentValue) -> String {
    let mut lines = Vec::new();
    match doc.as_json().get("content").and_then(Value::as_array) {
        Some(blocks) => {
            for block in blocks {
                let mut line = String::new();
                collect_text(block, &mut line);
                lines.push(line);
            }
        }
        None => {
            let mut line = String::new();
            collect_text(doc.as_json(), &mut line);
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn collect_text(node: &Value, out: &mut String) {
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push_str(text);
    }
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            collect_text(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notes_core::Document;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("new".parse::<Command>().unwrap(), Command::New);
        assert_eq!("  list  ".parse::<Command>().unwrap(), Command::List);
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("clear-history".parse::<Command>().unwrap(), Command::ClearHistory);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            "open abc-123".parse::<Command>().unwrap(),
            Command::Open(NoteId::from("abc-123"))
        );
        assert_eq!(
            "title  My first note ".parse::<Command>().unwrap(),
            Command::Title("My first note".into())
        );
        assert_eq!("title".parse::<Command>().unwrap(), Command::Title(String::new()));
        assert_eq!("delete".parse::<Command>().unwrap(), Command::Delete(None));
        assert_eq!(
            "delete n1".parse::<Command>().unwrap(),
            Command::Delete(Some(NoteId::from("n1")))
        );
        assert_eq!(
            "restore v9".parse::<Command>().unwrap(),
            Command::Restore(VersionId::from("v9"))
        );
    }

    #[test]
    fn test_parse_write_json() {
        let cmd: Command = r#"write {"type":"doc","content":[{"type":"paragraph"}]}"#
            .parse()
            .unwrap();
        assert_eq!(cmd, Command::Write(DocumentValue::empty()));

        assert!(matches!(
            "write {not json".parse::<Command>(),
            Err(CommandError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("".parse::<Command>(), Err(CommandError::Empty)));
        assert!(matches!("frobnicate".parse::<Command>(), Err(CommandError::Unknown(_))));
        assert!(matches!(
            "open".parse::<Command>(),
            Err(CommandError::MissingArgument { command: "open", .. })
        ));
        assert!(matches!(
            "new now".parse::<Command>(),
            Err(CommandError::UnexpectedArgument("new"))
        ));
    }

    #[test]
    fn test_text_document_conversion() {
        let doc = text_to_document("hello\\nworld");
        assert_eq!(
            doc.as_json(),
            &json!({"type": "doc", "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "hello"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "world"}]}
            ]})
        );
        assert_eq!(document_to_text(&doc), "hello\nworld");
    }

    #[test]
    fn test_empty_text_is_empty_document() {
        assert_eq!(text_to_document(""), DocumentValue::empty());
        assert_eq!(document_to_text(&DocumentValue::empty()), "");
    }
}
