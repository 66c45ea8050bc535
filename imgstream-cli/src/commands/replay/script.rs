//! Replay script format.
//!
//! A script is a sequence of JSON objects, one per line. Blank lines and
//! lines starting with `#` are skipped.
//!
//! ```text
//! # two clients, one animation
//! {"event":"connect","client":"a"}
//! {"event":"request","client":"a","request":{"type":"open_file","file_id":0,"path":"cube.fits"}}
//! {"event":"sleep","ms":50}
//! {"event":"disconnect","client":"a"}
//! ```

use std::fs;
use std::path::Path;

use imgstream::request::Request;
use serde::Deserialize;

use crate::error::CliError;

/// One scripted client action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// A client connects and gets a new session.
    Connect { client: String },
    /// A client's connection closes.
    Disconnect { client: String },
    /// A client sends a request.
    Request { client: String, request: Request },
    /// The script pauses.
    Sleep { ms: u64 },
}

impl ScriptEvent {
    /// Client the event belongs to, if any.
    pub fn client(&self) -> Option<&str> {
        match self {
            ScriptEvent::Connect { client }
            | ScriptEvent::Disconnect { client }
            | ScriptEvent::Request { client, .. } => Some(client),
            ScriptEvent::Sleep { .. } => None,
        }
    }
}

/// Read and parse a script file.
pub fn load(path: &Path) -> Result<Vec<ScriptEvent>, CliError> {
    let contents = fs::read_to_string(path).map_err(|error| CliError::ScriptRead {
        path: path.to_path_buf(),
        error,
    })?;
    parse(&contents)
}

/// Parse script text. Line numbers in errors are 1-based.
pub fn parse(contents: &str) -> Result<Vec<ScriptEvent>, CliError> {
    contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            serde_json::from_str(text).map_err(|e| CliError::Script {
                line,
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgstream::request::{FileId, OpenFile};

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let script = r#"
# comment
{"event":"connect","client":"a"}

{"event":"sleep","ms":10}
{"event":"disconnect","client":"a"}
"#;
        let events = parse(script).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ScriptEvent::Connect {
                client: "a".to_string()
            }
        );
        assert_eq!(events[1], ScriptEvent::Sleep { ms: 10 });
        assert_eq!(events[1].client(), None);
        assert_eq!(events[2].client(), Some("a"));
    }

    #[test]
    fn test_parse_request_event() {
        let script = r#"{"event":"request","client":"b","request":{"type":"open_file","file_id":2,"path":"m51.fits"}}"#;
        let events = parse(script).unwrap();
        assert_eq!(
            events,
            vec![ScriptEvent::Request {
                client: "b".to_string(),
                request: Request::OpenFile(OpenFile {
                    file_id: FileId(2),
                    path: "m51.fits".to_string(),
                    request_id: 0,
                }),
            }]
        );
    }

    #[test]
    fn test_parse_reports_line_number() {
        let script = "{\"event\":\"connect\",\"client\":\"a\"}\n\n{\"event\":\"jump\"}\n";
        match parse(script) {
            Err(CliError::Script { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected script error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(Path::new("/nonexistent/replay.jsonl"));
        assert!(matches!(result, Err(CliError::ScriptRead { .. })));
    }
}
