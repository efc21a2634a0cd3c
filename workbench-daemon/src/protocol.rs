use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use workbench_core::{Delta, NodeKind, NodePath};
use workbench_sync::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    Status,
    Stop,
    /// Stream terminal output until the client disconnects.
    Attach,
    Snapshot,
    Open {
        path: NodePath,
    },
    Expand {
        path: NodePath,
    },
    New {
        path: NodePath,
        #[serde(default)]
        folder: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Rename {
        path: NodePath,
        name: String,
    },
    Remove {
        path: NodePath,
    },
    Save,
    Refresh,
    Edit {
        offset: usize,
        #[serde(default)]
        length: usize,
        #[serde(default)]
        text: String,
    },
    TermWrite {
        data: String,
    },
}

impl DaemonRequest {
    /// The workspace command this request maps to, if it is one.
    pub fn into_command(self) -> Option<Command> {
        let command = match self {
            DaemonRequest::Status | DaemonRequest::Stop | DaemonRequest::Attach => return None,
            DaemonRequest::Snapshot => Command::Snapshot,
            DaemonRequest::Open { path } => Command::Select { path },
            DaemonRequest::Expand { path } => Command::ToggleExpanded { path },
            DaemonRequest::New {
                path,
                folder,
                content,
            } => {
                let kind = if folder {
                    NodeKind::Folder
                } else {
                    NodeKind::File
                };
                let content = match kind {
                    NodeKind::File => Some(content.unwrap_or_default()),
                    NodeKind::Folder => None,
                };
                Command::Create {
                    path,
                    kind,
                    content,
                }
            }
            DaemonRequest::Rename { path, name } => Command::Rename { path, name },
            DaemonRequest::Remove { path } => Command::Delete { path },
            DaemonRequest::Save => Command::Save,
            DaemonRequest::Refresh => Command::Refresh,
            DaemonRequest::Edit {
                offset,
                length,
                text,
            } => Command::Edit {
                deltas: vec![Delta::replace(offset, length, text)],
            },
            DaemonRequest::TermWrite { data } => Command::TerminalWrite { data },
        };
        Some(command)
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One line of terminal output streamed to an attached client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalChunk {
    pub data: String,
}

fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }
    UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })
}

fn write_line(
    stream: &mut UnixStream,
    socket: &Path,
    request: &DaemonRequest,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))
}

fn read_response(
    reader: &mut BufReader<UnixStream>,
    socket: &Path,
) -> Result<DaemonResponse, DaemonError> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    let mut stream = connect(&socket)?;
    write_line(&mut stream, &socket, request)?;
    let mut reader = BufReader::new(stream);
    read_response(&mut reader, &socket)
}

/// Send a request and unwrap its `data`, turning `ok: false` into an error.
pub fn request(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, request)?)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &DaemonRequest::Status) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    request(home, &DaemonRequest::Stop).map(|_| ())
}

/// Attach to the terminal: every output chunk is handed to `on_chunk` until the
/// daemon goes away or `on_chunk` fails.
pub fn attach(
    home: &Path,
    mut on_chunk: impl FnMut(&str) -> std::io::Result<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(home);
    let mut stream = connect(&socket)?;
    write_line(&mut stream, &socket, &DaemonRequest::Attach)?;
    let mut reader = BufReader::new(stream);
    response_into_data(read_response(&mut reader, &socket)?)?;

    for line in reader.lines() {
        let line = line.map_err(|e| io_err(&socket, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: TerminalChunk = serde_json::from_str(&line)?;
        on_chunk(&chunk.data).map_err(|e| io_err("stdout", e))?;
    }
    Ok(())
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn requests_are_tagged_by_cmd() {
        let encoded = serde_json::to_value(DaemonRequest::Open {
            path: NodePath::from("app/index.js"),
        })
        .expect("encode");
        assert_eq!(encoded, json!({"cmd": "open", "path": "app/index.js"}));

        let decoded: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"term_write","data":"ls\r"}"#).expect("decode");
        assert_eq!(
            decoded,
            DaemonRequest::TermWrite {
                data: "ls\r".into()
            }
        );
    }

    #[test]
    fn new_defaults_to_empty_file() {
        let request: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"new","path":"src/main.rs"}"#).expect("decode");
        assert_eq!(
            request.into_command(),
            Some(Command::Create {
                path: NodePath::from("src/main.rs"),
                kind: NodeKind::File,
                content: Some(String::new()),
            })
        );
    }

    #[test]
    fn new_folder_has_no_content() {
        let request = DaemonRequest::New {
            path: NodePath::from("dist"),
            folder: true,
            content: Some("ignored".into()),
        };
        assert_eq!(
            request.into_command(),
            Some(Command::Create {
                path: NodePath::from("dist"),
                kind: NodeKind::Folder,
                content: None,
            })
        );
    }

    #[test]
    fn edit_becomes_single_replace_delta() {
        let request: DaemonRequest =
            serde_json::from_str(r#"{"cmd":"edit","offset":3,"length":2,"text":"xy"}"#)
                .expect("decode");
        assert_eq!(
            request.into_command(),
            Some(Command::Edit {
                deltas: vec![Delta::replace(3, 2, "xy")],
            })
        );
    }

    #[test]
    fn control_requests_have_no_command() {
        for request in [DaemonRequest::Status, DaemonRequest::Stop, DaemonRequest::Attach] {
            assert_eq!(request.into_command(), None);
        }
    }

    #[test]
    fn unknown_cmd_is_rejected() {
        assert!(serde_json::from_str::<DaemonRequest>(r#"{"cmd":"sync"}"#).is_err());
    }

    #[test]
    fn missing_socket_reports_not_running() {
        let home = tempfile::TempDir::new().expect("home");
        let err = send_request(home.path(), &DaemonRequest::Status).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(DaemonResponse::error("x already exists")).unwrap_err();
        assert_eq!(err.to_string(), "daemon protocol error: x already exists");
    }
}
