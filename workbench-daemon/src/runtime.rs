use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};

use workbench_core::config::{self, workbench_root};
use workbench_core::WorkspaceConfig;
use workbench_sync::{
    ContainerChannel, ContainerService, MutationCoordinator, Notice, NoticeLevel,
    ReconnectPolicy, StorageChannel, StorageService, TerminalBridge, Workspace, WorkspaceEvent,
    WorkspaceHandle, WorkspaceView,
};

use crate::channels::{run_channel, ChannelEndpoint};
use crate::error::{io_err, DaemonError};
use crate::http::{HttpContainer, HttpStorage};
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse, TerminalChunk};

const MAILBOX_CAPACITY: usize = 256;

/// What socket clients need to reach a running session.
pub struct SessionLinks {
    pub handle: WorkspaceHandle,
    pub view: watch::Receiver<WorkspaceView>,
    terminal: broadcast::Receiver<String>,
    pub started_at: DateTime<Utc>,
    pub socket: PathBuf,
}

impl SessionLinks {
    pub fn new(
        handle: WorkspaceHandle,
        view: watch::Receiver<WorkspaceView>,
        terminal: broadcast::Receiver<String>,
        socket: PathBuf,
    ) -> Self {
        Self {
            handle,
            view,
            terminal,
            started_at: Utc::now(),
            socket,
        }
    }

    fn terminal(&self) -> broadcast::Receiver<String> {
        self.terminal.resubscribe()
    }
}

/// Start the session runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run one workspace session: enter the workspace, open both channels and
/// serve the control socket until stopped.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = config::load_at(&home)?;
    ensure_runtime_dirs(&home)?;

    let storage_endpoint =
        ChannelEndpoint::parse(&config.storage_channel_url, config.auth_token.clone())?;
    let container_endpoint =
        ChannelEndpoint::parse(&config.container_channel_url, config.auth_token.clone())?;

    let mut workspace = build_workspace(&config);
    workspace.enter().await?;

    let (mailbox_tx, mailbox_rx) = mpsc::channel::<WorkspaceEvent>(MAILBOX_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let links = Arc::new(SessionLinks::new(
        WorkspaceHandle::new(mailbox_tx.clone()),
        workspace.subscribe_view(),
        workspace.subscribe_terminal(),
        socket_path(&home),
    ));
    let notices = workspace.subscribe_notices();

    let workspace_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            workspace.run(mailbox_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            Ok(())
        })
    };

    let storage_handle = {
        let shutdown = shutdown_tx.clone();
        let policy = ReconnectPolicy::from(&config.reconnect);
        let mailbox = mailbox_tx.clone();
        tokio::spawn(async move {
            run_channel::<StorageChannel>(storage_endpoint, policy, mailbox, shutdown.subscribe())
                .await
        })
    };

    let container_handle = {
        let shutdown = shutdown_tx.clone();
        let policy = ReconnectPolicy::from(&config.reconnect);
        let mailbox = mailbox_tx.clone();
        tokio::spawn(async move {
            run_channel::<ContainerChannel>(
                container_endpoint,
                policy,
                mailbox,
                shutdown.subscribe(),
            )
            .await
        })
    };
    drop(mailbox_tx);

    let notice_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { notice_log_task(notices, shutdown.subscribe()).await })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let links = links.clone();
        tokio::spawn(async move {
            let result = socket_server_task(links, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, closing workspace");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (workspace_result, storage_result, container_result, notice_result, socket_result, signal_result) =
        tokio::join!(
            workspace_handle,
            storage_handle,
            container_handle,
            notice_handle,
            socket_handle,
            signal_handle
        );

    handle_join("workspace", workspace_result)?;
    handle_join("storage_channel", storage_result)?;
    handle_join("container_channel", container_result)?;
    handle_join("notice_log", notice_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

fn build_workspace(config: &WorkspaceConfig) -> Workspace {
    let storage: Arc<dyn StorageService> = Arc::new(HttpStorage::from_config(config));
    let container: Arc<dyn ContainerService> = Arc::new(HttpContainer::from_config(config));
    let coordinator = MutationCoordinator::new(storage, container);
    let bridge = TerminalBridge::new(config.container_root_marker.clone(), config.hot_reload);
    Workspace::new(coordinator, bridge)
}

async fn notice_log_task(
    mut notices: broadcast::Receiver<Notice>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            notice = notices.recv() => match notice {
                Ok(notice) => log_notice(&notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notice log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn log_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Info => tracing::info!("{}", notice.message),
        NoticeLevel::Warning => tracing::warn!("{}", notice.message),
        NoticeLevel::Error => tracing::error!("{}", notice.message),
    }
}

async fn socket_server_task(
    links: Arc<SessionLinks>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = links.socket.clone();
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let links = links.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, links, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    links: Arc<SessionLinks>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        match request {
            DaemonRequest::Status => {
                let payload = build_status_payload(&links);
                write_response(&mut writer, &DaemonResponse::ok(payload)).await?;
            }
            DaemonRequest::Stop => {
                let _ = shutdown_tx.send(());
                write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true })))
                    .await?;
                break;
            }
            DaemonRequest::Attach => {
                let terminal = links.terminal();
                write_response(&mut writer, &DaemonResponse::ok(json!({ "attached": true })))
                    .await?;
                stream_terminal(terminal, &mut lines, &mut writer, shutdown_tx.subscribe())
                    .await?;
                break;
            }
            other => {
                let response = match other.into_command() {
                    Some(command) => match links.handle.request(command).await {
                        Ok(output) => DaemonResponse::ok(serde_json::to_value(output)?),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    },
                    None => DaemonResponse::error("request is not a workspace command"),
                };
                write_response(&mut writer, &response).await?;
            }
        }
    }

    Ok(())
}

/// Forward terminal output until the client hangs up or the session ends.
async fn stream_terminal(
    mut terminal: broadcast::Receiver<String>,
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            incoming = lines.next_line() => match incoming {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            },
            chunk = terminal.recv() => match chunk {
                Ok(data) => {
                    let payload = serde_json::to_string(&TerminalChunk { data })?;
                    if write_line(writer, &payload).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "attached terminal lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn build_status_payload(links: &SessionLinks) -> Value {
    let view = links.view.borrow().clone();
    json!({
        "running": true,
        "started_at": links.started_at.to_rfc3339(),
        "socket": links.socket.display().to_string(),
        "channels": view.channels,
        "selected": view.selected,
        "selecting": view.selecting,
        "dirty": view.dirty,
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = workbench_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, payload: &str) -> Result<(), DaemonError> {
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    write_line(writer, &payload).await
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use workbench_core::NodePath;
    use workbench_sync::{ChannelStatus, Command, CommandOutput, SyncError};

    struct Session {
        links: Arc<SessionLinks>,
        view_tx: watch::Sender<WorkspaceView>,
        terminal_tx: broadcast::Sender<String>,
        commands: mpsc::UnboundedReceiver<Command>,
    }

    /// Links backed by a stand-in workspace that answers `Select` with
    /// `Opened`, `Save` with an error and everything else with `Unchanged`.
    fn session(socket: PathBuf) -> Session {
        let (mailbox_tx, mut mailbox_rx) = mpsc::channel::<WorkspaceEvent>(8);
        let (view_tx, view_rx) = watch::channel(WorkspaceView::default());
        let (terminal_tx, terminal_rx) = broadcast::channel(16);
        let (seen_tx, commands) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = mailbox_rx.recv().await {
                let WorkspaceEvent::Command {
                    command,
                    respond_to,
                } = event
                else {
                    continue;
                };
                let result = match &command {
                    Command::Select { path } => Ok(CommandOutput::Opened {
                        path: path.clone(),
                        language: "javascript".into(),
                    }),
                    Command::Save => Err(SyncError::NoActiveFile),
                    _ => Ok(CommandOutput::Unchanged),
                };
                let _ = seen_tx.send(command);
                let _ = respond_to.send(result);
            }
        });

        Session {
            links: Arc::new(SessionLinks::new(
                WorkspaceHandle::new(mailbox_tx),
                view_rx,
                terminal_rx,
                socket,
            )),
            view_tx,
            terminal_tx,
            commands,
        }
    }

    struct Client {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            write_line(&mut self.writer, line).await.expect("write");
        }

        async fn recv(&mut self) -> Value {
            let line = self
                .lines
                .next_line()
                .await
                .expect("read")
                .expect("line");
            serde_json::from_str(&line).expect("json")
        }
    }

    fn connect(links: Arc<SessionLinks>, shutdown_tx: broadcast::Sender<()>) -> Client {
        let (server, client) = UnixStream::pair().expect("pair");
        tokio::spawn(async move {
            let _ = handle_socket_client(server, links, shutdown_tx).await;
        });
        let (reader, writer) = client.into_split();
        Client {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    #[tokio::test]
    async fn status_reports_channels_from_view() {
        let s = session(PathBuf::from("/tmp/workbench.sock"));
        s.view_tx.send_replace(WorkspaceView {
            selecting: false,
            selected: Some(NodePath::from("app/index.js")),
            dirty: true,
            channels: ChannelStatus {
                storage: true,
                container: false,
            },
        });
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut client = connect(s.links.clone(), shutdown_tx);

        client.send(r#"{"cmd":"status"}"#).await;
        let response = client.recv().await;
        assert_eq!(response["ok"], json!(true));
        let data = &response["data"];
        assert_eq!(data["running"], json!(true));
        assert_eq!(data["channels"], json!({"storage": true, "container": false}));
        assert_eq!(data["selected"], json!("app/index.js"));
        assert_eq!(data["dirty"], json!(true));
        assert_eq!(data["socket"], json!("/tmp/workbench.sock"));
    }

    #[tokio::test]
    async fn commands_are_forwarded_to_workspace() {
        let mut s = session(PathBuf::from("/tmp/workbench.sock"));
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut client = connect(s.links.clone(), shutdown_tx);

        client.send(r#"{"cmd":"open","path":"app/index.js"}"#).await;
        let response = client.recv().await;
        assert_eq!(
            response["data"],
            json!({"outcome": "opened", "path": "app/index.js", "language": "javascript"})
        );
        assert_eq!(
            s.commands.recv().await,
            Some(Command::Select {
                path: NodePath::from("app/index.js")
            })
        );
    }

    #[tokio::test]
    async fn command_failure_becomes_error_response() {
        let s = session(PathBuf::from("/tmp/workbench.sock"));
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut client = connect(s.links.clone(), shutdown_tx);

        client.send(r#"{"cmd":"save"}"#).await;
        let response = client.recv().await;
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["error"], json!(SyncError::NoActiveFile.to_string()));
    }

    #[tokio::test]
    async fn invalid_json_keeps_connection_open() {
        let s = session(PathBuf::from("/tmp/workbench.sock"));
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut client = connect(s.links.clone(), shutdown_tx);

        client.send("{not json").await;
        let response = client.recv().await;
        assert_eq!(response["ok"], json!(false));
        assert!(response["error"]
            .as_str()
            .expect("error")
            .starts_with("invalid request JSON"));

        client.send(r#"{"cmd":"refresh"}"#).await;
        assert_eq!(client.recv().await["ok"], json!(true));
    }

    #[tokio::test]
    async fn stop_broadcasts_shutdown() {
        let s = session(PathBuf::from("/tmp/workbench.sock"));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let mut client = connect(s.links.clone(), shutdown_tx);

        client.send(r#"{"cmd":"stop"}"#).await;
        assert_eq!(client.recv().await["data"], json!({"stopping": true}));
        shutdown_rx.recv().await.expect("shutdown signal");
    }

    #[tokio::test]
    async fn attach_streams_terminal_chunks() {
        let s = session(PathBuf::from("/tmp/workbench.sock"));
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut client = connect(s.links.clone(), shutdown_tx);

        client.send(r#"{"cmd":"attach"}"#).await;
        assert_eq!(client.recv().await["data"], json!({"attached": true}));

        s.terminal_tx.send("$ ls\r\n".into()).expect("send chunk");
        s.terminal_tx.send("total 0\r\n".into()).expect("send chunk");
        assert_eq!(client.recv().await, json!({"data": "$ ls\r\n"}));
        assert_eq!(client.recv().await, json!({"data": "total 0\r\n"}));
    }

    #[test]
    fn stale_socket_is_removed_before_bind() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("workbench.sock");
        fs::write(&socket, b"").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn live_socket_is_not_replaced() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("workbench.sock");
        let _listener = UnixListener::bind(&socket).expect("bind");
        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(err.to_string().contains("already in use"), "got: {err}");
    }

    #[test]
    fn runtime_dirs_are_created_under_home() {
        let home = TempDir::new().expect("home");
        ensure_runtime_dirs(home.path()).expect("dirs");
        assert!(workbench_root(home.path()).is_dir());
    }
}
