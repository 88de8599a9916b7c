use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use foldermirror_core::config::{self, mirror_dir_at, MirrorConfig};
use foldermirror_core::types::PathIdentifier;
use foldermirror_sync::{
    github::GithubStore, scan, state_store, FlushReport, LocalDisk, SyncError, SyncExecutor,
};

use crate::engine::{ChangeCoalescingEngine, FlushSummary, FlushTrigger};
use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::protocol::{ControlCommand, DaemonRequest, DaemonResponse};
use crate::watcher::watcher_task;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Load the mirror config, build the engine against GitHub, queue whatever
/// changed while no daemon was running, and serve until stopped.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let mut config = config::load_at(&home)?;
    config.local_root = fs::canonicalize(&config.local_root)
        .map_err(|e| io_err(&config.local_root, e))?;

    let remote = GithubStore::from_config(&config)?;
    let executor = SyncExecutor::new(
        Arc::new(remote),
        Arc::new(LocalDisk::new(config.local_root.clone())),
    );
    let engine = build_engine(&home, &config, executor);

    queue_startup_changes(&home, &engine).await?;
    serve(home, config, engine).await
}

/// Engine whose flush reports are folded into `<home>/.foldermirror/state.json`.
pub fn build_engine(
    home: &Path,
    config: &MirrorConfig,
    executor: SyncExecutor,
) -> ChangeCoalescingEngine {
    let state_home = home.to_path_buf();
    ChangeCoalescingEngine::with_report_sink(
        config.local_root.clone(),
        executor,
        config.quiet_period(),
        move |report: &FlushReport| {
            if let Err(err) = state_store::record_flush_at(&state_home, report) {
                tracing::error!(error = %err, "failed to persist mirror state");
            }
        },
    )
}

async fn queue_startup_changes(
    home: &Path,
    engine: &ChangeCoalescingEngine,
) -> Result<(), DaemonError> {
    let home = home.to_path_buf();
    let root = engine.root().to_path_buf();
    let (state, planned) = tokio::task::spawn_blocking(move || {
        let state = state_store::load_at(&home)?;
        let planned = scan::plan_initial_sync(&root, &state)?;
        Ok::<_, SyncError>((state, planned))
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("startup scan join error: {err}")))??;

    engine
        .track_remote_files(
            state
                .files
                .keys()
                .filter_map(|known| PathIdentifier::parse(known).ok()),
        )
        .await;
    tracing::info!(changes = planned.len(), "startup scan complete");
    for (path, kind) in planned {
        engine.record(path, kind).await?;
    }
    Ok(())
}

/// Run the watcher, control socket, and signal tasks around `engine` until a
/// shutdown is requested, then flush whatever is still pending.
pub async fn serve(
    home: PathBuf,
    config: MirrorConfig,
    engine: ChangeCoalescingEngine,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let started_at = Utc::now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = engine.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watcher_task(engine, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let context = ServerContext {
            home: home.clone(),
            config,
            engine: engine.clone(),
            started_at,
        };
        tokio::spawn(async move {
            let result = socket_server_task(Arc::new(context), shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, socket_handle, signal_handle);

    // Flush before surfacing task errors so queued changes still go out.
    if let Some(report) = engine.shutdown().await {
        tracing::info!(
            paths = report.results.len(),
            failed = report.failed(),
            "final flush before exit",
        );
    }

    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

struct ServerContext {
    home: PathBuf,
    config: MirrorConfig,
    engine: ChangeCoalescingEngine,
    started_at: DateTime<Utc>,
}

async fn socket_server_task(
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context, shutdown_tx).await {
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
    context: Arc<ServerContext>,
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

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd {
            ControlCommand::Status => DaemonResponse::ok(build_status_payload(&context).await),
            ControlCommand::Flush => {
                let report = context.engine.flush_now().await;
                DaemonResponse::ok(build_flush_payload(report.as_ref()))
            }
            ControlCommand::Stop => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == ControlCommand::Stop {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(context: &ServerContext) -> Value {
    let engine = context.engine.status().await;
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": context.started_at.to_rfc3339(),
        "root": context.config.local_root.display().to_string(),
        "repository": context.config.repository.to_string(),
        "branch": context.config.branch.to_string(),
        "quiet_period_secs": engine.quiet_period_secs,
        "pending": engine.pending,
        "timer_armed": engine.timer_armed,
        "last_flush": engine.last_flush,
        "socket": socket_path(&context.home).display().to_string(),
    })
}

fn build_flush_payload(report: Option<&FlushReport>) -> Value {
    match report {
        None => json!({ "flushed": false }),
        Some(report) => json!({
            "flushed": true,
            "summary": FlushSummary::from_report(FlushTrigger::Manual, report),
            "results": report.results,
        }),
    }
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
    let dir = mirror_dir_at(home);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
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
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
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

/// `RUST_LOG` filters (default `info`); `FOLDERMIRROR_LOG_FORMAT=json` switches
/// to JSON lines. Records from the `log` facade are forwarded too.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("FOLDERMIRROR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt().json().with_env_filter(filter).with_target(false).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
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
