//! Daemon runtime driven over its Unix control socket, with an in-memory
//! remote in place of GitHub.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

use foldermirror_core::config::MirrorConfig;
use foldermirror_core::types::{BranchName, EventKind, PathIdentifier};
use foldermirror_daemon::{build_engine, request, serve, ControlCommand};
use foldermirror_sync::memory::MemoryStore;
use foldermirror_sync::{state_store, LocalDisk, SyncExecutor};

struct Fixture {
    home: TempDir,
    _root_dir: TempDir,
    root: PathBuf,
    store: Arc<MemoryStore>,
    config: MirrorConfig,
}

impl Fixture {
    fn new() -> Self {
        let home = TempDir::new().expect("home");
        let root_dir = TempDir::new().expect("root");
        let root = root_dir.path().canonicalize().expect("canonical root");
        let config = MirrorConfig::new(
            root.clone(),
            "octo/notes".parse().expect("slug"),
            BranchName::default(),
        );
        Self {
            home,
            _root_dir: root_dir,
            root,
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }

    fn executor(&self) -> SyncExecutor {
        SyncExecutor::new(self.store.clone(), Arc::new(LocalDisk::new(&self.root)))
    }
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking client call")
}

async fn status(home: &Path) -> Value {
    let home = home.to_path_buf();
    blocking(move || request(&home, ControlCommand::Status)).await.expect("status")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_flush_and_stop_over_socket() {
    let fx = Fixture::new();
    std::fs::write(fx.root.join("a.txt"), "hello").unwrap();

    let engine = build_engine(fx.home.path(), &fx.config, fx.executor());
    engine
        .record(PathIdentifier::parse("a.txt").unwrap(), EventKind::Created)
        .await
        .unwrap();

    let daemon = tokio::spawn(serve(
        fx.home.path().to_path_buf(),
        fx.config.clone(),
        engine.clone(),
    ));

    let before = status(fx.home.path()).await;
    assert_eq!(before["running"], Value::Bool(true));
    assert_eq!(before["repository"], "octo/notes");
    assert_eq!(before["branch"], "main");
    assert_eq!(before["pending"], 1);
    assert_eq!(before["timer_armed"], Value::Bool(true));
    assert!(before["last_flush"].is_null());

    let home = fx.home.path().to_path_buf();
    let flushed = blocking(move || request(&home, ControlCommand::Flush)).await.expect("flush");
    assert_eq!(flushed["flushed"], Value::Bool(true));
    assert_eq!(flushed["summary"]["succeeded"], 1);
    assert_eq!(flushed["results"][0]["outcome"]["status"], "created");
    assert_eq!(
        fx.store.content(&PathIdentifier::parse("a.txt").unwrap()).as_deref(),
        Some(&b"hello"[..])
    );

    let state = state_store::load_at(fx.home.path()).expect("state");
    assert!(state.files.contains_key("a.txt"), "flush recorded in mirror state");

    let after = status(fx.home.path()).await;
    assert_eq!(after["pending"], 0);
    assert_eq!(after["last_flush"]["trigger"], "manual");

    let home = fx.home.path().to_path_buf();
    let again = blocking(move || request(&home, ControlCommand::Flush)).await.expect("empty flush");
    assert_eq!(again["flushed"], Value::Bool(false));

    let home = fx.home.path().to_path_buf();
    blocking(move || request(&home, ControlCommand::Stop)).await.expect("stop");
    daemon.await.expect("join").expect("daemon exits cleanly");
    assert!(!foldermirror_daemon::paths::socket_path(fx.home.path()).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_flushes_changes_seen_by_the_watcher() {
    let fx = Fixture::new();
    let engine = build_engine(fx.home.path(), &fx.config, fx.executor());
    let daemon = tokio::spawn(serve(
        fx.home.path().to_path_buf(),
        fx.config.clone(),
        engine.clone(),
    ));

    // Socket up means the watcher task has been spawned too; give it a moment
    // to register before touching the tree.
    status(fx.home.path()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::create_dir_all(fx.root.join("docs")).unwrap();
    std::fs::write(fx.root.join("docs").join("note.md"), "watched").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.pending_len().await == 0 {
        assert!(Instant::now() < deadline, "watcher never reported the new file");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let home = fx.home.path().to_path_buf();
    blocking(move || request(&home, ControlCommand::Stop)).await.expect("stop");
    daemon.await.expect("join").expect("daemon exits cleanly");

    assert_eq!(
        fx.store
            .content(&PathIdentifier::parse("docs/note.md").unwrap())
            .as_deref(),
        Some(&b"watched"[..]),
        "shutdown flushes the pending upload",
    );
}
