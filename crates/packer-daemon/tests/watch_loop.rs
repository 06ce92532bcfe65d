use anyhow::Result;
use packer_bundle::plugins::{CombineJs, JsEntry};
use packer_core::PackerConfig;
use packer_daemon::{Packer, PackerState};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEBOUNCE_MS: u64 = 100;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// a.js -> b.js -> c.js
fn chain_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.js", "module.exports = require('./b');");
    write(dir.path(), "src/b.js", "module.exports = require('./c');");
    write(dir.path(), "src/c.js", "module.exports = 'first';");
    dir
}

fn packer(dir: &TempDir) -> Packer {
    let mut config = PackerConfig::for_context(dir.path()).unwrap();
    config.watch.debounce_ms = DEBOUNCE_MS;
    Packer::new(config)
        .with_plugin(JsEntry::new("src/a.js"))
        .with_plugin(CombineJs::new("app.js"))
}

struct Running {
    feed: mpsc::Sender<PathBuf>,
    shutdown: CancellationToken,
    handle: JoinHandle<Packer>,
}

impl Running {
    fn start(mut packer: Packer) -> Self {
        let (feed, events) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            packer.watch_with(events, token).await.unwrap();
            packer
        });
        Self {
            feed,
            shutdown,
            handle,
        }
    }

    async fn stop(self) -> Packer {
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS * 4)).await;
        self.shutdown.cancel();
        self.handle.await.unwrap()
    }
}

fn bundle(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("dist/app.js")).unwrap()
}

#[tokio::test]
async fn test_second_pass_without_changes_writes_nothing() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);

    let first = packer.run().await?;
    assert_eq!(first.emitted_files, vec!["app.js.map", "app.js"]);
    assert_eq!(first.changed_files, first.emitted_files);
    assert_eq!(first.emitted_js_files, vec!["app.js"]);

    let second = packer.run().await?;
    assert_eq!(second.emitted_files, first.emitted_files);
    assert!(second.changed_files.is_empty());
    assert_eq!(packer.state(), PackerState::Idle);
    assert!(packer.performance().total("combine-js").is_some());
    Ok(())
}

#[tokio::test]
async fn test_touching_leaf_rebuilds_through_the_chain() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);
    packer.run().await?;
    assert!(bundle(&dir).contains("'first'"));

    let running = Running::start(packer);
    let c = write(dir.path(), "src/c.js", "module.exports = 'second';");
    running.feed.send(c).await?;
    let packer = running.stop().await;

    assert_eq!(packer.runs(), 2);
    let result = packer.last_result().unwrap();
    assert_eq!(result.changed_files, vec!["app.js.map", "app.js"]);
    assert!(bundle(&dir).contains("'second'"));
    Ok(())
}

#[tokio::test]
async fn test_burst_of_notifications_runs_one_pass() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);
    packer.run().await?;

    let running = Running::start(packer);
    let b = write(dir.path(), "src/b.js", "module.exports = require('./c') + 1;");
    for _ in 0..5 {
        running.feed.send(b.clone()).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let packer = running.stop().await;

    assert_eq!(packer.runs(), 2);
    assert!(bundle(&dir).contains("+ 1;"));
    Ok(())
}

#[tokio::test]
async fn test_unwatched_and_relative_paths_are_ignored() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);
    packer.run().await?;

    let running = Running::start(packer);
    let stray = write(dir.path(), "notes.txt", "hello");
    running.feed.send(stray).await?;
    running.feed.send(PathBuf::from("src/c.js")).await?;
    let packer = running.stop().await;

    assert_eq!(packer.runs(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_pass_keeps_output_and_loop_alive() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);
    packer.run().await?;
    let before = bundle(&dir);

    let running = Running::start(packer);
    let b = write(dir.path(), "src/b.js", "module.exports = require('./missing');");
    running.feed.send(b.clone()).await?;
    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS * 4)).await;
    assert_eq!(bundle(&dir), before);

    write(dir.path(), "src/b.js", "module.exports = require('./c') + 2;");
    running.feed.send(b).await?;
    let packer = running.stop().await;

    assert_eq!(packer.runs(), 3);
    assert_eq!(packer.state(), PackerState::Idle);
    assert!(bundle(&dir).contains("+ 2;"));
    Ok(())
}

#[tokio::test]
async fn test_deleted_dependency_fails_until_restored() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);
    packer.run().await?;
    let before = bundle(&dir);

    let running = Running::start(packer);
    let b = dir.path().join("src/b.js");
    fs::remove_file(&b)?;
    running.feed.send(b.clone()).await?;
    let packer = running.stop().await;

    assert_eq!(packer.runs(), 2);
    assert_eq!(packer.state(), PackerState::Failed);
    assert_eq!(bundle(&dir), before);

    let running = Running::start(packer);
    write(dir.path(), "src/b.js", "module.exports = require('./c') + 3;");
    running.feed.send(b).await?;
    let packer = running.stop().await;

    assert_eq!(packer.runs(), 3);
    assert_eq!(packer.state(), PackerState::Idle);
    assert!(bundle(&dir).contains("+ 3;"));
    Ok(())
}

/// Write to a temp file and rename it over `rel`, the way many editors save.
fn save_by_rename(root: &Path, rel: &str, content: &str) {
    let tmp = root.join(format!("{rel}.swp"));
    fs::write(&tmp, content).unwrap();
    fs::rename(&tmp, root.join(rel)).unwrap();
}

async fn wait_for_bundle(dir: &TempDir, needle: &str) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        let current = fs::read_to_string(dir.path().join("dist/app.js")).unwrap_or_default();
        if current.contains(needle) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_notify_backend_follows_replaced_and_deleted_files() -> Result<()> {
    let dir = chain_project();
    let mut packer = packer(&dir);
    packer.run().await?;

    // Paths read before the watcher exists are handed to it when it attaches.
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        packer.watch(token).await.unwrap();
        packer
    });
    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS * 2)).await;

    save_by_rename(dir.path(), "src/c.js", "module.exports = 'second';");
    assert!(wait_for_bundle(&dir, "'second'").await);
    save_by_rename(dir.path(), "src/c.js", "module.exports = 'third';");
    assert!(wait_for_bundle(&dir, "'third'").await);
    write(dir.path(), "src/c.js", "module.exports = 'fourth';");
    assert!(wait_for_bundle(&dir, "'fourth'").await);

    fs::remove_file(dir.path().join("src/b.js"))?;
    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS * 5)).await;
    shutdown.cancel();
    let packer = handle.await?;

    assert_eq!(packer.state(), PackerState::Failed);
    assert!(bundle(&dir).contains("'fourth'"));
    Ok(())
}
