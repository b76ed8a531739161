//! Raw-stream session tests: a real session loop and shell on one end of an
//! in-memory duplex, the controller link on the other.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use cmdlink::connection::run_session;
use cmdlink::controller::{ControlLink, StreamLink};
use cmdlink::dispatch::DispatchSettings;
use cmdlink::protocol::{StreamReader, StreamWriter, MAX_FIELD_SIZE};
use cmdlink::{Dispatcher, Response, SessionConfig, SessionId, SessionStore, SystemShell, TransportKind};

type Link = StreamLink<tokio::io::DuplexStream>;

fn dispatcher(timeout: Duration) -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::new(Arc::new(SessionStore::new()), Arc::new(SystemShell::new()))
        .with_settings(DispatchSettings {
            exec_timeout: timeout,
            ..Default::default()
        });
    Arc::new(dispatcher)
}

fn open(dispatcher: &Arc<Dispatcher>, cwd: &Path) -> (Link, JoinHandle<cmdlink::Result<SessionId>>) {
    let (controller, agent) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(agent);
    let task = tokio::spawn(run_session(
        StreamReader::new(read),
        StreamWriter::new(write),
        Arc::clone(dispatcher),
        SessionConfig::new(cwd, TransportKind::Stream),
        "agent-under-test",
    ));
    (StreamLink::new(controller), task)
}

async fn ask(link: &mut Link, command: &str) -> Response {
    link.send_command(command).await.unwrap();
    link.recv_response().await.unwrap().unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn test_cd_then_pwd() {
    let dispatcher = dispatcher(Duration::from_secs(10));
    let (mut link, _task) = open(&dispatcher, Path::new("/"));
    let tmp = Path::new("/tmp").canonicalize().unwrap();
    let tmp = tmp.display().to_string();

    let welcome = link.recv_response().await.unwrap().unwrap();
    assert_eq!(welcome.text(), "Connected to agent-under-test. CWD: /");

    let cd = ask(&mut link, "cd /tmp").await;
    assert_eq!(cd.text(), "");
    assert_eq!(cd.cwd(), tmp);

    let pwd = ask(&mut link, "pwd").await;
    assert_eq!(pwd.text(), format!("{}\n", tmp));
    assert_eq!(pwd.cwd(), tmp);
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_cd_is_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir(root.join("inner")).unwrap();
    let dispatcher = dispatcher(Duration::from_secs(10));
    let (mut link, _task) = open(&dispatcher, &root);
    link.recv_response().await.unwrap();

    let moved = ask(&mut link, "true && cd inner && echo moved").await;
    assert_eq!(moved.text(), "moved\n");
    assert_eq!(moved.cwd(), root.join("inner").display().to_string());

    let stderr = ask(&mut link, "echo out; echo oops 1>&2").await;
    assert_eq!(stderr.text(), "out\n\nError: oops\n");
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_leaves_session_usable() {
    let dispatcher = dispatcher(Duration::from_millis(300));
    let (mut link, _task) = open(&dispatcher, Path::new("/"));
    link.recv_response().await.unwrap();

    let slow = ask(&mut link, "sleep 5").await;
    assert_eq!(slow.text(), "Command timed out");
    assert_eq!(slow.cwd(), "/");

    let fast = ask(&mut link, "echo alive").await;
    assert_eq!(fast.text(), "alive\n");
}

#[cfg(unix)]
#[tokio::test]
async fn test_huge_output_is_clipped_and_session_survives() {
    let dispatcher = dispatcher(Duration::from_secs(60));
    let (mut link, task) = open(&dispatcher, Path::new("/"));
    link.recv_response().await.unwrap();

    let big = ask(&mut link, "head -c 17000000 /dev/zero | tr '\\0' a").await;
    assert_eq!(big.tag(), "output");
    assert!(big.text().len() < MAX_FIELD_SIZE);
    assert!(big.text().starts_with(&"a".repeat(1024)));
    assert!(big.text().contains("[output truncated: "));

    let next = ask(&mut link, "echo still here").await;
    assert_eq!(next.text(), "still here\n");
    assert_eq!(dispatcher.store().count(), 1);
    assert!(!task.is_finished());
}

#[tokio::test]
async fn test_download_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher(Duration::from_secs(10));
    let (mut link, _task) = open(&dispatcher, dir.path());
    link.recv_response().await.unwrap();

    let reply = ask(&mut link, "download missing.txt").await;
    assert_eq!(reply.text(), "The file missing.txt does not exist");
    assert_eq!(reply.cwd(), dir.path().display().to_string());
}

#[tokio::test]
async fn test_concurrent_sessions_list_each_other() {
    let dispatcher = dispatcher(Duration::from_secs(10));
    let (mut a, _ta) = open(&dispatcher, Path::new("/"));
    let (mut b, _tb) = open(&dispatcher, Path::new("/tmp"));
    a.recv_response().await.unwrap();
    b.recv_response().await.unwrap();

    let (from_a, from_b) = tokio::join!(ask(&mut a, "list"), ask(&mut b, "LIST"));

    for list in [&from_a, &from_b] {
        let rows: Vec<&str> = list.text().lines().skip(2).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.ends_with(" /")));
        assert!(rows.iter().any(|r| r.ends_with(" /tmp")));
    }
    assert_eq!(from_a.cwd(), "/");
    assert_eq!(from_b.cwd(), "/tmp");
}

#[tokio::test]
async fn test_exit_ends_session() {
    let dispatcher = dispatcher(Duration::from_secs(10));
    let (mut link, task) = open(&dispatcher, Path::new("/"));
    link.recv_response().await.unwrap();
    assert_eq!(dispatcher.store().count(), 1);

    let bye = ask(&mut link, "Exit").await;
    assert_eq!(bye.text(), "Disconnecting...");
    assert!(link.recv_response().await.unwrap().is_none());

    task.await.unwrap().unwrap();
    assert_eq!(dispatcher.store().count(), 0);
}

#[tokio::test]
async fn test_controller_drop_removes_session() {
    let dispatcher = dispatcher(Duration::from_secs(10));
    let (mut link, task) = open(&dispatcher, Path::new("/"));
    link.recv_response().await.unwrap();

    drop(link);
    task.await.unwrap().unwrap();
    assert_eq!(dispatcher.store().count(), 0);
}
