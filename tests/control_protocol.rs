//! End-to-end exercises of the control protocol against a running `Engine`,
//! using real child processes (`sleep`, `/bin/false`) rather than mocking
//! the process boundary.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use procwarden::{Config, Engine};

fn socket_path() -> PathBuf {
    let dir = std::env::temp_dir();
    let unique = format!(
        "procwarden-test-{}-{}.sock",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );
    dir.join(unique)
}

fn connect_with_retry(path: &PathBuf) -> UnixStream {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Err(err) => panic!("failed to connect to control socket: {err}"),
        }
    }
}

/// Sends `line` and reads back one framed response line (the protocol's
/// leading blank line, then the payload).
fn send_and_read(reader: &mut BufReader<UnixStream>, line: &str) -> String {
    reader.get_mut().write_all(format!("{line}\n").as_bytes()).unwrap();
    let mut blank = String::new();
    reader.read_line(&mut blank).expect("blank framing line");
    assert_eq!(blank, "\n", "expected leading blank line before response");
    let mut payload = String::new();
    reader.read_line(&mut payload).expect("response payload");
    payload.trim_end().to_string()
}

fn start_engine(yaml: &str, sock: &PathBuf) -> thread::JoinHandle<()> {
    let yaml = yaml.replace("__SOCK__", sock.to_str().unwrap());
    let config = Config::from_yaml(&yaml).expect("valid config");
    let engine = Engine::new(config).expect("engine construction");
    thread::spawn(move || {
        let _ = engine.run();
    })
}

#[test]
fn status_reports_every_configured_child() {
    let sock = socket_path();
    let _engine = start_engine(
        "run:\n  a: \"sleep 5\"\n  b: \"sleep 5\"\nglobal:\n  listen: \"unix/:__SOCK__\"\n",
        &sock,
    );

    let stream = connect_with_retry(&sock);
    let mut reader = BufReader::new(stream);

    // status emits one line per child; gather both.
    reader
        .get_mut()
        .write_all(b"status\n")
        .unwrap();
    let mut lines = Vec::new();
    for _ in 0..2 {
        let mut blank = String::new();
        reader.read_line(&mut blank).unwrap();
        assert_eq!(blank, "\n");
        let mut payload = String::new();
        reader.read_line(&mut payload).unwrap();
        lines.push(payload.trim_end().to_string());
    }

    assert!(lines.iter().any(|l| l.starts_with("a up")));
    assert!(lines.iter().any(|l| l.starts_with("b up")));

    let _ = std::fs::remove_file(&sock);
}

#[test]
fn stop_then_start_round_trip() {
    let sock = socket_path();
    let _engine = start_engine(
        "run:\n  y: \"sleep 5\"\nglobal:\n  listen: \"unix/:__SOCK__\"\n",
        &sock,
    );

    let stream = connect_with_retry(&sock);
    let mut reader = BufReader::new(stream);

    // give the child a moment to actually be running.
    thread::sleep(Duration::from_millis(100));

    assert_eq!(send_and_read(&mut reader, "stop y"), "stop y 1");
    assert_eq!(send_and_read(&mut reader, "status"), "y down");
    // stopping an already-stopped child fails.
    assert_eq!(send_and_read(&mut reader, "stop y"), "stop y fail");

    assert_eq!(send_and_read(&mut reader, "start y"), "start y 1");
    thread::sleep(Duration::from_millis(50));
    let status = send_and_read(&mut reader, "status");
    assert!(status.starts_with("y up"), "expected y up, got {status}");

    let _ = std::fs::remove_file(&sock);
}

#[test]
fn unknown_child_name_is_reported_unknown() {
    let sock = socket_path();
    let _engine = start_engine(
        "run:\n  z: \"sleep 5\"\nglobal:\n  listen: \"unix/:__SOCK__\"\n",
        &sock,
    );

    let stream = connect_with_retry(&sock);
    let mut reader = BufReader::new(stream);

    assert_eq!(send_and_read(&mut reader, "start zzz"), "start zzz unknown");
    assert_eq!(send_and_read(&mut reader, "bogus command"), "bogus command unknown");

    let _ = std::fs::remove_file(&sock);
}

#[test]
fn quit_closes_the_connection() {
    let sock = socket_path();
    let _engine = start_engine(
        "run:\n  q: \"sleep 5\"\nglobal:\n  listen: \"unix/:__SOCK__\"\n",
        &sock,
    );

    let mut stream = connect_with_retry(&sock);
    stream.write_all(b"quit\n").unwrap();

    let mut buf = [0u8; 16];
    use std::io::Read;
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(n, 0, "connection should be closed after quit");

    let _ = std::fs::remove_file(&sock);
}

#[test]
fn retry_exhaustion_marks_child_broken() {
    let sock = socket_path();
    let _engine = start_engine(
        "run:\n  x:\n    cmd: \"/bin/false\"\n    start_delay: 0\n    start_retries: 3\nglobal:\n  listen: \"unix/:__SOCK__\"\n",
        &sock,
    );

    let stream = connect_with_retry(&sock);
    let mut reader = BufReader::new(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = send_and_read(&mut reader, "status");
        if status == "x fail 3" {
            break;
        }
        if Instant::now() > deadline {
            panic!("child never reached broken state, last status: {status}");
        }
        thread::sleep(Duration::from_millis(50));
    }

    let _ = std::fs::remove_file(&sock);
}
