//! The control server: a line-oriented protocol over a TCP or UNIX-domain
//! socket. Each connection runs on its own thread that does exactly one
//! blocking thing at a time (read a line, or wait for a reply) and funnels
//! every parsed command through the engine's single state-owning loop via
//! [`EngineEvent::Control`] — so a connection thread never touches `Child`
//! state directly.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender};
use tracing::{debug, warn};

use crate::config::listen::ListenAddr;
use crate::engine::EngineEvent;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LINE_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Start,
    Stop,
    Reload,
    Restart,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Start => "start",
            OpKind::Stop => "stop",
            OpKind::Reload => "reload",
            OpKind::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Op(OpKind, String),
    Unknown(String),
}

/// A parsed command plus the reply channel the connection thread is
/// blocking on. The engine computes the response lines and sends them back;
/// the connection thread only knows how to frame and write them.
pub struct ControlRequest {
    pub command: Command,
    pub reply: Sender<Vec<String>>,
}

fn parse_line(line: &str) -> Command {
    let line = line.trim();
    if line == "status" {
        return Command::Status;
    }
    let mut parts = line.splitn(2, ' ');
    let op = parts.next().unwrap_or("");
    let name = parts.next().map(str::trim);
    match (op, name) {
        ("start", Some(n)) if !n.is_empty() => Command::Op(OpKind::Start, n.to_string()),
        ("stop", Some(n)) if !n.is_empty() => Command::Op(OpKind::Stop, n.to_string()),
        ("reload", Some(n)) if !n.is_empty() => Command::Op(OpKind::Reload, n.to_string()),
        ("restart", Some(n)) if !n.is_empty() => Command::Op(OpKind::Restart, n.to_string()),
        _ => Command::Unknown(line.to_string()),
    }
}

/// Starts accepting connections on `addr`, forwarding parsed commands to
/// `events`. Runs forever on a dedicated thread; the returned `JoinHandle`
/// is only useful for propagating a panic, since there's no clean way to
/// interrupt `accept()` short of closing the socket.
pub fn serve(addr: ListenAddr, events: Sender<EngineEvent>) -> io::Result<thread::JoinHandle<()>> {
    match addr {
        ListenAddr::Tcp(socket_addr) => {
            let listener = TcpListener::bind(socket_addr)?;
            Ok(thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    let events = events.clone();
                    thread::spawn(move || handle_connection(stream, events));
                }
            }))
        }
        ListenAddr::Unix(path) => {
            if path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("unix socket path already in use: {}", path.display()),
                ));
            }
            let listener = UnixListener::bind(&path)?;
            Ok(thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    let events = events.clone();
                    thread::spawn(move || handle_connection(stream, events));
                }
            }))
        }
    }
}

/// Removes the UNIX-domain socket file on graceful shutdown. A no-op for
/// TCP listeners and for `listen` configurations that were never set.
pub fn cleanup(addr: &Option<ListenAddr>) {
    if let Some(ListenAddr::Unix(path)) = addr {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to unlink control socket");
            }
        }
    }
}

trait Conn: Read + Write {
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;
}

impl Conn for std::net::TcpStream {
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        std::net::TcpStream::set_read_timeout(self, dur)
    }
}

impl Conn for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, dur)
    }
}

fn handle_connection<S: Conn>(stream: S, events: Sender<EngineEvent>) {
    if let Err(err) = stream.set_read_timeout(Some(IDLE_TIMEOUT)) {
        warn!(error = %err, "failed to set control connection idle timeout");
        return;
    }

    let mut reader = BufReader::new(stream);
    loop {
        let mut raw = Vec::new();
        match read_line_capped(&mut reader, &mut raw) {
            ReadOutcome::Eof => return,
            ReadOutcome::TooLong => {
                debug!("control connection closed: line exceeded buffer cap");
                return;
            }
            ReadOutcome::TimedOut | ReadOutcome::Error => {
                debug!("control connection closed: idle timeout or I/O error");
                return;
            }
            ReadOutcome::Line => {}
        }

        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "." {
            return;
        }

        let command = parse_line(&line);
        let (reply_tx, reply_rx) = bounded(1);
        let request = ControlRequest {
            command,
            reply: reply_tx,
        };
        if events.send(EngineEvent::Control(request)).is_err() {
            return; // engine has shut down
        }
        let Ok(lines) = reply_rx.recv() else {
            return;
        };

        let stream = reader.get_mut();
        for response_line in lines {
            let framed = format!("\n{}\n", response_line);
            if stream.write_all(framed.as_bytes()).is_err() {
                return;
            }
        }
    }
}

enum ReadOutcome {
    Line,
    Eof,
    TooLong,
    TimedOut,
    Error,
}

fn read_line_capped<R: BufRead>(reader: &mut R, out: &mut Vec<u8>) -> ReadOutcome {
    loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::TimedOut,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => return ReadOutcome::TimedOut,
            Err(_) => return ReadOutcome::Error,
        };
        if buf.is_empty() {
            return if out.is_empty() {
                ReadOutcome::Eof
            } else {
                ReadOutcome::Line
            };
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            out.extend_from_slice(&buf[..pos]);
            let consumed = pos + 1;
            reader.consume(consumed);
            if out.len() > MAX_LINE_BYTES {
                return ReadOutcome::TooLong;
            }
            return ReadOutcome::Line;
        }
        out.extend_from_slice(buf);
        let len = buf.len();
        reader.consume(len);
        if out.len() > MAX_LINE_BYTES {
            return ReadOutcome::TooLong;
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_status() {
        assert_eq!(parse_line("status"), Command::Status);
    }

    #[test]
    fn parses_ops_with_child_name() {
        assert_eq!(
            parse_line("start web"),
            Command::Op(OpKind::Start, "web".to_string())
        );
        assert_eq!(
            parse_line("stop web"),
            Command::Op(OpKind::Stop, "web".to_string())
        );
        assert_eq!(
            parse_line("reload web"),
            Command::Op(OpKind::Reload, "web".to_string())
        );
        assert_eq!(
            parse_line("restart web"),
            Command::Op(OpKind::Restart, "web".to_string())
        );
    }

    #[test]
    fn unknown_command_is_preserved_verbatim() {
        assert_eq!(
            parse_line("frobnicate web"),
            Command::Unknown("frobnicate web".to_string())
        );
    }

    #[test]
    fn op_without_a_name_is_unknown() {
        assert_eq!(parse_line("start"), Command::Unknown("start".to_string()));
    }

    #[test]
    fn oversized_line_is_rejected() {
        let long_name = "x".repeat(100);
        let input = format!("start {}\n", long_name);
        let mut reader = BufReader::new(input.as_bytes());
        let mut out = Vec::new();
        assert_matches!(read_line_capped(&mut reader, &mut out), ReadOutcome::TooLong);
    }

    #[test]
    fn reads_a_normal_line() {
        let mut reader = BufReader::new("status\n".as_bytes());
        let mut out = Vec::new();
        assert_matches!(read_line_capped(&mut reader, &mut out), ReadOutcome::Line);
        assert_eq!(out, b"status");
    }
}
