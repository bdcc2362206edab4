//! Fake control daemon for behavioural tests.
//!
//! Listens on an ephemeral TCP port, accepts one connection and answers
//! control commands from a script. Replies are written in two halves so the
//! client's framer sees split reads.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

const ACCEPT_DEADLINE: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_EVENT: &str = "650 STATUS_CLIENT NOTICE CIRCUIT_ESTABLISHED\r\n";

/// How the fake daemon answers.
#[derive(Debug, Clone)]
pub(in crate::tests) struct DaemonScript {
    /// Hex credential the daemon accepts.
    pub cookie_hex: String,
    /// Progress values reported by successive bootstrap queries; the last
    /// value repeats.
    pub progress: Vec<u32>,
    /// Identifier reported on creation; `None` omits it.
    pub service_id: Option<String>,
    /// Writes an asynchronous status event before every reply.
    pub emit_events: bool,
}

#[derive(Debug, Default)]
struct DaemonState {
    commands: Vec<String>,
    polls: usize,
}

/// Scripted control daemon running on a background thread.
pub(in crate::tests) struct FakeControlDaemon {
    port: u16,
    state: Arc<Mutex<DaemonState>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl FakeControlDaemon {
    /// Spawns the daemon on an ephemeral port.
    pub fn spawn(script: DaemonScript) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let state = Arc::new(Mutex::new(DaemonState::default()));
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || Self::serve(&listener, &script, &thread_state));
        Ok(Self {
            port,
            state,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Command lines received so far, without terminators.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.commands.clone())
            .unwrap_or_default()
    }

    fn serve(
        listener: &TcpListener,
        script: &DaemonScript,
        state: &Arc<Mutex<DaemonState>>,
    ) -> Result<()> {
        let Some(stream) = Self::accept(listener)? else {
            return Ok(());
        };
        stream
            .set_nonblocking(false)
            .context("accepted stream blocking")?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .context("accepted stream timeout")?;
        let mut writer = stream.try_clone().context("clone stream")?;
        let mut reader = BufReader::new(stream);
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).context("read command")? == 0 {
                return Ok(());
            }
            let command = line.trim_end().to_owned();
            let reply = {
                let mut guard = state
                    .lock()
                    .map_err(|error| anyhow!("lock daemon state: {error}"))?;
                guard.commands.push(command.clone());
                Self::reply_to(&command, script, &mut guard)
            };
            if script.emit_events {
                writer
                    .write_all(STATUS_EVENT.as_bytes())
                    .context("write event")?;
            }
            write_split(&mut writer, &reply).context("write reply")?;
        }
    }

    fn accept(listener: &TcpListener) -> Result<Option<TcpStream>> {
        let deadline = Instant::now() + ACCEPT_DEADLINE;
        loop {
            match listener.accept() {
                Ok((stream, _)) => return Ok(Some(stream)),
                Err(ref error)
                    if error.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline =>
                {
                    thread::sleep(Duration::from_millis(10));
                }
                // Nothing connected; the scenario never reached the daemon.
                Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(error) => return Err(error).context("accept connection"),
            }
        }
    }

    fn reply_to(command: &str, script: &DaemonScript, state: &mut DaemonState) -> String {
        let mut words = command.split_whitespace();
        match (words.next(), words.next()) {
            (Some("AUTHENTICATE"), Some(credential)) if credential == script.cookie_hex => {
                String::from("250 OK\r\n")
            }
            (Some("AUTHENTICATE"), _) => {
                String::from("515 Authentication failed: Safe cookie response did not match\r\n")
            }
            (Some("GETINFO"), Some("status/bootstrap-phase")) => {
                let index = state.polls.min(script.progress.len().saturating_sub(1));
                let progress = script.progress.get(index).copied().unwrap_or(100);
                state.polls += 1;
                format!(
                    "250-status/bootstrap-phase=NOTICE BOOTSTRAP PROGRESS={progress} TAG=phase SUMMARY=\"Working\"\r\n250 OK\r\n"
                )
            }
            (Some("ADD_ONION"), _) => match &script.service_id {
                Some(id) => format!(
                    "250-ServiceID={id}\r\n250-PrivateKey=ED25519-V3:ZmFrZS1rZXk=\r\n250 OK\r\n"
                ),
                None => String::from("250 OK\r\n"),
            },
            (Some("DEL_ONION"), Some(_)) => String::from("250 OK\r\n"),
            _ => String::from("510 Unrecognized command\r\n"),
        }
    }
}

impl Drop for FakeControlDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn write_split(writer: &mut TcpStream, reply: &str) -> io::Result<()> {
    let bytes = reply.as_bytes();
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    writer.write_all(head)?;
    writer.flush()?;
    thread::sleep(Duration::from_millis(2));
    writer.write_all(tail)?;
    writer.flush()
}
