//! Monitor transport
//!
//! Owns the spawned monitor process and its pseudo-terminal. The pty is not
//! optional: the wrapped tool detects pipe vs terminal and fully buffers its
//! output on a pipe, which would starve the protocol engine until exit.

use std::io::{Read, Write};

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// Capacity of the raw-output channel between the pty reader and the
/// protocol consumer loop.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by a transport's background tasks.
#[derive(Debug)]
pub enum TransportEvent {
    /// A raw output chunk; chunks are not aligned to line boundaries.
    Output(Vec<u8>),
    /// The child process exited with the given code.
    Exited(i32),
}

/// Byte-level access to the monitor process.
///
/// The seam that lets tests drive a session from a scripted in-memory
/// transport instead of a real pty.
pub trait Transport: Send {
    /// Write one command line, CRLF-terminated.
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Take the event stream. Yields `Some` exactly once.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Tear the child down unconditionally, without protocol exchange.
    fn kill(&mut self);
}

/// The production transport: a child process on a pseudo-terminal.
pub struct PtyTransport {
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    /// Keeps the pty master (and its line discipline) alive for the
    /// lifetime of the session.
    _master: Box<dyn MasterPty + Send>,
}

impl PtyTransport {
    /// Spawn the monitor in interactive mode and start the reader and
    /// child-wait tasks.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        // CommandBuilder starts from an empty environment.
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "vt100");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::Spawn(e.to_string()))?;
        drop(pair.slave);

        let pid = child.process_id().unwrap_or(0);
        info!(pid, program, "monitor spawned");

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Spawn(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Spawn(e.to_string()))?;
        let killer = child.clone_killer();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let output_tx = tx.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx
                            .blocking_send(TransportEvent::Output(buf[..n].to_vec()))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            trace!("pty reader finished");
        });

        tokio::task::spawn_blocking(move || {
            let code = child.wait().map(|status| status.exit_code() as i32).unwrap_or(-1);
            debug!(code, "monitor process exited");
            let _ = tx.blocking_send(TransportEvent::Exited(code));
        });

        Ok(Self {
            writer,
            killer,
            events: Some(rx),
            _master: pair.master,
        })
    }
}

impl Transport for PtyTransport {
    fn send_line(&mut self, line: &str) -> Result<()> {
        trace!(command = %line, "send");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    fn kill(&mut self) {
        let _ = self.killer.kill();
    }
}
