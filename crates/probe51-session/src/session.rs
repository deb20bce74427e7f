//! Session facade
//!
//! The public operation surface over the protocol engine. Each operation is
//! a short protocol script: send one or more commands, await a fixed
//! sequence of expectations, shape the result. One logical caller drives
//! the session at a time; callers serialize their own operations.

use std::fmt;
use std::sync::Arc;

use probe51_listing::AddressLineMap;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::disasm::{self, Instruction};
use crate::error::{Error, Result};
use crate::expect::ExpectQueue;
use crate::sanitize::LineAssembler;
use crate::status::{self, RegisterSnapshot};
use crate::transport::{PtyTransport, Transport, TransportEvent};
use crate::wire;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
    Terminating,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Terminating => write!(f, "terminating"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// A live debugging session over one monitor process.
pub struct Session<T: Transport> {
    transport: T,
    queue: ExpectQueue,
    state: SessionState,
    /// Built once per target and cached for the session's lifetime.
    map: Option<Arc<AddressLineMap>>,
    exit: Option<oneshot::Receiver<i32>>,
    observer: Option<mpsc::UnboundedReceiver<String>>,
    consumer: JoinHandle<()>,
}

impl Session<PtyTransport> {
    /// Spawn the monitor executable and complete the handshake.
    pub async fn initialize(program: &str, args: &[String]) -> Result<Self> {
        let transport = PtyTransport::spawn(program, args)?;
        Self::start(transport).await
    }
}

impl<T: Transport> Session<T> {
    /// Attach to an already-constructed transport and complete the
    /// handshake: a throwaway status read proves the shell accepts input.
    pub async fn start(mut transport: T) -> Result<Self> {
        let events = transport.take_events().ok_or(Error::Closed)?;
        let queue = ExpectQueue::new(wire::PROMPT.clone());
        let (exit_tx, exit_rx) = oneshot::channel();
        let (observer_tx, observer_rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume(events, queue.clone(), observer_tx, exit_tx));

        let mut session = Self {
            transport,
            queue,
            state: SessionState::Uninitialized,
            map: None,
            exit: Some(exit_rx),
            observer: Some(observer_rx),
            consumer,
        };
        session.read_status().await?;
        session.state = SessionState::Ready;
        info!("session ready");
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Raw monitor output, forwarded verbatim regardless of parse success.
    /// Yields `Some` exactly once.
    pub fn observe(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.observer.take()
    }

    /// Supply the line→address table for the current target. The first map
    /// wins; the session caches it for its lifetime.
    pub fn load_map(&mut self, map: AddressLineMap) {
        if self.map.is_none() {
            debug!(lines = map.len(), "address/line map cached");
            self.map = Some(Arc::new(map));
        }
    }

    pub fn has_map(&self) -> bool {
        self.map.is_some()
    }

    /// Replace all breakpoints with one per requested source line, then
    /// query the monitor back and return the lines it actually armed.
    pub async fn set_breakpoints(&mut self, lines: &[usize]) -> Result<Vec<usize>> {
        self.ensure_stopped("set_breakpoints")?;
        let map = self
            .map
            .clone()
            .ok_or(Error::StaleSession("set_breakpoints"))?;

        self.transport.send_line(wire::CMD_CLEAR)?;
        self.queue.await_single(&wire::PROMPT).await?;

        for &line in lines {
            let addr = map
                .addr_for_line(line)
                .ok_or(Error::StaleSession("set_breakpoints"))?;
            self.transport.send_line(&wire::break_cmd(addr))?;
            self.queue.await_single(&wire::PROMPT).await?;
        }

        self.transport.send_line(wire::CMD_LIST_BREAKS)?;
        let listed = self.queue.await_until_prompt(&wire::BREAK_LINE).await?;

        let mut actual = Vec::with_capacity(listed.len());
        for m in &listed {
            let addr = wire::parse_addr(m.require(1)?).ok_or_else(|| Error::ProtocolMismatch {
                raw: m.line.clone(),
            })?;
            if let Some(line) = map.last_line_for_addr(addr) {
                actual.push(line);
            }
        }
        info!(requested = lines.len(), armed = actual.len(), "breakpoints set");
        Ok(actual)
    }

    /// Resume until the next stop and report the resulting snapshot.
    pub async fn continue_run(&mut self) -> Result<RegisterSnapshot> {
        self.resume(wire::CMD_CONTINUE).await
    }

    /// Step one source line, stepping over calls.
    pub async fn next(&mut self) -> Result<RegisterSnapshot> {
        self.resume(wire::CMD_NEXT).await
    }

    /// Step one source line, stepping into calls.
    pub async fn step(&mut self) -> Result<RegisterSnapshot> {
        self.resume(wire::CMD_STEP).await
    }

    /// Read the current register dump.
    pub async fn status(&mut self) -> Result<RegisterSnapshot> {
        self.ensure_stopped("status")?;
        self.read_status().await
    }

    /// Read a single register as an uppercase hex string.
    pub async fn read_register(&mut self, name: &str) -> Result<String> {
        self.ensure_stopped("read_register")?;
        self.transport.send_line(&wire::get_cmd(name))?;
        let matches = self
            .queue
            .await_sequence(&[wire::VALUE_LINE.clone(), wire::PROMPT.clone()])
            .await?;
        Ok(matches[0].require(1)?.to_ascii_uppercase())
    }

    /// Write a single register and confirm the monitor echoed the value.
    pub async fn write_register(&mut self, name: &str, value: u16) -> Result<()> {
        self.ensure_stopped("write_register")?;
        self.transport.send_line(&wire::set_cmd(name, value))?;
        let matches = self
            .queue
            .await_sequence(&[wire::VALUE_LINE.clone(), wire::PROMPT.clone()])
            .await?;
        matches[0].require(1)?;
        Ok(())
    }

    /// Send a raw command and return its response lines verbatim, echo
    /// excluded.
    pub async fn evaluate(&mut self, command: &str) -> Result<Vec<String>> {
        self.ensure_stopped("evaluate")?;
        self.transport.send_line(command)?;
        let lines = self.queue.await_until_prompt(&wire::ANY_LINE).await?;
        Ok(lines.into_iter().map(|m| m.line).collect())
    }

    /// Disassemble `count` instructions starting `offset` instructions away
    /// from `addr`. Indices before the program start come back synthetic.
    pub async fn disassemble(
        &mut self,
        addr: i64,
        offset: i64,
        count: usize,
    ) -> Result<Vec<Instruction>> {
        self.ensure_stopped("disassemble")?;
        let map = self.map.clone().ok_or(Error::StaleSession("disassemble"))?;

        let plan = disasm::plan_window(&map, addr, offset, count);
        let mut out = plan.synthetic;
        if let Some(window) = plan.device {
            self.transport
                .send_line(&wire::dis_cmd(window.addr, window.count))?;
            let lines = self.queue.await_until_prompt(&wire::DIS_LINE).await?;
            for m in &lines {
                out.push(disasm::device_record(&map, m)?);
            }
        }
        Ok(out)
    }

    /// Graceful shutdown: ask the monitor to quit and surface its exit
    /// code. Non-zero codes are reported verbatim as a failure.
    pub async fn terminate(&mut self) -> Result<()> {
        self.state = SessionState::Terminating;
        self.transport.send_line(wire::CMD_QUIT)?;
        let exit = self.exit.take().ok_or(Error::Closed)?;
        let code = exit.await.map_err(|_| Error::Closed)?;
        self.state = SessionState::Terminated;
        if code != 0 {
            return Err(Error::AbnormalExit(code));
        }
        Ok(())
    }

    /// Non-graceful teardown: kill the process and abandon any pending
    /// expectations. Their awaiters observe [`Error::Closed`].
    pub fn disconnect(&mut self) {
        debug!("disconnecting session");
        self.transport.kill();
        self.queue.close();
        self.consumer.abort();
        self.state = SessionState::Terminated;
    }

    async fn resume(&mut self, command: &'static str) -> Result<RegisterSnapshot> {
        self.ensure_stopped(command)?;
        self.transport.send_line(command)?;
        self.state = SessionState::Running;
        // The stop notice is free-form; only the prompt is structural.
        self.queue.await_single(&wire::PROMPT).await?;
        self.state = SessionState::Stopped;
        trace!(command, "target stopped");
        self.read_status().await
    }

    async fn read_status(&mut self) -> Result<RegisterSnapshot> {
        self.transport.send_line(wire::CMD_REGS)?;
        let matches = self
            .queue
            .await_sequence(&[
                wire::REG_MAIN.clone(),
                wire::REG_GPR.clone(),
                wire::PROMPT.clone(),
            ])
            .await?;
        status::snapshot_from_lines(&matches[0], &matches[1], self.map.as_deref())
    }

    fn ensure_stopped(&self, op: &'static str) -> Result<()> {
        match self.state {
            SessionState::Ready | SessionState::Stopped => Ok(()),
            _ => Err(Error::StaleSession(op)),
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Terminated {
            self.transport.kill();
            self.queue.close();
            self.consumer.abort();
        }
    }
}

/// The single consumer loop: the only place the matcher algorithm runs.
/// Raw chunks go to the observation channel verbatim, then through the
/// sanitizer into the matcher queue, line by line.
async fn consume(
    mut events: mpsc::Receiver<TransportEvent>,
    queue: ExpectQueue,
    observer: mpsc::UnboundedSender<String>,
    exit_tx: oneshot::Sender<i32>,
) {
    let mut assembler = LineAssembler::new(wire::PROMPT.clone());
    let mut exit_tx = Some(exit_tx);
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Output(chunk) => {
                let _ = observer.send(String::from_utf8_lossy(&chunk).into_owned());
                for line in assembler.push_chunk(&chunk) {
                    trace!(line = %line, "monitor");
                    queue.offer(&line);
                }
            }
            TransportEvent::Exited(code) => {
                debug!(code, "monitor exited");
                if let Some(tx) = exit_tx.take() {
                    let _ = tx.send(code);
                }
                break;
            }
        }
    }
    // Nothing can resolve past this point; fail any pending expectation.
    queue.close();
}
