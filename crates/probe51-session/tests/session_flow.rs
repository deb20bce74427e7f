//! End-to-end session tests over a scripted in-memory transport.
//!
//! The script pairs each expected command with the monitor's canned reply,
//! delivered in deliberately small chunks so the tests also exercise line
//! reassembly across chunk boundaries.

use std::collections::VecDeque;

use probe51_listing::AddressLineMap;
use probe51_session::{Error, Session, SessionState, Transport, TransportEvent};
use tokio::sync::mpsc;

const BANNER: &str = "probe51 monitor 1.2\r\nready\r\n> ";

const DUMP_AT_RESET: &str = "regs\r\n\
    ACC=00 B=00 SP=07 IE=00 DPH=00 DPL=00 PSW=00 PC=0000\r\n\
    R0=00 R1=00 R2=00 R3=00 R4=00 R5=00 R6=00 R7=00 RB=0\r\n> ";

const DUMP_AT_0004: &str = "regs\r\n\
    ACC=2A B=00 SP=07 IE=80 DPH=00 DPL=00 PSW=01 PC=0004\r\n\
    R0=00 R1=12 R2=00 R3=00 R4=00 R5=00 R6=00 R7=0A RB=1\r\n> ";

enum Reply {
    Output(&'static str),
    Exit(i32),
}

struct ScriptedTransport {
    tx: mpsc::Sender<TransportEvent>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    script: VecDeque<(&'static str, Reply)>,
    chunk_size: usize,
}

impl ScriptedTransport {
    fn new(script: Vec<(&'static str, Reply)>, chunk_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let transport = Self {
            tx,
            events: Some(rx),
            script: script.into(),
            chunk_size,
        };
        // The monitor greets before any command is sent.
        transport.emit(BANNER);
        transport
    }

    fn emit(&self, text: &str) {
        for chunk in text.as_bytes().chunks(self.chunk_size) {
            self.tx
                .try_send(TransportEvent::Output(chunk.to_vec()))
                .expect("event channel full");
        }
    }
}

impl Transport for ScriptedTransport {
    fn send_line(&mut self, line: &str) -> probe51_session::Result<()> {
        let (expected, reply) = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command: {line}"));
        assert_eq!(line, expected, "commands must be issued in script order");
        match reply {
            Reply::Output(text) => self.emit(text),
            Reply::Exit(code) => self
                .tx
                .try_send(TransportEvent::Exited(code))
                .expect("event channel full"),
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events.take()
    }

    fn kill(&mut self) {}
}

fn three_line_map() -> AddressLineMap {
    AddressLineMap::new(vec![0x0000, 0x0002, 0x0004])
}

async fn full_flow(chunk_size: usize) {
    let transport = ScriptedTransport::new(
        vec![
            ("regs", Reply::Output(DUMP_AT_RESET)),
            ("clear", Reply::Output("clear\r\nall breakpoints cleared\r\n> ")),
            ("break 0000", Reply::Output("break 0000\r\n#1 at 0000\r\n> ")),
            ("break 0004", Reply::Output("break 0004\r\n#2 at 0004\r\n> ")),
            (
                "blist",
                Reply::Output("blist\r\n#1 at 0000\r\n#2 at 0004\r\n> "),
            ),
            ("go", Reply::Output("go\r\nrunning\r\nstop at 0004\r\n> ")),
            ("regs", Reply::Output(DUMP_AT_0004)),
            (
                "dis 0000 2",
                Reply::Output("dis 0000 2\r\n0000: MOV A,#2Ah\r\n0002: INC A\r\n> "),
            ),
            ("quit", Reply::Exit(0)),
        ],
        chunk_size,
    );

    let mut session = Session::start(transport).await.expect("handshake");
    assert_eq!(session.state(), SessionState::Ready);

    session.load_map(three_line_map());
    let armed = session.set_breakpoints(&[0, 2]).await.expect("breakpoints");
    assert_eq!(armed, vec![0, 2]);

    let snapshot = session.continue_run().await.expect("continue");
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(snapshot.pc, "0004");
    assert_eq!(snapshot.line, 2);
    assert_eq!(snapshot.acc, "2A");
    assert_eq!(snapshot.bank, "1");

    // Window straddling index 0: two synthetic records, then the program.
    let window = session.disassemble(0x0000, -2, 4).await.expect("disassemble");
    assert_eq!(window.len(), 4);
    assert_eq!(window[0].address, "-2");
    assert_eq!(window[0].line, -1);
    assert_eq!(window[1].address, "-");
    assert_eq!(window[2].address, "0000");
    assert_eq!(window[2].line, 0);
    assert_eq!(window[3].address, "0002");
    assert_eq!(window[3].line, 1);

    session.terminate().await.expect("terminate");
    assert_eq!(session.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_full_flow_with_large_chunks() {
    full_flow(64).await;
}

#[tokio::test]
async fn test_full_flow_one_byte_at_a_time() {
    full_flow(1).await;
}

#[tokio::test]
async fn test_full_flow_with_awkward_chunks() {
    // 7 never aligns with the CRLF boundaries of the canned replies.
    full_flow(7).await;
}

#[tokio::test]
async fn test_banner_lands_in_backlog_before_handshake() {
    // The banner is emitted at spawn time, before the handshake registers
    // its expectations; it must be absorbed and discarded, not misparsed.
    let transport = ScriptedTransport::new(vec![("regs", Reply::Output(DUMP_AT_RESET))], 16);
    let session = Session::start(transport).await.expect("handshake");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_operations_require_the_map() {
    let transport = ScriptedTransport::new(vec![("regs", Reply::Output(DUMP_AT_RESET))], 16);
    let mut session = Session::start(transport).await.expect("handshake");

    assert!(matches!(
        session.set_breakpoints(&[0]).await,
        Err(Error::StaleSession(_))
    ));
    assert!(matches!(
        session.disassemble(0, 0, 4).await,
        Err(Error::StaleSession(_))
    ));
}

#[tokio::test]
async fn test_read_register_value_and_mismatch() {
    let transport = ScriptedTransport::new(
        vec![
            ("regs", Reply::Output(DUMP_AT_RESET)),
            ("get ACC", Reply::Output("get ACC\r\nACC=3f\r\n> ")),
            (
                "get BOGUS",
                Reply::Output("get BOGUS\r\n? unknown register\r\n> "),
            ),
        ],
        16,
    );
    let mut session = Session::start(transport).await.expect("handshake");

    assert_eq!(session.read_register("ACC").await.expect("read"), "3F");

    match session.read_register("BOGUS").await {
        Err(Error::ProtocolMismatch { raw }) => assert!(raw.contains("unknown register")),
        other => panic!("expected protocol mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_evaluate_returns_lines_verbatim_minus_echo() {
    let transport = ScriptedTransport::new(
        vec![
            ("regs", Reply::Output(DUMP_AT_RESET)),
            (
                "peek 20",
                Reply::Output("peek 20\r\n0020: 00 11 22 33\r\n0024: 44 55 66 77\r\n> "),
            ),
        ],
        16,
    );
    let mut session = Session::start(transport).await.expect("handshake");

    let lines = session.evaluate("peek 20").await.expect("evaluate");
    assert_eq!(lines, vec!["0020: 00 11 22 33", "0024: 44 55 66 77"]);
}

#[tokio::test]
async fn test_window_ending_at_zero_issues_no_device_command() {
    // No `dis` entry in the script: issuing one would panic the transport.
    let transport = ScriptedTransport::new(vec![("regs", Reply::Output(DUMP_AT_RESET))], 16);
    let mut session = Session::start(transport).await.expect("handshake");
    session.load_map(three_line_map());

    let window = session.disassemble(0x0000, -4, 4).await.expect("disassemble");
    assert_eq!(window.len(), 4);
    assert!(window.iter().all(|i| i.text == "nop" && i.line == -1));
}

#[tokio::test]
async fn test_abnormal_exit_code_is_surfaced() {
    let transport = ScriptedTransport::new(
        vec![
            ("regs", Reply::Output(DUMP_AT_RESET)),
            ("quit", Reply::Exit(3)),
        ],
        16,
    );
    let mut session = Session::start(transport).await.expect("handshake");

    match session.terminate().await {
        Err(Error::AbnormalExit(code)) => assert_eq!(code, 3),
        other => panic!("expected abnormal exit, got {other:?}"),
    }
}
