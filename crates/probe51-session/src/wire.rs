//! Monitor wire format
//!
//! The fixed textual patterns and command spellings of the wrapped monitor
//! shell. Everything the engine recognizes structurally lives here.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CMD_REGS: &str = "regs";
pub const CMD_CONTINUE: &str = "go";
pub const CMD_STEP: &str = "step";
pub const CMD_NEXT: &str = "next";
pub const CMD_CLEAR: &str = "clear";
pub const CMD_LIST_BREAKS: &str = "blist";
pub const CMD_QUIT: &str = "quit";

/// Interactive prompt marker; the monitor emits it with no trailing newline.
pub static PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^>\s*$").unwrap());

/// First register-dump line: accumulator through program counter.
pub static REG_MAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*ACC=([0-9A-Fa-f]{2})\s+B=([0-9A-Fa-f]{2})\s+SP=([0-9A-Fa-f]{2})\s+IE=([0-9A-Fa-f]{2})\s+DPH=([0-9A-Fa-f]{2})\s+DPL=([0-9A-Fa-f]{2})\s+PSW=([0-9A-Fa-f]{2})\s+PC=([0-9A-Fa-f]{4})\s*$",
    )
    .unwrap()
});

/// Second register-dump line: general-purpose registers and bank selector.
pub static REG_GPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*R0=([0-9A-Fa-f]{2})\s+R1=([0-9A-Fa-f]{2})\s+R2=([0-9A-Fa-f]{2})\s+R3=([0-9A-Fa-f]{2})\s+R4=([0-9A-Fa-f]{2})\s+R5=([0-9A-Fa-f]{2})\s+R6=([0-9A-Fa-f]{2})\s+R7=([0-9A-Fa-f]{2})\s+RB=([0-3])\s*$",
    )
    .unwrap()
});

/// One breakpoint-list line, capturing the address token.
pub static BREAK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#\d+ at ([0-9A-Fa-f]{4})\b").unwrap());

/// One disassembly line: `ADDR: TEXT`.
pub static DIS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9A-Fa-f]{4}):\s+(\S.*?)\s*$").unwrap());

/// A `NAME=HEX` value reply, or the monitor's `?`-prefixed error line.
/// The hex group is absent on the error branch.
pub static VALUE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[A-Za-z][A-Za-z0-9]*=([0-9A-Fa-f]{1,4})|\?.*)\s*$").unwrap()
});

/// Matches any line; used to collect free-form responses verbatim.
pub static ANY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*)$").unwrap());

pub fn break_cmd(addr: u16) -> String {
    format!("break {}", format_addr(addr))
}

pub fn dis_cmd(addr: u16, count: usize) -> String {
    format!("dis {} {}", format_addr(addr), count)
}

pub fn get_cmd(name: &str) -> String {
    format!("get {name}")
}

pub fn set_cmd(name: &str, value: u16) -> String {
    format!("set {name} {value:02X}")
}

pub fn format_addr(addr: u16) -> String {
    format!("{addr:04X}")
}

pub fn parse_addr(text: &str) -> Option<u16> {
    u16::from_str_radix(text.trim(), 16).ok()
}
