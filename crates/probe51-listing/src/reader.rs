//! Listing reader
//!
//! Heuristic extraction of the line→address table from an assembler
//! listing. Each listing line either starts with a 4-digit hex location
//! column (new address) or inherits the previous one. Mapping stops at the
//! `END` directive; lines past it are undefined territory and are not
//! represented.

use std::path::Path;

use tracing::debug;

use crate::map::AddressLineMap;
use crate::{Error, Result};

/// Read and parse a listing file.
pub fn read_listing(path: &Path) -> Result<AddressLineMap> {
    let text = std::fs::read_to_string(path)?;
    let map = parse_listing(&text);
    if map.is_empty() {
        return Err(Error::NoCode(path.display().to_string()));
    }
    debug!(path = %path.display(), lines = map.len(), "listing parsed");
    Ok(map)
}

/// Parse listing text into an address/line map.
pub fn parse_listing(text: &str) -> AddressLineMap {
    let mut addrs = Vec::new();
    let mut current: u16 = 0;
    for line in text.lines() {
        if let Some(addr) = location_column(line) {
            current = addr;
        }
        addrs.push(current);
        if is_end_directive(line) {
            break;
        }
    }
    AddressLineMap::new(addrs)
}

/// A 4-digit hex location column terminated by whitespace (or end of line).
fn location_column(line: &str) -> Option<u16> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 || !bytes[..4].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    if let Some(&next) = bytes.get(4) {
        if next != b' ' && next != b'\t' {
            return None;
        }
    }
    u16::from_str_radix(&line[..4], 16).ok()
}

fn is_end_directive(line: &str) -> bool {
    line.split_whitespace().any(|token| token == "END")
}
