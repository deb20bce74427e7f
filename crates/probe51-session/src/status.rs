//! Register snapshot
//!
//! Parses the monitor's two fixed-format register-dump lines into a typed
//! snapshot. Every field round-trips byte-for-byte as a hexadecimal string;
//! the source line is derived by reverse lookup of the program counter.

use probe51_listing::AddressLineMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expect::LineMatch;
use crate::wire;

/// A parsed register dump plus the mapped source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub acc: String,
    pub b: String,
    pub sp: String,
    pub ie: String,
    pub dph: String,
    pub dpl: String,
    pub psw: String,
    pub pc: String,
    /// General-purpose registers R0..R7 of the active bank.
    pub r: [String; 8],
    /// Register bank selector.
    pub bank: String,
    /// 0-based source line for the program counter; `-1` when the address
    /// is outside the mapped program (or no map exists yet).
    pub line: i64,
}

/// Build a snapshot from the two matched dump lines.
///
/// `main` must have matched [`wire::REG_MAIN`] and `gprs`
/// [`wire::REG_GPR`]. The lookup takes the LAST line sharing the pc,
/// because padding repeats an address across source lines.
pub fn snapshot_from_lines(
    main: &LineMatch,
    gprs: &LineMatch,
    map: Option<&AddressLineMap>,
) -> Result<RegisterSnapshot> {
    let field = |m: &LineMatch, n: usize| -> Result<String> {
        Ok(m.require(n)?.to_ascii_uppercase())
    };

    let pc = field(main, 8)?;
    let line = match (map, wire::parse_addr(&pc)) {
        (Some(map), Some(addr)) => map.source_line(i64::from(addr)),
        _ => -1,
    };

    Ok(RegisterSnapshot {
        acc: field(main, 1)?,
        b: field(main, 2)?,
        sp: field(main, 3)?,
        ie: field(main, 4)?,
        dph: field(main, 5)?,
        dpl: field(main, 6)?,
        psw: field(main, 7)?,
        pc,
        r: [
            field(gprs, 1)?,
            field(gprs, 2)?,
            field(gprs, 3)?,
            field(gprs, 4)?,
            field(gprs, 5)?,
            field(gprs, 6)?,
            field(gprs, 7)?,
            field(gprs, 8)?,
        ],
        bank: field(gprs, 9)?,
        line,
    })
}
