//! Disassembly windower
//!
//! Computes instruction windows over the discontinuous instruction stream.
//! Indices below zero never reach the device; they become synthetic no-op
//! records so a client can scroll above the program's first instruction.

use probe51_listing::AddressLineMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expect::LineMatch;
use crate::wire;

/// One disassembled (or synthesized) instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: String,
    pub text: String,
    /// 0-based source line; `-1` for synthetic padding and unmapped code.
    pub line: i64,
}

/// The single real device command covering a window's non-negative part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceWindow {
    pub addr: u16,
    pub count: usize,
}

/// A planned window: synthetic records first, then at most one device
/// command. Both halves are produced in increasing index order, so the
/// final result needs no reordering.
#[derive(Debug)]
pub struct WindowPlan {
    pub synthetic: Vec<Instruction>,
    pub device: Option<DeviceWindow>,
}

/// Plan the window `[base + offset, base + offset + count)` around `addr`.
///
/// The window is half-open: a window ending exactly at index 0 contains no
/// real instruction and issues no device command.
pub fn plan_window(map: &AddressLineMap, addr: i64, offset: i64, count: usize) -> WindowPlan {
    let base = map.instruction_index(addr);
    let start = base + offset;
    let end = start + count as i64;

    let mut synthetic = Vec::new();
    let mut index = start;
    while index < end.min(0) {
        synthetic.push(Instruction {
            address: if index == -1 {
                // Sentinel for "immediately before address zero".
                "-".to_string()
            } else {
                index.to_string()
            },
            text: "nop".to_string(),
            line: -1,
        });
        index += 1;
    }

    let device = if end > 0 {
        let real_start = start.max(0);
        let addr = map.addr_for_index(real_start).clamp(0, i64::from(u16::MAX)) as u16;
        Some(DeviceWindow {
            addr,
            count: (end - real_start) as usize,
        })
    } else {
        None
    };

    WindowPlan { synthetic, device }
}

/// Shape one matched `ADDR: TEXT` device line into an instruction record.
pub fn device_record(map: &AddressLineMap, m: &LineMatch) -> Result<Instruction> {
    let addr = m.require(1)?;
    let text = m.require(2)?;
    let line = wire::parse_addr(addr).map_or(-1, |a| map.source_line(i64::from(a)));
    Ok(Instruction {
        address: addr.to_ascii_uppercase(),
        text: text.to_string(),
        line,
    })
}
