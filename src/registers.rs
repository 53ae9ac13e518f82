//! Static register map of the recuperator unit.
//!
//! The device exposes its state across three register spaces. Only the
//! address ranges backing known sensors and controls are swept; everything
//! else on the unit is left alone. Blocks within one space are disjoint by
//! construction.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterSpace {
    Holding,
    Input,
    Coil,
}

impl RegisterSpace {
    pub const ALL: [RegisterSpace; 3] =
        [RegisterSpace::Holding, RegisterSpace::Input, RegisterSpace::Coil];
}

impl fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterSpace::Holding => "holding",
            RegisterSpace::Input => "input",
            RegisterSpace::Coil => "coil",
        };
        f.write_str(name)
    }
}

/// A contiguous run of registers read in a single request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterBlock {
    pub start: u16,
    pub count: u16,
}

impl RegisterBlock {
    pub fn end(&self) -> u16 {
        self.start + self.count - 1
    }

    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end()
    }
}

const fn block(start: u16, count: u16) -> RegisterBlock {
    RegisterBlock { start, count }
}

// Airflow setpoints, mode/season/bypass flags and alarm words.
const HOLDING_BLOCKS: &[RegisterBlock] = &[
    block(256, 2),
    block(4192, 2),
    block(4198, 1),
    block(4208, 3),
    block(4210, 1),
    block(4224, 1),
    block(4320, 1),
    block(4387, 1),
    block(8192, 2),
    block(8208, 1),
    block(8222, 2),
    block(8330, 2),
    block(8444, 1),
];

// Duct and PCB temperature probes (0.1 degC per LSB on the device side).
const INPUT_BLOCKS: &[RegisterBlock] = &[block(16, 4), block(22, 1)];

// Bypass actuator feedback and running confirmation.
const COIL_BLOCKS: &[RegisterBlock] = &[block(9, 1), block(11, 1)];

pub fn blocks(space: RegisterSpace) -> &'static [RegisterBlock] {
    match space {
        RegisterSpace::Holding => HOLDING_BLOCKS,
        RegisterSpace::Input => INPUT_BLOCKS,
        RegisterSpace::Coil => COIL_BLOCKS,
    }
}

static MAPPED_ADDRESSES: Lazy<BTreeSet<(RegisterSpace, u16)>> = Lazy::new(|| {
    RegisterSpace::ALL
        .into_iter()
        .flat_map(|space| {
            blocks(space)
                .iter()
                .flat_map(move |b| b.addresses().map(move |addr| (space, addr)))
        })
        .collect()
});

/// Whether an address belongs to the monitored map for the given space.
pub fn is_mapped(space: RegisterSpace, address: u16) -> bool {
    MAPPED_ADDRESSES.contains(&(space, address))
}

/// One-line rendering of the full map, for startup logging.
pub fn describe() -> String {
    RegisterSpace::ALL
        .iter()
        .map(|&space| {
            let ranges = blocks(space)
                .iter()
                .map(|b| {
                    if b.count == 1 {
                        b.start.to_string()
                    } else {
                        format!("{}..{}", b.start, b.end())
                    }
                })
                .join(", ");
            format!("{space} [{ranges}]")
        })
        .join("; ")
}
