//! Operation descriptors.
//!
//! An [`OperationDescriptor`] is the payload of one command or report: an
//! opcode (`item`), the correlation number (`num`), five optional numeric
//! parameter slots, five optional string slots and an optional result code.
//! It serializes sparsely, so absent slots never appear on the wire:
//!
//! ```text
//! {"item": 1103, "num": 1004, "prm1": 2, "prm2": 90, "prm3": 3000}
//! ```
//!
//! The correlation number is fixed at construction and is the only join key
//! between an outbound command and the reports it produces.

use crate::sequence::SequenceAllocator;
use serde::{Deserialize, Serialize};

/// Number of numeric and of string parameter slots.
pub const PARAM_SLOTS: usize = 5;

/// Sparse parameter map returned by an ALL-mode completion.
pub type ResultFields = OperationDescriptor;

/// One command/response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Operation selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<i64>,
    #[serde(default)]
    num: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prm1: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prm2: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prm3: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prm4: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prm5: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prmstr1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prmstr2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prmstr3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prmstr4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prmstr5: Option<String>,
    /// Result code of a completion (`100` success, `101` failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<i64>,
}

impl OperationDescriptor {
    /// Create a descriptor for `opcode`, drawing a fresh correlation number.
    pub fn new(opcode: i64, sequence: &SequenceAllocator) -> Self {
        Self::with_correlation(opcode, sequence.next())
    }

    /// Create a descriptor with an explicit correlation number.
    pub fn with_correlation(opcode: i64, num: u64) -> Self {
        Self {
            item: Some(opcode),
            num,
            prm1: None,
            prm2: None,
            prm3: None,
            prm4: None,
            prm5: None,
            prmstr1: None,
            prmstr2: None,
            prmstr3: None,
            prmstr4: None,
            prmstr5: None,
            result: None,
        }
    }

    /// Correlation number.
    pub fn correlation(&self) -> u64 {
        self.num
    }

    /// Opcode, or `0` when the descriptor carries none (bare reports).
    pub fn opcode(&self) -> i64 {
        self.item.unwrap_or_default()
    }

    /// Set numeric slot `slot` (1-based). Out-of-range slots are ignored.
    pub fn param(mut self, slot: usize, value: i64) -> Self {
        if let Some(field) = self.param_slot_mut(slot) {
            *field = Some(value);
        }
        self
    }

    /// Set string slot `slot` (1-based). Out-of-range slots are ignored.
    pub fn text(mut self, slot: usize, value: impl Into<String>) -> Self {
        if let Some(field) = self.text_slot_mut(slot) {
            *field = Some(value.into());
        }
        self
    }

    /// Set the result code.
    pub fn with_result(mut self, result: i64) -> Self {
        self.result = Some(result);
        self
    }

    /// Read numeric slot `slot` (1-based).
    pub fn get_param(&self, slot: usize) -> Option<i64> {
        match slot {
            1 => self.prm1,
            2 => self.prm2,
            3 => self.prm3,
            4 => self.prm4,
            5 => self.prm5,
            _ => None,
        }
    }

    /// Read string slot `slot` (1-based).
    pub fn get_text(&self, slot: usize) -> Option<&str> {
        match slot {
            1 => self.prmstr1.as_deref(),
            2 => self.prmstr2.as_deref(),
            3 => self.prmstr3.as_deref(),
            4 => self.prmstr4.as_deref(),
            5 => self.prmstr5.as_deref(),
            _ => None,
        }
    }

    /// All present string slots, in slot order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        (1..=PARAM_SLOTS).filter_map(move |slot| self.get_text(slot))
    }

    fn param_slot_mut(&mut self, slot: usize) -> Option<&mut Option<i64>> {
        match slot {
            1 => Some(&mut self.prm1),
            2 => Some(&mut self.prm2),
            3 => Some(&mut self.prm3),
            4 => Some(&mut self.prm4),
            5 => Some(&mut self.prm5),
            _ => None,
        }
    }

    fn text_slot_mut(&mut self, slot: usize) -> Option<&mut Option<String>> {
        match slot {
            1 => Some(&mut self.prmstr1),
            2 => Some(&mut self.prmstr2),
            3 => Some(&mut self.prmstr3),
            4 => Some(&mut self.prmstr4),
            5 => Some(&mut self.prmstr5),
            _ => None,
        }
    }
}
