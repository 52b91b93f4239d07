use std::collections::HashMap;

use crate::constants::{parse_hex_address, BT_ADDR, REGISTERS_32};

/// One address range from the debugger memory map.
#[derive(Clone, Debug)]
pub struct ModuleRange {
    pub start: u64,
    pub end: u64,
    pub object_file: String,
}

/// Mutable parse aggregate owned by one engine instance for the
/// lifetime of one document.
pub struct ParseState {
    /// Assembled backtrace, innermost frame first.
    pub backtrace: Vec<String>,
    /// Register name -> decoded value.
    pub registers: HashMap<String, String>,
    /// Register name -> raw hex value.
    pub registers_hex: HashMap<String, String>,
    /// Registers not yet found. Shrinks monotonically; disjoint from
    /// `registers` keys at all times.
    pub registers_sought: Vec<&'static str>,
    /// Ranges built from memory-map lines.
    pub module_map: Vec<ModuleRange>,
    /// [start, end) of the C runtime, if seen in the memory map.
    pub libc_range: Option<(u64, u64)>,
    /// [start, end) of the compiler support runtime.
    pub libgcc_range: Option<(u64, u64)>,
    pub is_corrupt_stack: bool,
    pub is_crash: bool,
    pub is_assert_fail: bool,
    pub is_debug_build: bool,
    pub is_64bit: bool,
    pub used_pc: bool,
    pub debugger_missed_stack_corruption: bool,
    pub total_stack_corruption: bool,
    pub pc_in_function: bool,
    /// Register name holding the program counter for the detected
    /// architecture.
    pub pc_name: &'static str,
    pub exit_code: Option<String>,
    pub signal: Option<String>,
    pub faulting_address: Option<String>,
    pub exploitability: Option<String>,
}

impl Default for ParseState {
    fn default() -> Self {
        ParseState {
            backtrace: Vec::new(),
            registers: HashMap::new(),
            registers_hex: HashMap::new(),
            registers_sought: REGISTERS_32.to_vec(),
            module_map: Vec::new(),
            libc_range: None,
            libgcc_range: None,
            is_corrupt_stack: false,
            is_crash: true,
            is_assert_fail: false,
            is_debug_build: false,
            is_64bit: false,
            used_pc: false,
            debugger_missed_stack_corruption: false,
            total_stack_corruption: false,
            pc_in_function: false,
            pc_name: "eip",
            exit_code: None,
            signal: None,
            faulting_address: None,
            exploitability: None,
        }
    }
}

impl ParseState {
    pub fn new() -> Self {
        ParseState::default()
    }

    /// Check whether `address` falls strictly inside any recorded
    /// module range. With no module map there is nothing to disprove
    /// the mapping, so assume it is mapped.
    pub fn is_mapped(&self, address: u64) -> bool {
        if self.module_map.is_empty() {
            return true;
        }
        self.module_map
            .iter()
            .any(|module| module.start < address && address < module.end)
    }

    /// Extract the leading hex address from a frame, if the frame
    /// text carries one.
    pub fn frame_address(frame: &str) -> Option<u64> {
        BT_ADDR
            .captures(frame)
            .and_then(|cap| parse_hex_address(cap.get(1).unwrap().as_str()))
    }

    /// Raw hex value of the program counter register, if it was found.
    pub fn pc_value(&self) -> Option<&String> {
        self.registers_hex.get(self.pc_name)
    }
}
