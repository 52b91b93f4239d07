use log::debug;

use crate::constants::*;
use crate::state::{ModuleRange, ParseState};

/// One line-extraction callback. Extractors are independent: each
/// inspects one line and conditionally mutates the shared parse
/// state. Completion is tracked through the `done` predicate rather
/// than by removing entries from the registry while iterating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extractor {
    Architecture,
    ExitCode,
    DebugBuild,
    CorruptStack,
    LibcRange,
    LibgccRange,
    Signal,
    CrashClassifier,
    Registers,
    FaultingAddress,
    ModuleMap,
    Exploitability,
}

impl Extractor {
    /// True once this extractor has nothing left to do for the
    /// current document. Checked before every invocation.
    pub fn done(&self, state: &ParseState) -> bool {
        match self {
            Extractor::Architecture => state.is_64bit,
            Extractor::ExitCode => state.exit_code.is_some(),
            Extractor::DebugBuild => state.is_debug_build,
            Extractor::CorruptStack => state.is_corrupt_stack,
            Extractor::LibcRange => state.libc_range.is_some(),
            Extractor::LibgccRange => state.libgcc_range.is_some(),
            Extractor::Signal => state.signal.is_some(),
            Extractor::CrashClassifier => !state.is_crash,
            Extractor::Registers => state.registers_sought.is_empty(),
            Extractor::FaultingAddress => state.faulting_address.is_some(),
            Extractor::ModuleMap => false,
            // Guarded by faulting-address presence, not by its own
            // field. This mirrors the reference behavior; see the
            // exploitability tests before changing it.
            Extractor::Exploitability => state.faulting_address.is_some(),
        }
    }

    /// Run this extractor over one trimmed line.
    pub fn apply(&self, line: &str, state: &mut ParseState) {
        match self {
            Extractor::Architecture => look_for_64bit(line, state),
            Extractor::ExitCode => look_for_exit_code(line, state),
            Extractor::DebugBuild => look_for_debug_build(line, state),
            Extractor::CorruptStack => look_for_corrupt_stack(line, state),
            Extractor::LibcRange => look_for_libc_range(line, state),
            Extractor::LibgccRange => look_for_libgcc_range(line, state),
            Extractor::Signal => look_for_signal(line, state),
            Extractor::CrashClassifier => look_for_crash(line, state),
            Extractor::Registers => look_for_registers(line, state),
            Extractor::FaultingAddress => look_for_faulting_address(line, state),
            Extractor::ModuleMap => build_module_map(line, state),
            Extractor::Exploitability => look_for_exploitability(line, state),
        }
    }
}

/// Detect a 64-bit target from the width of a leading hex address.
/// Switches the program counter name and the sought register set.
fn look_for_64bit(line: &str, state: &mut ParseState) {
    if let Some(cap) = BT_ADDR.captures(line) {
        let addr = cap.get(1).unwrap().as_str();
        // "0x" plus more than 8 hex digits.
        if addr.len() > 10 {
            debug!("Target process is 64-bit");
            state.is_64bit = true;
            state.pc_name = "rip";
            // The 32-bit set shares the segment registers; anything
            // already found stays found and is never re-sought.
            state.registers_sought = REGISTERS_64
                .iter()
                .copied()
                .filter(|r| !state.registers.contains_key(*r))
                .collect();
        }
    }
}

fn look_for_exit_code(line: &str, state: &mut ParseState) {
    if let Some(cap) = EXIT_CODE.captures(line) {
        let code = cap.get(1).unwrap().as_str().to_string();
        debug!("Exit code: {code}");
        state.exit_code = Some(code);
    }
}

fn look_for_debug_build(line: &str, state: &mut ParseState) {
    if line.contains(" at ") {
        state.is_debug_build = true;
    }
}

fn look_for_corrupt_stack(line: &str, state: &mut ParseState) {
    if line.contains("corrupt stack") {
        debug!("Debugger reported corrupt stack");
        state.is_corrupt_stack = true;
    }
}

fn look_for_libc_range(line: &str, state: &mut ParseState) {
    if let Some(cap) = LIBC_LOCATION.captures(line) {
        let start = parse_hex_address(cap.get(1).unwrap().as_str());
        let end = parse_hex_address(cap.get(2).unwrap().as_str());
        if let (Some(start), Some(end)) = (start, end) {
            state.libc_range = Some((start, end));
        }
    }
}

fn look_for_libgcc_range(line: &str, state: &mut ParseState) {
    if let Some(cap) = LIBGCC_LOCATION.captures(line) {
        let start = parse_hex_address(cap.get(1).unwrap().as_str());
        let end = parse_hex_address(cap.get(2).unwrap().as_str());
        if let (Some(start), Some(end)) = (start, end) {
            state.libgcc_range = Some((start, end));
        }
    }
}

/// Record the delivered signal. An abort makes the debugger-reported
/// faulting address untrustworthy, so it is pinned to zero.
fn look_for_signal(line: &str, state: &mut ParseState) {
    if let Some(cap) = SIGNAL.captures(line) {
        let signal = cap.get(1).unwrap().as_str().to_string();
        debug!("Signal: {signal}");
        if signal == "SIGABRT" {
            state.faulting_address = Some("0".to_string());
        }
        state.signal = Some(signal);
    }
}

/// Non-crash terminations must not be fingerprinted as unique bugs.
fn look_for_crash(line: &str, state: &mut ParseState) {
    if line.contains("SIGKILL")
        || line.contains("SIGHUP")
        || line.contains("SIGXFSZ")
        || line.contains("Program exited normally")
    {
        state.is_crash = false;
    }
}

fn look_for_registers(line: &str, state: &mut ParseState) {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return;
    };
    let Some(pos) = state.registers_sought.iter().position(|r| *r == name) else {
        return;
    };

    let rest = parts.collect::<Vec<&str>>().join(" ");
    let Some(cap) = REGISTER.captures(&rest) else {
        debug!("Register not matched: {rest}");
        return;
    };

    state
        .registers_hex
        .insert(name.to_string(), cap.get(1).unwrap().as_str().to_string());
    state
        .registers
        .insert(name.to_string(), cap.get(2).unwrap().as_str().to_string());
    // Once found, a register is never re-sought.
    state.registers_sought.remove(pos);
}

fn look_for_faulting_address(line: &str, state: &mut ParseState) {
    if let Some(cap) = FAULT_ADDR.captures(line) {
        let addr = cap.get(1).unwrap().as_str().to_string();
        debug!("Faulting address: {addr}");
        state.faulting_address = Some(addr);
    }
}

/// Every matching memory-map line contributes one range.
fn build_module_map(line: &str, state: &mut ParseState) {
    if let Some(cap) = MAPPED_FRAME.captures(line) {
        let start = parse_hex_address(cap.get(1).unwrap().as_str());
        let end = parse_hex_address(cap.get(2).unwrap().as_str());
        if let (Some(start), Some(end)) = (start, end) {
            state.module_map.push(ModuleRange {
                start,
                end,
                object_file: cap.get(4).unwrap().as_str().to_string(),
            });
        }
    }
}

fn look_for_exploitability(line: &str, state: &mut ParseState) {
    if let Some(cap) = EXPLOITABILITY.captures(line) {
        let class = cap.get(1).unwrap().as_str().to_string();
        debug!("Exploitability: {class}");
        state.exploitability = Some(class);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(extractors: &[Extractor], lines: &[&str]) -> ParseState {
        let mut state = ParseState::new();
        for line in lines {
            for e in extractors {
                if !e.done(&state) {
                    e.apply(line, &mut state);
                }
            }
        }
        state
    }

    #[test]
    fn test_64bit_detection() {
        let state = run(
            &[Extractor::Architecture],
            &["0x00007ffff7a9e000 0x00007ffff7c31000 0x193000 0x0 /lib/libc-2.31.so"],
        );
        assert!(state.is_64bit);
        assert_eq!(state.pc_name, "rip");
        assert_eq!(state.registers_sought, REGISTERS_64.to_vec());
    }

    #[test]
    fn test_64bit_switch_does_not_reseek_found_registers() {
        let state = run(
            &[Extractor::Registers, Extractor::Architecture],
            &[
                "cs             0x23\t35",
                "0x00007ffff7a9e000 0x00007ffff7c31000 0x193000 0x0 /lib/libc-2.31.so",
            ],
        );
        assert!(state.is_64bit);
        assert!(state.registers.contains_key("cs"));
        assert!(!state.registers_sought.contains(&"cs"));
        assert!(state.registers_sought.contains(&"rip"));
    }

    #[test]
    fn test_32bit_addresses_keep_32bit_mode() {
        let state = run(
            &[Extractor::Architecture],
            &["0x00750000 0x008b9000 0x169000 0x0 /lib/libc-2.12.so"],
        );
        assert!(!state.is_64bit);
        assert_eq!(state.pc_name, "eip");
        assert_eq!(state.registers_sought, REGISTERS_32.to_vec());
    }

    #[test]
    fn test_exit_code_first_match_wins() {
        let state = run(
            &[Extractor::ExitCode],
            &[
                "Program exited with code 3",
                "Program exited with code 7",
            ],
        );
        assert_eq!(state.exit_code.as_deref(), Some("3"));
    }

    #[test]
    fn test_signal_abort_pins_faulting_address() {
        let state = run(
            &[Extractor::Signal, Extractor::FaultingAddress],
            &[
                "Program received signal SIGABRT, Aborted.",
                "si_addr 0xdeadbeef",
            ],
        );
        assert_eq!(state.signal.as_deref(), Some("SIGABRT"));
        // si_addr after an abort is not trustworthy and does not
        // override the pinned zero.
        assert_eq!(state.faulting_address.as_deref(), Some("0"));
    }

    #[test]
    fn test_faulting_address_one_shot() {
        let state = run(
            &[Extractor::FaultingAddress],
            &["si_addr 0x41414141", "si_addr 0x42424242"],
        );
        assert_eq!(state.faulting_address.as_deref(), Some("0x41414141"));
    }

    #[test]
    fn test_non_crash_signals() {
        for marker in ["SIGKILL", "SIGHUP", "SIGXFSZ", "Program exited normally"] {
            let state = run(&[Extractor::CrashClassifier], &[marker]);
            assert!(!state.is_crash, "{marker} should not count as a crash");
        }
        let state = run(&[Extractor::CrashClassifier], &["SIGSEGV"]);
        assert!(state.is_crash);
    }

    #[test]
    fn test_register_extraction() {
        let state = run(
            &[Extractor::Registers],
            &[
                "eip            0x8048500\t0x8048500 <foo+16>",
                "eax            0xffffffff\t-1",
                "eip            0x11111111\t0x11111111",
            ],
        );
        assert_eq!(state.registers_hex.get("eip").unwrap(), "0x8048500");
        assert_eq!(state.registers.get("eip").unwrap(), "0x8048500 <foo+16>");
        assert_eq!(state.registers.get("eax").unwrap(), "-1");
        assert!(!state.registers_sought.contains(&"eip"));
        assert!(!state.registers_sought.contains(&"eax"));
        assert!(state.registers_sought.contains(&"esp"));
        // Found registers are never re-sought or overwritten.
        assert_eq!(state.registers_hex.get("eip").unwrap(), "0x8048500");
        assert!(state
            .registers_sought
            .iter()
            .all(|r| !state.registers.contains_key(*r)));
    }

    #[test]
    fn test_module_map_accumulates() {
        let state = run(
            &[Extractor::ModuleMap],
            &[
                "0x08048000 0x08049000 0x1000 0x0 /usr/bin/target",
                "0x00750000 0x008b9000 0x169000 0x0 /lib/libc-2.12.so",
                "No such line",
            ],
        );
        assert_eq!(state.module_map.len(), 2);
        assert_eq!(state.module_map[1].object_file, "/lib/libc-2.12.so");
    }

    #[test]
    fn test_exploitability_guarded_by_faulting_address() {
        // Without a faulting address the classification is recorded.
        let state = run(
            &[Extractor::Exploitability],
            &["Exploitability Classification: EXPLOITABLE"],
        );
        assert_eq!(state.exploitability.as_deref(), Some("EXPLOITABLE"));

        // Once a faulting address was seen, later classification
        // lines are ignored. Intentional reference coupling.
        let state = run(
            &[Extractor::FaultingAddress, Extractor::Exploitability],
            &[
                "si_addr 0x41414141",
                "Exploitability Classification: EXPLOITABLE",
            ],
        );
        assert!(state.exploitability.is_none());
    }

    #[test]
    fn test_corrupt_stack_and_debug_build() {
        let state = run(
            &[Extractor::CorruptStack, Extractor::DebugBuild],
            &[
                "#2  0x0000dead in ?? ()",
                "Backtrace stopped: previous frame inner to this frame (corrupt stack?)",
                "#0  0x08048500 in foo () at bar.c:42",
            ],
        );
        assert!(state.is_corrupt_stack);
        assert!(state.is_debug_build);
    }

    #[test]
    fn test_libc_and_libgcc_ranges() {
        let state = run(
            &[Extractor::LibcRange, Extractor::LibgccRange],
            &[
                "0x00750000 0x008b9000 0x169000 0x0 /lib/libc-2.12.so",
                "0x00a00000 0x00a21000 0x21000 0x0 /lib/libgcc_s-4.4.7.so.1",
                "0x00900000 0x00990000 0x90000 0x0 /lib/libc-9.99.so",
            ],
        );
        assert_eq!(state.libc_range, Some((0x00750000, 0x008b9000)));
        assert_eq!(state.libgcc_range, Some((0x00a00000, 0x00a21000)));
    }
}
