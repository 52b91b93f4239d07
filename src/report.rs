use std::fs;
use std::path::Path;

use log::debug;

use crate::constants::{parse_hex_address, BT_ADDR, BT_AT, BT_FUNCTION, FUNCTION_BLACKLIST};
use crate::dialect::{detect_dialect, Dialect};
use crate::error::{Error, Result};
use crate::stacktrace;
use crate::state::ParseState;

/// Upper bound for a single document read. Debugger output is small;
/// anything beyond this is garbage or a mistake.
pub const MAX_DOCUMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Default number of hashable tokens folded into a signature.
pub const DEFAULT_SIGNATURE_DEPTH: usize = 5;

#[derive(Clone, Debug)]
/// Engine construction parameters.
pub struct Config {
    /// Drop frames whose address is outside every mapped module.
    pub exclude_unmapped_frames: bool,
    /// Append the faulting address to the signature input so crashes
    /// at distinct addresses stay distinct.
    pub keep_unique_faulting_address: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            exclude_unmapped_frames: true,
            keep_unique_faulting_address: false,
        }
    }
}

/// One parsed crash document. Owns its parse state exclusively;
/// nothing is shared across documents.
pub struct CrashReport {
    dialect: Dialect,
    config: Config,
    state: ParseState,
    hashable: Vec<String>,
}

impl CrashReport {
    /// Read and parse one document from disk. The read is bounded;
    /// non-UTF-8 bytes are replaced rather than rejected.
    pub fn from_file(path: &Path, config: &Config) -> Result<CrashReport> {
        debug!("Reading {}", path.display());
        let metadata = fs::metadata(path)?;
        if metadata.len() > MAX_DOCUMENT_SIZE {
            return Err(Error::TooLarge(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);

        let Some(dialect) = detect_dialect(text.lines().map(str::trim)) else {
            return Err(Error::UnrecognizedFormat(path.to_path_buf()));
        };
        Ok(CrashReport::parse(&text, dialect, config.clone()))
    }

    /// Parse one document. Malformed content never fails: unmatched
    /// patterns simply contribute no state.
    pub fn parse(text: &str, dialect: Dialect, config: Config) -> CrashReport {
        let lines: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
        let mut state = ParseState::new();
        let extractors = dialect.extractors();

        // Single pass: assemble frames, then run every extractor
        // that still has work to do, in registration order.
        for idx in 0..lines.len() {
            stacktrace::assemble_frame(&lines, idx, &mut state);
            for extractor in extractors {
                if !extractor.done(&state) {
                    extractor.apply(&lines[idx], &mut state);
                }
            }
        }

        stacktrace::normalize(&mut state, config.exclude_unmapped_frames);
        let hashable = build_hashable(&mut state);
        debug!("Hashable backtrace: {hashable:?}");

        CrashReport {
            dialect,
            config,
            state,
            hashable,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The normalized backtrace, innermost frame first.
    pub fn backtrace(&self) -> &[String] {
        &self.state.backtrace
    }

    /// The backtrace with unresolved (`??`) frames removed.
    pub fn backtrace_without_questionmarks(&self) -> Vec<&String> {
        self.state
            .backtrace
            .iter()
            .filter(|bt| !bt.contains("??"))
            .collect()
    }

    /// Canonical token list the signature is derived from.
    pub fn hashable_backtrace(&self) -> &[String] {
        &self.hashable
    }

    pub fn is_crash(&self) -> bool {
        self.state.is_crash
    }

    pub fn is_assert_fail(&self) -> bool {
        self.state.is_assert_fail
    }

    pub fn total_stack_corruption(&self) -> bool {
        self.state.total_stack_corruption
    }

    pub fn exit_code(&self) -> Option<&str> {
        self.state.exit_code.as_deref()
    }

    pub fn signal(&self) -> Option<&str> {
        self.state.signal.as_deref()
    }

    pub fn exploitability(&self) -> Option<&str> {
        self.state.exploitability.as_deref()
    }

    pub fn is_debug_build(&self) -> bool {
        self.state.is_debug_build
    }

    pub fn pc_in_function(&self) -> bool {
        self.state.pc_in_function
    }

    pub fn debugger_missed_stack_corruption(&self) -> bool {
        self.state.debugger_missed_stack_corruption
    }

    /// Canonical string hashed by `signature`: the first `depth`
    /// tokens joined with single spaces, plus the faulting address
    /// when that mode is on and an address is available.
    pub fn hashable_backtrace_string(&self, depth: usize) -> String {
        let mut canonical = self
            .hashable
            .iter()
            .take(depth)
            .cloned()
            .collect::<Vec<String>>()
            .join(" ")
            .trim()
            .to_string();
        if self.config.keep_unique_faulting_address {
            if let Some(faddr) = &self.state.faulting_address {
                canonical.push(' ');
                canonical.push_str(faddr);
            } else {
                debug!("No faulting address to fold into the hash");
            }
        }
        canonical
    }

    /// Crash signature over the first `depth` hashable tokens, or
    /// `None` when there is nothing to hash. Byte-for-byte repeatable
    /// for identical canonical strings.
    pub fn signature(&self, depth: usize) -> Option<String> {
        let canonical = self.hashable_backtrace_string(depth);
        if canonical.is_empty() {
            return None;
        }
        let digest = blake3::hash(canonical.as_bytes());
        Some(digest.to_hex()[..32].to_string())
    }
}

/// Convert the normalized backtrace into canonical tokens, innermost
/// frame first. Frames inside the C/compiler runtimes, blacklisted
/// functions and libc-internal source paths contribute nothing.
/// Falls back to coarser signals when no frame survives.
fn build_hashable(state: &mut ParseState) -> Vec<String> {
    let mut hashable: Vec<String> = Vec::new();
    let backtrace = std::mem::take(&mut state.backtrace);

    for bt in &backtrace {
        let mut token: Option<String> = None;
        let mut frame_address: Option<u64> = None;

        if let Some(cap) = BT_ADDR.captures(bt) {
            let addr = cap.get(1).unwrap().as_str();
            frame_address = parse_hex_address(addr);
            token = Some(addr.to_string());
        } else if !state.used_pc {
            // A frame without an address is usually an inlined or
            // topmost entry; substitute the program counter once.
            if let Some(pc_hex) = state.pc_value().cloned() {
                if let Some(addr) = parse_hex_address(&pc_hex) {
                    state.used_pc = true;
                    frame_address = Some(addr);
                    token = Some(pc_hex);
                }
            }
        }

        if let Some(addr) = frame_address {
            if let Some((start, end)) = state.libc_range {
                if start < addr && addr < end {
                    continue;
                }
            }
            if let Some((start, end)) = state.libgcc_range {
                if start < addr && addr < end {
                    continue;
                }
            }
        }

        if let Some(cap) = BT_FUNCTION.captures(bt) {
            if FUNCTION_BLACKLIST.contains(&cap.get(1).unwrap().as_str()) {
                continue;
            }
        }

        // With debug symbols the source location is the more stable
        // token, unless it points into libc plumbing.
        if let Some(cap) = BT_AT.captures(bt) {
            let location = cap.get(1).unwrap().as_str();
            if location.contains("/sysdeps/") {
                debug!("Found sysdeps, skipping: {bt}");
                continue;
            }
            token = Some(location.to_string());
        }

        if let Some(token) = token {
            if !token.is_empty() {
                hashable.push(token);
            }
        }
    }

    if hashable.is_empty() {
        if state.total_stack_corruption {
            hashable.push("total_stack_corruption".to_string());
        } else if let Some(code) = &state.exit_code {
            hashable.push(format!("exit_code:{code}"));
        } else if let Some(first) = backtrace.first() {
            // Deliberately low-confidence last resort: reuse the raw
            // first frame even though it was otherwise discarded.
            if !first.is_empty() {
                hashable.push(first.clone());
            }
        }
    }

    if hashable.is_empty() {
        // Even the first backtrace line was empty, so there is
        // nothing crash-like to fingerprint.
        state.is_crash = false;
    }

    state.backtrace = backtrace;
    hashable
}
