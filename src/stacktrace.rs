use log::debug;

use crate::constants::{BT_LINE, BT_LINE_AT, BT_LINE_BASIC, BT_LINE_FROM};
use crate::state::ParseState;

/// Assemble one backtrace frame if `lines[idx]` is a frame-start
/// line. The debugger wraps long frames, so subsequent lines up to
/// the next frame start are scanned and continuation lines (whole
/// word `from` or `at`) are appended to the frame text. Prompt
/// echoes (`Quit anyway`) and variable dumps (` = `) are skipped.
pub fn assemble_frame(lines: &[String], idx: usize, state: &mut ParseState) {
    let Some(cap) = BT_LINE.captures(&lines[idx]) else {
        return;
    };
    let mut frame = cap.get(1).unwrap().as_str().to_string();

    for next in &lines[idx + 1..] {
        if BT_LINE_BASIC.is_match(next) {
            break;
        }
        if (BT_LINE_FROM.is_match(next) || BT_LINE_AT.is_match(next))
            && !next.contains("Quit anyway")
            && !next.contains(" = ")
        {
            frame.push(' ');
            frame.push_str(next);
        }
    }

    debug!("Appending to backtrace: {frame}");
    state.backtrace.push(frame);
}

/// Post-process the assembled backtrace: corrupt-stack trimming,
/// unmapped-frame removal, assert-fail detection and the
/// pc-in-function check. Runs once, only if the backtrace is
/// non-empty.
pub fn normalize(state: &mut ParseState, exclude_unmapped_frames: bool) {
    if state.backtrace.is_empty() {
        debug!("Backtrace is empty");
        return;
    }

    if state.is_corrupt_stack {
        // The debugger's own corruption report makes the outermost
        // frame untrustworthy.
        let removed = state.backtrace.pop();
        debug!("Debugger detected corrupt stack, removing frame: {removed:?}");
    } else {
        look_for_debugger_missed_stack_corruption(state);
    }

    if exclude_unmapped_frames {
        remove_unmapped_frames(state);
    }
    look_for_assert_fail(state);
    check_pc_in_function(state);
}

/// The debugger sometimes unwinds right past a smashed stack. If the
/// outermost frame resolves to unmapped memory, drop it and repeat; a
/// frame with no address at all is commonly the true entry point and
/// stops the trimming.
fn look_for_debugger_missed_stack_corruption(state: &mut ParseState) {
    let start_len = state.backtrace.len();
    while let Some(outermost) = state.backtrace.last() {
        let Some(address) = ParseState::frame_address(outermost) else {
            break;
        };
        if state.is_mapped(address) {
            break;
        }
        state.debugger_missed_stack_corruption = true;
        let removed = state.backtrace.pop();
        debug!("Debugger missed stack corruption, removing frame: {removed:?}");
    }

    if start_len != 0 && state.backtrace.is_empty() {
        debug!("Total stack corruption, no backtrace lines left");
        state.total_stack_corruption = true;
    }
}

/// Delete every frame whose address is present but unmapped,
/// scanning the whole remaining backtrace.
fn remove_unmapped_frames(state: &mut ParseState) {
    let module_map = std::mem::take(&mut state.module_map);
    state.backtrace.retain(|frame| {
        let Some(address) = ParseState::frame_address(frame) else {
            return true;
        };
        let mapped = module_map.is_empty()
            || module_map
                .iter()
                .any(|m| m.start < address && address < m.end);
        if !mapped {
            debug!("Removing unmapped frame: {frame}");
        }
        mapped
    });
    state.module_map = module_map;

    if state.backtrace.is_empty() {
        // No frame in the backtrace is in a mapped module.
        state.total_stack_corruption = true;
    }
}

fn look_for_assert_fail(state: &mut ParseState) {
    if state.backtrace.iter().any(|bt| bt.contains("__assert_fail")) {
        debug!("Assert fail");
        state.is_assert_fail = true;
    }
}

/// The crash site is inside a function the debugger can name unless
/// the innermost frame shows an unresolved program counter.
fn check_pc_in_function(state: &mut ParseState) {
    if let Some(innermost) = state.backtrace.first() {
        if !innermost.contains("in ??") {
            state.pc_in_function = true;
        }
    }
}
