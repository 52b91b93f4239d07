extern crate lazy_static;

use regex::Regex;

/// Register names reported by `info registers` for 32-bit targets.
pub const REGISTERS_32: &[&str] = &[
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "eip", "cs", "ss", "ds", "es", "fs",
    "gs",
];

/// Register names reported by `info registers` for 64-bit targets.
pub const REGISTERS_64: &[&str] = &[
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15", "rip", "cs", "ss", "ds", "es", "fs", "gs",
];

// Functions that commonly show up in crash backtraces yet are side
// effects of how the crash was handled, not where it occurred. They
// are excluded from the hashable backtrace.
pub const FUNCTION_BLACKLIST: &[&str] = &[
    "__kernel_vsyscall",
    "abort",
    "raise",
    "malloc",
    "free",
    "*__GI_abort",
    "*__GI_raise",
    "malloc_printerr",
    "__libc_message",
    "malloc_consolidate",
    "_int_malloc",
    "__libc_calloc",
    "_dl_new_object",
    "_dl_map_object_from_fd",
    "_dl_catch_error",
    "_dl_open",
    "do_dlopen",
    "dlerror_run",
    "*__GI___libc_dlopen_mode",
    "_dl_map_object",
    "dl_open_worker",
    "munmap_chunk",
    "*__GI___backtrace",
    "_dl_addr_inside_object",
    "_int_free",
    "*__GI___libc_free",
    "__malloc_assert",
    "sYSMALLOc",
    "_int_realloc",
    "*__GI___libc_malloc",
    "*__GI___libc_realloc",
    "_int_memalign",
    "*__GI___libc_memalign",
    "__posix_memalign",
    "__libc_malloc",
    "__libc_realloc",
    "g_assertion_message",
    "g_assertion_message_expr",
];

lazy_static::lazy_static! {
    /// Frame-start marker: `#<digits>`.
    pub static ref BT_LINE_BASIC: Regex = Regex::new(r"^#\d").unwrap();
    /// Frame-start line with the frame text captured.
    pub static ref BT_LINE: Regex = Regex::new(r"^#\d+\s+(.*)$").unwrap();
    /// Resolved function name inside a frame.
    pub static ref BT_FUNCTION: Regex = Regex::new(r"^.+in\s+(\S+)\s+\(").unwrap();
    /// Source location suffix: `at file:line`.
    pub static ref BT_AT: Regex = Regex::new(r"\s+at\s+(\S+:\d+)").unwrap();
    /// Leading hex address followed by more text.
    pub static ref BT_ADDR: Regex = Regex::new(r"^(0x[0-9a-fA-F]+)\s+.+$").unwrap();
    /// Whole-word continuation markers for wrapped frame lines.
    pub static ref BT_LINE_FROM: Regex = Regex::new(r"\bfrom\b").unwrap();
    pub static ref BT_LINE_AT: Regex = Regex::new(r"\bat\b").unwrap();
    /// `Program received signal <NAME>,`.
    pub static ref SIGNAL: Regex = Regex::new(r"^Program\sreceived\ssignal\s+([^,]+)").unwrap();
    /// `Program exited with code <N>`.
    pub static ref EXIT_CODE: Regex = Regex::new(r"^Program exited with code (\d+)").unwrap();
    /// `si_addr` value from siginfo output.
    pub static ref FAULT_ADDR: Regex = Regex::new(r"^si_addr.+(0x[0-9a-zA-Z]+)").unwrap();
    /// Register value: `<hex> <decoded>`.
    pub static ref REGISTER: Regex = Regex::new(r"^(0x[0-9a-zA-Z]+)\s+(.+)$").unwrap();
    /// Memory map entry for the C runtime.
    pub static ref LIBC_LOCATION: Regex = Regex::new(
        r"^(0x[0-9a-fA-F]+)\s+(0x[0-9a-fA-F]+)\s+0x[0-9a-fA-F]+\s+0(x0)?\s+.+/libc[-.]"
    )
    .unwrap();
    /// Memory map entry for the compiler support runtime.
    pub static ref LIBGCC_LOCATION: Regex = Regex::new(
        r"^(0x[0-9a-fA-F]+)\s+(0x[0-9a-fA-F]+)\s+0x[0-9a-fA-F]+\s+0(x0)?\s+.+/libgcc(_s)?[-.]"
    )
    .unwrap();
    /// Generic memory map entry: four hex fields plus an object path.
    pub static ref MAPPED_FRAME: Regex = Regex::new(
        r"^(0x[0-9a-fA-F]+)\s+(0x[0-9a-fA-F]+)\s+0x[0-9a-fA-F]+\s+0(x0)?\s+(/.+)"
    )
    .unwrap();
    /// `Exploitability Classification: <class>`.
    pub static ref EXPLOITABILITY: Regex =
        Regex::new(r"^Exploitability Classification: (.+)$").unwrap();
    /// Dialect markers, checked in konqi, abrt, gdb order.
    pub static ref DETECT_KONQI: Regex = Regex::new(r"^-- Backtrace:").unwrap();
    pub static ref DETECT_ABRT: Regex = Regex::new(r"^Core was generated by").unwrap();
    pub static ref DETECT_GDB: Regex = Regex::new(r"^#\d+\s+").unwrap();
}

/// Parse a `0x`-prefixed hex literal into an address.
pub fn parse_hex_address(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}
