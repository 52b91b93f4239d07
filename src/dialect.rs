use std::fmt;

use crate::constants::{DETECT_ABRT, DETECT_GDB, DETECT_KONQI};
use crate::extract::Extractor;

/// Debugger output dialects this engine understands. A closed set:
/// each variant wires its own ordered extractor registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Gdb,
    Abrt,
    Konqi,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dialect::Gdb => write!(f, "gdb"),
            Dialect::Abrt => write!(f, "abrt"),
            Dialect::Konqi => write!(f, "konqi"),
        }
    }
}

// The full registry. ABRT wraps plain gdb output and DrKonqi traces
// carry the same frame and register lines, so all three dialects
// currently run the same callbacks; a line that carries no pattern
// for a dialect simply contributes no state.
const LINE_EXTRACTORS: &[Extractor] = &[
    Extractor::Architecture,
    Extractor::ExitCode,
    Extractor::DebugBuild,
    Extractor::CorruptStack,
    Extractor::LibcRange,
    Extractor::LibgccRange,
    Extractor::Signal,
    Extractor::CrashClassifier,
    Extractor::Registers,
    Extractor::FaultingAddress,
    Extractor::ModuleMap,
    Extractor::Exploitability,
];

impl Dialect {
    /// Ordered extractor registry for this dialect. Extractors run
    /// once per line, in registration order.
    pub fn extractors(&self) -> &'static [Extractor] {
        match self {
            Dialect::Gdb | Dialect::Abrt | Dialect::Konqi => LINE_EXTRACTORS,
        }
    }

    /// Match one line against this dialect's marker.
    fn matches(&self, line: &str) -> bool {
        match self {
            Dialect::Konqi => DETECT_KONQI.is_match(line),
            Dialect::Abrt => DETECT_ABRT.is_match(line),
            Dialect::Gdb => DETECT_GDB.is_match(line),
        }
    }
}

/// Scan lines for the first dialect marker. Markers are mutually
/// exclusive in practice, but the konqi, abrt, gdb check order keeps
/// the result deterministic. Returns `None` when no line matches any
/// marker before end of input.
pub fn detect_dialect<'a, I>(lines: I) -> Option<Dialect>
where
    I: IntoIterator<Item = &'a str>,
{
    const ORDER: [Dialect; 3] = [Dialect::Konqi, Dialect::Abrt, Dialect::Gdb];
    for line in lines {
        if let Some(dialect) = ORDER.iter().find(|d| d.matches(line)) {
            return Some(*dialect);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_gdb() {
        let doc = "Program received signal SIGSEGV, Segmentation fault.\n\
                   #0  0x08048500 in foo () at bar.c:42";
        assert_eq!(
            detect_dialect(doc.lines().map(str::trim)),
            Some(Dialect::Gdb)
        );
    }

    #[test]
    fn test_detect_abrt() {
        let doc = "Core was generated by `./target input'.\n#0  0x08048500 in foo ()";
        assert_eq!(
            detect_dialect(doc.lines().map(str::trim)),
            Some(Dialect::Abrt)
        );
    }

    #[test]
    fn test_detect_konqi() {
        let doc = "Application: Konqueror (konqueror), signal SIGSEGV\n\
                   -- Backtrace:\n\
                   #6  0x08048500 in foo ()";
        assert_eq!(
            detect_dialect(doc.lines().map(str::trim)),
            Some(Dialect::Konqi)
        );
    }

    #[test]
    fn test_detect_nothing() {
        let doc = "some random text\nwith no markers at all";
        assert_eq!(detect_dialect(doc.lines().map(str::trim)), None);
    }

    #[test]
    fn test_registry_order_is_stable() {
        let regs = Dialect::Gdb.extractors();
        assert_eq!(regs.first(), Some(&Extractor::Architecture));
        assert_eq!(regs.last(), Some(&Extractor::Exploitability));
        assert_eq!(regs.len(), 12);
    }
}
