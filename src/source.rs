//! Source-context rendering around a line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::errors::Result;

/// Renders `context` lines around `line` (1-based) of `path`, the target
/// line prefixed with `"> "` and the others with `"  "`.
///
/// An unreadable file renders as nothing; a stale DWARF path is not worth
/// aborting a breakpoint stop over.
pub fn source_context(path: &Path, line: u64, context: u64) -> Result<String> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("could not open source file {}: {e}", path.display());
            return Ok(String::new());
        }
    };

    let first = line.saturating_sub(context).max(1);
    let last = line + context;

    let mut out = String::new();
    for (idx, text) in BufReader::new(file).lines().enumerate() {
        let current = idx as u64 + 1;
        if current < first {
            continue;
        }
        if current > last {
            break;
        }
        let prefix = if current == line { "> " } else { "  " };
        out.push_str(prefix);
        out.push_str(&text?);
        out.push('\n');
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    fn fixture(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("minidbg-source-test-{name}"));
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_context_window_and_prefixes() {
        let path = fixture("window", "one\ntwo\nthree\nfour\nfive\nsix\n");
        let out = source_context(&path, 3, 1).unwrap();
        assert_eq!(out, "  two\n> three\n  four\n");
    }

    #[test]
    fn test_context_clamped_at_file_start() {
        let path = fixture("start", "one\ntwo\nthree\n");
        let out = source_context(&path, 1, 2).unwrap();
        assert_eq!(out, "> one\n  two\n  three\n");
    }

    #[test]
    fn test_context_clamped_at_file_end() {
        let path = fixture("end", "one\ntwo\n");
        let out = source_context(&path, 2, 2).unwrap();
        assert_eq!(out, "  one\n> two\n");
    }

    #[test]
    fn test_missing_file_renders_nothing() {
        let out = source_context(Path::new("/nonexistent/minidbg.c"), 3, 2).unwrap();
        assert!(out.is_empty());
    }
}
