//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep production code honest:
//! - No sleep() calls (wait on channels, notifications or intervals instead)
//! - No blocking file or network I/O inside async functions
//!
//! The helpers here locate the production sources and strip comments and
//! test modules so the scans in `tests/` only see shipped code.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directories scanned, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["character/core/src", "character/cli/src"];

/// A line of production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// Line text with any trailing `//` comment removed
    pub code: String,
    /// Untrimmed original line
    pub raw: String,
}

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under the production directories
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files
}

/// Production lines of a source file
///
/// Stops at the first `#[cfg(test)]`; unit test modules sit at the end of
/// each file.
pub fn production_lines(content: &str) -> Vec<CodeLine> {
    let mut lines = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        if raw.trim_start().starts_with("#[cfg(test)]") {
            break;
        }

        let code = raw.split("//").next().unwrap_or(raw).to_string();
        lines.push(CodeLine {
            number: idx + 1,
            code,
            raw: raw.to_string(),
        });
    }

    lines
}

/// Read and split a source file; unreadable files yield no lines
pub fn read_production_lines(path: &Path) -> Vec<CodeLine> {
    match fs::read_to_string(path) {
        Ok(content) => production_lines(&content),
        Err(_) => Vec::new(),
    }
}

/// Signature line of the function enclosing `lines[idx]`, if any
///
/// Scans backwards for the nearest `fn` item.
pub fn enclosing_fn(lines: &[CodeLine], idx: usize) -> Option<&str> {
    lines[..=idx]
        .iter()
        .rev()
        .map(|l| l.code.trim())
        .find(|code| is_fn_item(code))
}

fn is_fn_item(code: &str) -> bool {
    let code = code
        .trim_start_matches("pub(crate) ")
        .trim_start_matches("pub ");
    code.starts_with("fn ") || code.starts_with("async fn ")
}

/// Whether the function enclosing `lines[idx]` is async
pub fn in_async_fn(lines: &[CodeLine], idx: usize) -> bool {
    enclosing_fn(lines, idx).is_some_and(|sig| sig.contains("async fn "))
}

/// Whether `lines[idx]` is driven by a `tokio::time::interval`
///
/// Looks at the preceding 20 lines.
pub fn is_interval_pattern(lines: &[CodeLine], idx: usize) -> bool {
    lines[idx.saturating_sub(20)..idx]
        .iter()
        .any(|l| l.code.contains("interval.tick()") || l.code.contains("time::interval("))
}

/// Format a violation for reporting
pub fn violation(path: &Path, line: &CodeLine, what: &str) -> String {
    let root = workspace_root();
    let shown = path.strip_prefix(&root).unwrap_or(path);
    format!("{}:{} - {what}: {}", shown.display(), line.number, line.raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let lines = production_lines(
            "fn a() {} // trailing\n\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n",
        );
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].code, "fn a() {} ");
        assert_eq!(lines[0].number, 1);
    }

    #[test]
    fn test_async_detection() {
        let lines = production_lines(
            "pub async fn load() {\n    let x = 1;\n}\n\nfn sync() {\n    let y = 2;\n}\n",
        );
        assert!(in_async_fn(&lines, 1));
        assert!(!in_async_fn(&lines, 5));
    }

    #[test]
    fn test_interval_detection() {
        let lines = production_lines(
            "async fn wait() {\n    let mut interval = tokio::time::interval(d);\n    loop {\n        interval.tick().await;\n    }\n}\n",
        );
        assert!(is_interval_pattern(&lines, 3));
        assert!(!is_interval_pattern(&lines, 1));
    }

    #[test]
    fn test_sources_found() {
        let files = production_sources();
        assert!(files.iter().any(|f| f.ends_with("character.rs")));
        assert!(files.iter().any(|f| f.ends_with("main.rs")));
    }
}
