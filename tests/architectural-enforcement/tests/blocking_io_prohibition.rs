//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions in production code MUST NOT use blocking file
//! or network I/O.
//! **Acceptable**: Blocking I/O in plain functions (configuration and script
//! loading before the conversation starts), test code

use architectural_enforcement::{in_async_fn, production_sources, read_production_lines, violation};

const BLOCKING_PATTERNS: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::thread::sleep", "Blocking sleep"),
    (".read_line(", "Blocking stdin read"),
];

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for path in production_sources() {
        let lines = read_production_lines(&path);
        for (idx, line) in lines.iter().enumerate() {
            for (pattern, what) in BLOCKING_PATTERNS {
                if line.code.contains(pattern) && in_async_fn(&lines, idx) {
                    violations.push(violation(&path, line, what));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ REQUIRED in async functions:");
        eprintln!("  - tokio::fs::read().await, tokio::fs::write().await");
        eprintln!("  - Or load before entering the async path");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}
