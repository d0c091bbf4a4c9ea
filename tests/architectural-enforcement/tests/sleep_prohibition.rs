//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Waiting is done on
//! channels, `Notify`, or `tokio::time::interval` ticks.
//! **Exceptions**: Test code, interval-driven polling loops

use architectural_enforcement::{
    is_interval_pattern, production_sources, read_production_lines, violation,
};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for path in production_sources() {
        let lines = read_production_lines(&path);
        for (idx, line) in lines.iter().enumerate() {
            if !(line.code.contains("::sleep(") || line.code.contains(".sleep(")) {
                continue;
            }
            if is_interval_pattern(&lines, idx) {
                continue;
            }
            violations.push(violation(&path, line, "Sleep call"));
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE waiting:");
        eprintln!("  - tokio::sync::Notify / mpsc channels");
        eprintln!("  - Periodic polling using tokio::time::interval()");
        eprintln!("  - Test code (#[cfg(test)] modules and tests/)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
