//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in dispatch-core MUST NOT sleep.
//! **Exception**: The retry backoff in `routing/executor.rs`, which races
//! its sleep against cancellation and the caller's deadline.

use std::path::Path;

use architectural_enforcement::{assert_clean, core_src_dir, scan};

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

fn is_backoff_site(path: &Path) -> bool {
    path.ends_with("routing/executor.rs")
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(&core_src_dir(), is_backoff_site, is_sleep_call);
    assert_clean("sleep outside the retry backoff", &violations);
}

#[test]
fn test_backoff_site_exists() {
    // The exemption must not outlive the code it exempts
    let executor = core_src_dir().join("routing").join("executor.rs");
    let content = std::fs::read_to_string(executor).unwrap();
    assert!(content.contains("tokio::time::sleep(delay)"));
}
