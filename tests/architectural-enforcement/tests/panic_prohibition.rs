//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code in dispatch-core MUST propagate errors with
//! `Result` instead of calling `unwrap()` or `expect()`.
//! **Exceptions**: Inline test modules and `routing/test_utils.rs`.

use architectural_enforcement::{assert_clean, core_src_dir, scan};

fn panics_on_error(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations = scan(&core_src_dir(), |_| false, panics_on_error);
    assert_clean("unwrap()/expect() in production code", &violations);
}
