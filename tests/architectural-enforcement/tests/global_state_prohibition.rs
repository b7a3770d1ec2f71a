//! Integration Test: Global State Prohibition
//!
//! **Policy**: Engine state (breakers, metrics, configuration) lives in the
//! `RoutingEngine` instance. Production code MUST NOT keep it in statics,
//! so independent engines never share breakers or counters.

use architectural_enforcement::{assert_clean, core_src_dir, scan};

fn declares_global(code: &str) -> bool {
    let trimmed = code.trim_start();
    trimmed.starts_with("static ")
        || trimmed.starts_with("pub static ")
        || trimmed.starts_with("pub(crate) static ")
        || code.contains("lazy_static!")
        || code.contains("thread_local!")
        || code.contains("OnceLock")
        || code.contains("LazyLock")
        || code.contains("once_cell")
}

#[test]
fn test_no_global_state_in_production_code() {
    let violations = scan(&core_src_dir(), |_| false, declares_global);
    assert_clean("process-global state in production code", &violations);
}
