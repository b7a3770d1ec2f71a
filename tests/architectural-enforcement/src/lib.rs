//! Architectural Enforcement Integration Tests
//!
//! Source-scanning helpers shared by the enforcement tests under `tests/`.
//! Each test walks the production sources of `dispatch-core` and reports
//! every line that breaks an engine-wide rule:
//! - No sleeping outside the retry backoff
//! - No `unwrap()`/`expect()` in production code
//! - No process-global engine state

use std::fs;
use std::path::{Path, PathBuf};

/// A rule violation at a specific source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: PathBuf,
    pub line_number: usize,
    pub line: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line_number, self.line.trim())
    }
}

/// Root of the `dispatch-core` production sources
pub fn core_src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("dispatch")
        .join("core")
        .join("src")
}

/// Every `.rs` file under `dir`, sorted
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Whether a file only exists to support tests
pub fn is_test_support(path: &Path) -> bool {
    path.file_name().and_then(|s| s.to_str()) == Some("test_utils.rs")
}

/// Production lines of a file: everything before its inline test module,
/// with line comments stripped
///
/// Returns `(line_number, code)` pairs.
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    let lines: Vec<&str> = content.lines().collect();
    let cutoff = lines
        .iter()
        .enumerate()
        .position(|(idx, line)| {
            line.trim() == "#[cfg(test)]"
                && lines.get(idx + 1).is_some_and(|next| {
                    let next = next.trim();
                    next.starts_with("mod ") && next.ends_with('{')
                })
        })
        .unwrap_or(lines.len());

    lines[..cutoff]
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line).to_string()))
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// Scan every production file under `dir`, reporting lines where `matches`
/// holds; files for which `skip_file` holds are ignored
pub fn scan<F, S>(dir: &Path, skip_file: S, matches: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
    S: Fn(&Path) -> bool,
{
    let mut violations = Vec::new();
    for path in rust_files(dir) {
        if is_test_support(&path) || skip_file(&path) {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for (line_number, code) in production_lines(&content) {
            if matches(&code) {
                violations.push(Violation {
                    path: path.clone(),
                    line_number,
                    line: code,
                });
            }
        }
    }
    violations
}

/// Panic with a readable report if any violations were found
pub fn assert_clean(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!("\nFound {} violation(s) of: {rule}", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n// note\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        let lines = production_lines(content);
        assert_eq!(lines, vec![(1, "fn a() {}".to_string())]);
    }

    #[test]
    fn test_cfg_test_submodule_declaration_is_not_a_cutoff() {
        let content = "#[cfg(test)]\npub mod test_utils;\n\npub use a::*;\n";
        let lines = production_lines(content);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], (4, "pub use a::*;".to_string()));
    }

    #[test]
    fn test_trailing_comments_stripped() {
        let lines = production_lines("let x = y.unwrap_or(0); // .unwrap() here is fine\n");
        assert_eq!(lines[0].1, "let x = y.unwrap_or(0); ");
    }

    #[test]
    fn test_core_sources_found() {
        let files = rust_files(&core_src_dir());
        assert!(files.iter().any(|p| p.ends_with("lib.rs")));
        assert!(files.iter().any(|p| p.ends_with("executor.rs")));
    }
}
