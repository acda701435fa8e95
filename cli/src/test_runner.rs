use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use assembler::{BlockSet, UniqueCounter};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Block to assemble (case-insensitive). Defaults to "main".
    #[serde(default = "default_block")]
    pub block: String,

    /// Expected script, compared line by line after trimming.
    #[serde(default)]
    pub expect_script: Option<String>,

    /// Expected assembly error: the error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// If true, the document is expected to fail parsing.
    #[serde(default)]
    pub expect_parse_error: bool,
}

fn default_block() -> String {
    "main".to_string()
}

/// Split a `.test.md` file into its TOML front matter and markdown body.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    let after_open = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig =
        toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.trim_end_matches(".test.md"))
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let (description, outcome) = match std::fs::read_to_string(path) {
        Ok(content) => match parse_test_file(&content) {
            Ok((config, source)) => (config.description.clone(), check(&config, source)),
            Err(e) => (None, Err(format!("frontmatter error: {}", e))),
        },
        Err(e) => (None, Err(format!("cannot read file: {}", e))),
    };

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: match outcome {
            Ok(()) => TestOutcome::Pass,
            Err(reason) => TestOutcome::Fail(reason),
        },
    }
}

/// Parse, resolve and assemble `source`, then compare against the expectations.
fn check(config: &TestConfig, source: &str) -> Result<(), String> {
    let parsed = mdx::parser::Parser::new(source.to_string(), 0).parse();

    if config.expect_parse_error {
        return match parsed {
            Err(_) => Ok(()),
            Ok(_) => Err("expected parse error, but parsing succeeded".into()),
        };
    }

    let document = parsed.map_err(|errs| {
        let msgs: Vec<String> = errs.iter().map(|e| e.message.clone()).collect();
        format!("unexpected parse error: {}", msgs.join("; "))
    })?;

    // A fresh counter per test keeps generated names deterministic.
    let counter = UniqueCounter::new();
    let result = BlockSet::from_document(&document).and_then(|blocks| {
        let name = blocks
            .get_entry(&config.block)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| config.block.clone());
        assembler::collect_required_code(&blocks, &name, &counter)
    });

    match (&config.expect_error, &config.expect_script, result) {
        (Some(expected), _, Err(err)) => {
            let err_str = err.to_string();
            if err_str.contains(expected.as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, err_str
                ))
            }
        }
        (Some(expected), _, Ok(_)) => Err(format!(
            "expected error containing \"{}\", but assembly succeeded",
            expected
        )),
        (None, _, Err(err)) => Err(format!("unexpected error: {}", err)),
        (None, Some(expected), Ok(lines)) => compare_scripts(expected, &lines),
        (None, None, Ok(_)) => Ok(()),
    }
}

fn compare_scripts(expected: &str, actual: &[String]) -> Result<(), String> {
    let expected: Vec<&str> = expected.trim().lines().map(str::trim_end).collect();
    let actual_text = actual.join("\n");
    let actual: Vec<&str> = actual_text.trim().lines().map(str::trim_end).collect();

    if expected == actual {
        return Ok(());
    }

    let line = expected
        .iter()
        .zip(&actual)
        .position(|(e, a)| e != a)
        .unwrap_or(expected.len().min(actual.len()));
    Err(format!(
        "script mismatch at line {}\n  expected: {}\n  actual:   {}",
        line + 1,
        expected.get(line).copied().unwrap_or("(end of script)"),
        actual.get(line).copied().unwrap_or("(end of script)"),
    ))
}

/// Discover `.test.md` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".test.md"))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(cat), files.len());
    }
}

/// ANSI styling that collapses to plain text with `--no-color`.
struct Style {
    no_color: bool,
}

impl Style {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn pass(&self) -> String {
        self.paint("32", "PASS")
    }

    fn fail(&self) -> String {
        self.paint("31", "FAIL")
    }

    fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }
}

/// Select the categories to run. Unknown requests produce a warning.
fn filter_categories<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }

    let mut filtered = BTreeMap::new();
    for req in requested {
        let req = req.trim_matches('/');
        let prefix = format!("{}/", req);
        let before = filtered.len();
        for (cat, files) in all {
            if cat == req || cat.starts_with(&prefix) {
                filtered.insert(cat.as_str(), files);
            }
        }
        if filtered.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                available.join(", ")
            );
        }
    }
    filtered
}

/// Run all `.test.md` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let style = Style { no_color };

    let groups: Vec<(Option<String>, Vec<PathBuf>)> = if path.is_file() {
        vec![(None, vec![path.to_path_buf()])]
    } else {
        let all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no .test.md files found in {}", path.display());
            return 1;
        }
        let selected = filter_categories(&all, categories);
        if selected.is_empty() {
            eprintln!("no matching categories found");
            return 1;
        }
        selected
            .into_iter()
            .map(|(cat, files)| (Some(category_label(cat).to_string()), files.clone()))
            .collect()
    };

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (header, files) in groups {
        if let Some(header) = header {
            eprintln!();
            eprintln!("{}", style.bold(&header));
        }
        for file in files {
            debug!(path = %file.display(), "running test");
            let result = run_single_test(&file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", style.pass(), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", style.fail(), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    let failed = failures.len();
    eprintln!();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", style.paint("32", "ok"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            style.paint("31", "FAILED"),
            passed,
            failed,
            passed + failed
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test(dir: &Path, relative: &str, content: &str) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    const PASSING: &str = "---\ndescription = \"two blocks\"\nexpect_script = \"\"\"\nA=1\necho $A\n\"\"\"\n---\n```bash :setup\nA=1\n```\n\n```bash :main +setup\necho $A\n```\n";

    #[test]
    fn frontmatter_split() {
        let (config, source) = parse_test_file(PASSING).unwrap();
        assert_eq!(config.description.as_deref(), Some("two blocks"));
        assert_eq!(config.block, "main");
        assert!(source.starts_with("```bash :setup"));
    }

    #[test]
    fn frontmatter_errors() {
        assert!(parse_test_file("no frontmatter").is_err());
        assert!(parse_test_file("---\nblock = \"x\"\n").is_err());
        assert!(parse_test_file("---\nunknown = 1\n---\n").is_err());
    }

    #[test]
    fn passing_and_failing_files() {
        let dir = tempfile::tempdir().unwrap();
        let pass = write_test(dir.path(), "ok.test.md", PASSING);
        let fail = write_test(
            dir.path(),
            "bad.test.md",
            "---\nexpect_script = \"echo nope\"\n---\n```bash :main\necho yes\n```\n",
        );

        assert!(matches!(run_single_test(&pass).outcome, TestOutcome::Pass));
        match run_single_test(&fail).outcome {
            TestOutcome::Fail(reason) => {
                assert!(reason.contains("script mismatch at line 1"), "{}", reason)
            }
            TestOutcome::Pass => panic!("expected failure"),
        }
    }

    #[test]
    fn expected_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cycle = write_test(
            dir.path(),
            "cycle.test.md",
            "---\nexpect_error = \"dependency cycle\"\n---\n```bash :main +other\n```\n\n```bash :other +main\n```\n",
        );
        let parse = write_test(
            dir.path(),
            "parse.test.md",
            "---\nexpect_parse_error = true\n---\n```bash :a\n```\n\n```bash :a\n```\n",
        );
        assert!(matches!(run_single_test(&cycle).outcome, TestOutcome::Pass));
        assert!(matches!(run_single_test(&parse).outcome, TestOutcome::Pass));
    }

    #[test]
    fn categories_follow_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        write_test(dir.path(), "top.test.md", PASSING);
        write_test(dir.path(), "calls/one.test.md", PASSING);
        write_test(dir.path(), "calls/nested/two.test.md", PASSING);
        write_test(dir.path(), "calls/notes.md", "not a test");

        let all = discover_categorized(dir.path());
        let keys: Vec<&str> = all.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["", "calls", "calls/nested"]);

        let selected = filter_categories(&all, &["calls".to_string()]);
        assert_eq!(selected.len(), 2);
        assert_eq!(run_tests(dir.path(), true, &[]), 0);
    }

    #[test]
    fn script_mismatch_reports_missing_lines() {
        let err = compare_scripts("a\nb", &["a".to_string()]).unwrap_err();
        assert!(err.contains("line 2"), "{}", err);
        assert!(err.contains("(end of script)"), "{}", err);
    }

    #[test]
    fn bundled_fixtures_pass() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        assert_eq!(run_tests(&fixtures, true, &[]), 0);
    }
}
