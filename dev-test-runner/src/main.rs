//! Runs every `fixtures/*.json` case through the dispatcher and diffs the response.
//!
//! `cargo run -p dev-test-runner [NAME_REGEX]` limits the run to matching fixture names.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use once_cell::sync::Lazy;
use regex::Regex;
use schema_bridge::convert::{handle, ConvertRequest, Mode, Options, ResponseBody};
use serde::Deserialize;
use serde_json::Value;

static FIXTURE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]+\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    mode: Mode,
    code: String,
    #[serde(default)]
    max_depth: Option<usize>,
    expect: Expect,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Expect {
    Schema(Value),
    Code(String),
    /// error kind name
    Error(String),
}

fn load(path: &Path) -> Result<Fixture, String> {
    let src = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let de = &mut serde_json::Deserializer::from_str(&src);
    serde_path_to_error::deserialize(de).map_err(|e| format!("at {} → {}", e.path(), e.inner()))
}

fn check(fixture: &Fixture) -> Result<(), String> {
    let opts = Options {
        max_depth: fixture.max_depth.unwrap_or(Options::default().max_depth),
        ..Options::default()
    };
    let request = ConvertRequest { code: fixture.code.clone(), mode: fixture.mode };
    let response = handle(&request, &opts);
    match (&fixture.expect, &response.body) {
        (Expect::Schema(want), ResponseBody::Schema { schema }) if want == schema => Ok(()),
        (Expect::Code(want), ResponseBody::Code { code }) if want == code => Ok(()),
        (Expect::Error(want), ResponseBody::Error { kind, .. }) if want == kind && response.status == 400 => Ok(()),
        (want, _) => Err(format!(
            "expected {want:?}\n     got {}",
            serde_json::to_string_pretty(&response).unwrap_or_default()
        )),
    }
}

fn fixture_paths(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    paths.retain(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| FIXTURE_FILE.is_match(n))
    });
    paths.sort();
    paths
}

fn main() -> ExitCode {
    let filter = std::env::args().nth(1).map(|pattern| {
        Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid name filter {pattern:?}: {e}"))
    });
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");

    let (mut passed, mut failed) = (0, 0);
    for path in fixture_paths(&dir) {
        let fixture = match load(&path) {
            Ok(x) => x,
            Err(error) => {
                eprintln!("❌ {}: unreadable fixture: {error}", path.display());
                failed += 1;
                continue;
            }
        };
        if filter.as_ref().is_some_and(|re| !re.is_match(&fixture.name)) {
            continue;
        }
        match check(&fixture) {
            Ok(()) => {
                eprintln!("✅ {}", fixture.name);
                passed += 1;
            }
            Err(error) => {
                eprintln!("❌ {}\n     {error}", fixture.name);
                failed += 1;
            }
        }
    }
    eprintln!("—— {passed} passed, {failed} failed ——");
    if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
