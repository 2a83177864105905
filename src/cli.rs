//! CLI: builder source → JSON Schema, JSON samples → builder source, request envelopes.
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde_json::Value;

use crate::convert::{Options, DEFAULT_INDENT, DEFAULT_MAX_DEPTH};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// convert between schema-builder source and JSON Schema, or infer builder source from JSON samples
#[derive(Parser, Debug)]
#[command(name = "schema-bridge", version, about)]
pub struct CommandLineInterface {
    /// deepest nesting accepted in any input (the root counts as 1)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// spaces per nested object level in synthesized source
    #[arg(long, global = true, default_value_t = DEFAULT_INDENT)]
    indent: usize,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// translate builder source into a JSON Schema document
    Schema(SchemaOut),
    /// synthesize builder source from JSON samples
    Infer(InferOut),
    /// process a `{code, mode}` request envelope and print the response
    Request(RequestIn),
}

#[derive(Args, Debug, Clone)]
struct Sources {
    /// One or more inputs. May be literal paths or quoted glob patterns or '-' for stdin
    #[arg(long, short, num_args = 1.., required_unless_present = "code")]
    input: Vec<String>,

    /// inline source text, used instead of (or in addition to) input files
    #[arg(long)]
    code: Option<String>,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    sources: Sources,

    /// inputs hold serialized schema nodes (`{"kind": ...}`) rather than builder source
    #[arg(long, default_value_t = false)]
    node_json: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct InferOut {
    #[command(flatten)]
    sources: Sources,

    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RequestIn {
    /// request envelope file, or '-' for stdin
    #[arg(long, short)]
    input: String,
}

/// One loaded input: where it came from and its text.
#[derive(Debug, Clone)]
struct Source {
    label: String,
    text: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Sources {
    fn load(&self) -> Result<Vec<Source>> {
        let mut out = Vec::new();
        if let Some(code) = self.code.as_ref() {
            out.push(Source { label: "--code".into(), text: code.clone() });
        }
        let mut stdin_used = false;
        for source_path in resolve_file_path_patterns(&self.input)? {
            if source_path == Path::new("-") {
                if stdin_used {
                    bail!("'-' (stdin) given more than once");
                }
                stdin_used = true;
                out.push(Source { label: "<stdin>".into(), text: read_input("-")? });
                continue;
            }
            let label = source_path.to_string_lossy().to_string();
            let text = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {label}"))?;
            out.push(Source { label, text });
        }
        tracing::debug!(count = out.len(), "loaded inputs");
        Ok(out)
    }
}

impl InferOut {
    /// Split every loaded input into the sample documents it contains.
    fn samples(&self, sources: Vec<Source>) -> Result<Vec<(String, Value)>> {
        let mut docs = Vec::new();
        for source in sources {
            if self.ndjson {
                for (i, line) in source.text.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let label = format!("{}:{}", source.label, i + 1);
                    let value = crate::convert::parse_json(line).with_context(|| format!("in {label}"))?;
                    docs.push((label, value));
                }
            } else {
                let value = crate::convert::parse_json(&source.text)
                    .with_context(|| format!("in {}", source.label))?;
                docs.push((source.label, value));
            }
        }

        if let Some(pointer) = self.json_pointer.as_ref() {
            docs = docs
                .into_iter()
                .map(|(label, value)| -> Result<(String, Value)> {
                    let selected = value
                        .pointer(pointer)
                        .cloned()
                        .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {label}"))?;
                    Ok((label, selected))
                })
                .collect::<Result<_>>()?;
        }

        if let Some(jq_expr) = self.jq_expr.as_ref() {
            let mut filtered = Vec::new();
            for (label, value) in docs {
                let outputs = crate::jq_exec::run_jaq(jq_expr, &value)
                    .with_context(|| format!("failed to apply jq expression to {label}"))?;
                let many = outputs.len() > 1;
                for (i, value) in outputs.into_iter().enumerate() {
                    let label = if many { format!("{label}#{}", i + 1) } else { label.clone() };
                    filtered.push((label, value));
                }
            }
            docs = filtered;
        }
        Ok(docs)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    fn options(&self) -> Options {
        Options { max_depth: self.max_depth, indent: self.indent }
    }

    pub fn run(&self) -> Result<ExitCode> {
        let opts = self.options();
        match &self.cmd {
            Command::Schema(target) => {
                let sources = target.sources.load()?;
                let results = sources
                    .into_par_iter()
                    .map(|source| -> Result<(String, String)> {
                        let schema = if target.node_json {
                            crate::convert::parse_json(&source.text)
                                .and_then(|value| crate::lower::translate_value(&value, &opts))
                        } else {
                            crate::convert::builder_to_schema(&source.text, &opts)
                        };
                        let schema = schema.with_context(|| format!("failed to convert {}", source.label))?;
                        let text = serde_json::to_string_pretty(&schema)?;
                        Ok((source.label, text))
                    })
                    .collect::<Result<Vec<_>>>()?;
                write_results(&results, target.out.as_deref())?;
            }
            Command::Infer(target) => {
                let samples = target.samples(target.sources.load()?)?;
                let results = samples
                    .into_par_iter()
                    .map(|(label, sample)| -> Result<(String, String)> {
                        let code = crate::inference::synthesize(&sample, &opts)
                            .with_context(|| format!("failed to infer a schema for {label}"))?;
                        Ok((label, code))
                    })
                    .collect::<Result<Vec<_>>>()?;
                write_results(&results, target.out.as_deref())?;
            }
            Command::Request(target) => {
                let body = read_input(&target.input)?;
                let response = crate::convert::handle_raw(&body, &opts);
                println!("{}", serde_json::to_string_pretty(&response)?);
                if !response.is_success() {
                    tracing::warn!(status = response.status, "request failed");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// A single result prints bare; several are each preceded by a header naming their source.
fn render_results(results: &[(String, String)]) -> String {
    match results {
        [(_, text)] => text.clone(),
        _ => results
            .iter()
            .map(|(label, text)| format!("// {label}\n{text}"))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn write_results(results: &[(String, String)], out: Option<&Path>) -> Result<()> {
    let rendered = render_results(results);
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, format!("{rendered}\n"))
                .with_context(|| format!("failed to write {}", out.display()))?;
            tracing::info!(path = %out.display(), count = results.len(), "wrote output");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched = glob::glob(pattern)
                .with_context(|| format!("invalid glob pattern: {pattern}"))?
                .collect::<Result<Vec<_>, _>>()?;
            if matched.is_empty() {
                bail!("glob pattern matched no files: {pattern}");
            }
            out.append(&mut matched);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_results_print_bare() {
        let one = vec![("a.ts".to_string(), "z.string()".to_string())];
        assert_eq!(render_results(&one), "z.string()");
        let two = vec![
            ("a.json".to_string(), "z.null()".to_string()),
            ("b.json".to_string(), "z.boolean()".to_string()),
        ];
        assert_eq!(render_results(&two), "// a.json\nz.null()\n\n// b.json\nz.boolean()");
    }

    #[test]
    fn literal_paths_pass_through_and_empty_globs_fail() {
        let paths = resolve_file_path_patterns(["-", "some/file.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("-"), PathBuf::from("some/file.json")]);
        assert!(resolve_file_path_patterns(["/definitely/not/here/*.json"]).is_err());
    }

    #[test]
    fn global_flags_feed_options() {
        let cli = CommandLineInterface::try_parse_from([
            "schema-bridge", "--max-depth", "7", "infer", "--code", "{}", "--indent", "4",
        ])
        .unwrap();
        assert_eq!(cli.options(), Options { max_depth: 7, indent: 4 });
    }

    #[test]
    fn ndjson_lines_become_separate_samples() {
        let cli = CommandLineInterface::try_parse_from([
            "schema-bridge", "infer", "--ndjson", "--json-pointer", "/v", "--code", "{\"v\":1}\n\n{\"v\":[2]}",
        ])
        .unwrap();
        let Command::Infer(target) = &cli.cmd else { panic!("infer") };
        let samples = target.samples(target.sources.load().unwrap()).unwrap();
        assert_eq!(samples, vec![
            ("--code:1".to_string(), serde_json::json!(1)),
            ("--code:3".to_string(), serde_json::json!([2])),
        ]);
    }
}
