//! CLI: compile → snapshot, validate documents, print mocks, inspect compiled code.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use runtype_jit::path_de::from_slice_with_path;
use runtype_jit::render::{error_path_text, render_fn};
use runtype_jit::{Engine, EngineConfig, RunTypes, TypeGraph, ValidationError, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile reflected type graphs into validators, JSON codecs and mocks
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,

    /// debug logging (RUST_LOG still wins when set)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// build all five functions for a root type and write the snapshot JSON
    Compile(CompileOut),
    /// validate JSON documents against a root type
    Validate(ValidateIn),
    /// print mock values of a root type as JSON text
    Mock(MockOut),
    /// print the compiled functions of a root type
    Inspect(InspectOut),
}

#[derive(Args, Debug, Clone)]
struct TypeSettings {
    /// type graph JSON file
    #[arg(long)]
    types: PathBuf,

    /// root type name inside the graph
    #[arg(long)]
    root: String,

    /// engine config JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns.
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CompileOut {
    #[command(flatten)]
    type_settings: TypeSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ValidateIn {
    #[command(flatten)]
    type_settings: TypeSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// inputs are jsonEncode output; decode before validating
    #[arg(long, default_value_t = false)]
    decode: bool,
}

#[derive(clap::Parser, Debug)]
struct MockOut {
    #[command(flatten)]
    type_settings: TypeSettings,

    #[arg(long, short = 'n', default_value_t = 1)]
    count: usize,

    /// overrides the configured seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Parser, Debug)]
struct InspectOut {
    #[command(flatten)]
    type_settings: TypeSettings,
}

/// One input document, labelled by where it came from.
struct Document {
    source: String,
    value: serde_json::Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl TypeSettings {
    fn engine(&self) -> Result<Engine> {
        let config = match self.config.as_ref() {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        Ok(Engine::new(config))
    }

    fn load(&self, engine: &Engine) -> Result<std::sync::Arc<RunTypes>> {
        let bytes = std::fs::read(&self.types).with_context(|| format!("reading {}", self.types.display()))?;
        let graph: TypeGraph =
            from_slice_with_path(&bytes).with_context(|| format!("parsing type graph {}", self.types.display()))?;
        let rts = engine
            .load_named(&graph, &self.root)
            .with_context(|| format!("lowering `{}` from {}", self.root, self.types.display()))?;
        debug!(root = %self.root, nodes = rts.len(), "loaded type graph");
        Ok(rts)
    }
}

impl InputSettings {
    fn load_documents(&self) -> Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .map_err(|error| anyhow!("failed to resolve input file paths: {error}"))?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;
            let values = if self.ndjson {
                source
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| !line.trim().is_empty())
                    .map(|(i, line)| {
                        serde_json::from_str(line)
                            .with_context(|| format!("failed to parse {source_path_str}:{}", i + 1))
                    })
                    .collect::<Result<Vec<serde_json::Value>>>()?
            } else {
                vec![serde_json::from_str(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?]
            };
            for (i, value) in values.into_iter().enumerate() {
                let label = if self.ndjson { format!("{source_path_str}:{}", i + 1) } else { source_path_str.clone() };
                for value in self.preprocess(value, &label)? {
                    out.push(Document { source: label.clone(), value });
                }
            }
        }
        Ok(out)
    }

    fn preprocess(&self, value: serde_json::Value, label: &str) -> Result<Vec<serde_json::Value>> {
        let value = match self.json_pointer.as_ref() {
            None => value,
            Some(pointer) => value
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| anyhow!("JSON pointer {pointer} selects nothing in {label}"))?,
        };
        let Some(jq_expr) = self.jq_expr.as_ref() else {
            return Ok(vec![value]);
        };
        crate::jq_exec::run_jaq(jq_expr, &value)
            .with_context(|| format!("failed to apply jq expression to source file ({label})"))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn init_tracing(&self) {
        let default = if self.verbose { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Compile(target) => {
                // 1) load and build
                let engine = target.type_settings.engine()?;
                let rts = target.type_settings.load(&engine)?;
                engine.compile_all(&target.type_settings.root, &rts)?;

                // 2) persist
                let snapshot = serde_json::to_string_pretty(&engine.snapshot())?;
                write_or_print(target.out.as_deref(), &snapshot)?;
                info!(functions = engine.registry().len(), "compiled");
                Ok(())
            }
            Command::Validate(target) => {
                let engine = target.type_settings.engine()?;
                let rts = target.type_settings.load(&engine)?;
                let fns = engine.compile_all(&target.type_settings.root, &rts)?;
                let documents = target.input_settings.load_documents()?;

                // Every document against the same registry, in parallel.
                let results: Vec<(&Document, Result<Vec<ValidationError>>)> = documents
                    .par_iter()
                    .map(|doc| {
                        let checked = if target.decode {
                            fns.json_decode
                                .call(doc.value.clone())
                                .map(|v| fns.type_errors.call(&v))
                                .map_err(anyhow::Error::from)
                        } else {
                            Ok(fns.type_errors.call(&Value::from_json(doc.value.clone())))
                        };
                        (doc, checked)
                    })
                    .collect();

                let mut failed = 0usize;
                for (doc, checked) in &results {
                    match checked {
                        Ok(errors) if errors.is_empty() => println!("{} {}", "✔".green(), doc.source),
                        Ok(errors) => {
                            failed += 1;
                            println!("{} {}", "✘".red(), doc.source.bold());
                            for e in errors {
                                println!("    {} expected {}", error_path_text(&e.path).yellow(), e.expected);
                            }
                        }
                        Err(error) => {
                            failed += 1;
                            println!("{} {}: {error:#}", "✘".red(), doc.source.bold());
                        }
                    }
                }
                if failed > 0 {
                    bail!("{failed} of {} documents failed validation", results.len());
                }
                Ok(())
            }
            Command::Mock(target) => {
                let mut engine_config = match target.type_settings.config.as_ref() {
                    Some(path) => EngineConfig::load(path)?,
                    None => EngineConfig::default(),
                };
                if target.seed.is_some() {
                    engine_config.mock.seed = target.seed;
                }
                let engine = Engine::new(engine_config);
                let rts = target.type_settings.load(&engine)?;
                let mock = engine.build_mock(&rts)?;
                let stringify = engine.build_json_stringify(&rts)?;
                for value in mock.sample(target.count)? {
                    println!("{}", stringify.call(&value)?);
                }
                Ok(())
            }
            Command::Inspect(target) => {
                let engine = target.type_settings.engine()?;
                let rts = target.type_settings.load(&engine)?;
                let fns = engine.compile_all(&target.type_settings.root, &rts)?;
                println!("{} {}", "root".bold(), fns.jit_id());
                for f in engine.registry().functions() {
                    println!();
                    print!("{}", render_fn(&f));
                }
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_or_print(out: Option<&Path>, text: &str) -> Result<()> {
    let Some(out) = out else {
        println!("{text}");
        return Ok(());
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, text).with_context(|| format!("writing {}", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                match entry {
                    Ok(p) => {
                        matched_any = true;
                        out.push(p);
                    }
                    Err(e) => return Err(Box::new(e)),
                }
            }
            if !matched_any {
                return Err(format!("glob pattern matched no files: {pattern}").into());
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
