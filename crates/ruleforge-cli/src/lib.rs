//! Command-line entry point over the rule graph engine: loads a declarative
//! package tree, resolves target patterns against it, and drives a build.
//! Split from `main.rs` so the resolution and reporting logic is directly
//! testable without spawning the compiled binary.

pub mod cell;
pub mod content_hash;
pub mod manifest;
pub mod pattern;
pub mod rules;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use ruleforge_action::{ActionGraphBuilder, RuleCreationContext, RuleDescription, RuleKeyEngine};
use ruleforge_cache::{ArtifactCache, DedupingArtifactCache, InMemoryArtifactCache};
use ruleforge_core::config::{BuildConfig, ConfigOverride, OutputLayout};
use ruleforge_core::error::BuildError;
use ruleforge_core::event::EventBus;
use ruleforge_core::target::{CellName, TargetLabel};
use ruleforge_exec::{LocalFilesystem, TokioProcessExecutor};
use ruleforge_scheduler::BuildScheduler;
use serde_json::json;

use crate::cell::SingleCellPaths;
use crate::content_hash::FilesystemContentHasher;
use crate::rules::genrule::GenRuleDescription;
use crate::rules::writefile::WriteFileDescription;

/// Exit codes match the command-line contract: 0 success, 1 build failure,
/// 2 parse/graph error, 4 command-line error.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_BUILD_FAILURE: i32 = 1;
pub const EXIT_PARSE_ERROR: i32 = 2;
pub const EXIT_COMMAND_LINE_ERROR: i32 = 4;

#[derive(Parser, Debug, Default)]
#[command(name = "ruleforge", about = "Builds target patterns against a declared package tree", version)]
pub struct Cli {
    /// Target patterns: `//path:name`, `//path:`, `//path/...`, or an alias.
    pub targets: Vec<String>,

    /// Root directory containing the cell's BUILD.json packages.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub show_output: bool,

    #[arg(long)]
    pub show_full_output: bool,

    #[arg(long)]
    pub show_rulekey: bool,

    #[arg(long)]
    pub show_json_output: bool,

    /// Run the build without printing a per-target summary afterward.
    #[arg(long)]
    pub just_build: bool,

    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long)]
    pub target_platforms: Option<String>,

    #[arg(long)]
    pub exclude_incompatible_targets: bool,

    #[arg(long)]
    pub rulekeys_log_path: Option<PathBuf>,

    /// `-c section.key=value`, may be repeated.
    #[arg(short = 'c', value_name = "section.key=value")]
    pub config: Vec<String>,
}

pub async fn run(cli: Cli) -> i32 {
    run_with_event_bus(cli, Arc::new(EventBus::default())).await
}

/// Same as [`run`], but against a caller-supplied event bus, so a test can
/// subscribe before the build starts and observe exactly which events a run
/// posted.
pub async fn run_with_event_bus(cli: Cli, event_bus: Arc<EventBus>) -> i32 {
    let cache = Arc::new(DedupingArtifactCache::new(InMemoryArtifactCache::new()));
    run_with_collaborators(cli, event_bus, cache).await
}

/// Same as [`run`], but against caller-supplied collaborators for the parts
/// of the pipeline a test needs direct access to: the event bus (to observe
/// exactly which events a run posted, e.g. asserting a cached rebuild posts
/// zero `StepStarted` events) and the artifact cache (shared across two
/// separate calls, so a second call can actually observe cache hits from
/// the first — a real invocation of the compiled binary only ever makes one
/// call, so it always starts from an empty in-process cache; persisting the
/// cache to disk across separate process invocations is not implemented).
pub async fn run_with_collaborators(cli: Cli, event_bus: Arc<EventBus>, cache: Arc<dyn ArtifactCache>) -> i32 {
    if cli.targets.is_empty() {
        eprintln!("{}", "error: no target patterns given".red());
        return EXIT_COMMAND_LINE_ERROR;
    }

    let mut overrides = Vec::new();
    for raw in &cli.config {
        match ConfigOverride::parse(raw) {
            Some(o) => overrides.push(o),
            None => {
                eprintln!("{}", format!("error: malformed override `{raw}`, expected section.key=value").red());
                return EXIT_COMMAND_LINE_ERROR;
            }
        }
    }

    let mut config = BuildConfig::default().with_overrides(overrides);
    config.target_platform = cli.target_platforms.clone();
    config.exclude_incompatible_targets = cli.exclude_incompatible_targets;

    let cell = CellName::new("root");
    let nodes = match manifest::load_cell(&cell, &cli.root) {
        Ok(nodes) => nodes,
        Err(e) => {
            eprintln!("{}", format!("error: {e}").red());
            return EXIT_PARSE_ERROR;
        }
    };

    let graph = match ruleforge_graph::TargetGraph::build(nodes) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("{}", format!("error: {e}").red());
            return EXIT_PARSE_ERROR;
        }
    };

    let roots: Vec<TargetLabel> = {
        let mut resolved = Vec::new();
        for pattern in &cli.targets {
            match pattern::resolve(pattern, &cell, &graph, &BTreeMap::new()) {
                Ok(mut labels) => resolved.append(&mut labels),
                Err(e) => {
                    eprintln!("{}", format!("error: {e}").red());
                    return match e {
                        BuildError::MalformedPattern(_) => EXIT_COMMAND_LINE_ERROR,
                        _ => EXIT_PARSE_ERROR,
                    };
                }
            }
        }
        resolved.sort();
        resolved.dedup();
        resolved
    };
    if roots.is_empty() {
        eprintln!("{}", "error: target patterns resolved to an empty set".red());
        return EXIT_COMMAND_LINE_ERROR;
    }

    let filesystem = Arc::new(LocalFilesystem::new(&cli.root));
    let cell_paths = Arc::new(SingleCellPaths::new(cell.clone(), &cli.root));
    let process_executor = Arc::new(TokioProcessExecutor);
    let graph = Arc::new(graph);

    let action_graph = Arc::new(ActionGraphBuilder::new());
    let descriptions: BTreeMap<&str, &dyn RuleDescription> = BTreeMap::from([
        (crate::rules::writefile::RULE_TYPE, &WriteFileDescription as &dyn RuleDescription),
        (crate::rules::genrule::RULE_TYPE, &GenRuleDescription as &dyn RuleDescription),
    ]);

    for label in graph.topo_sorted() {
        let node = graph.node(&label).expect("topo order only names graph members");
        let description = match descriptions.get(node.rule_type.as_str()) {
            Some(d) => *d,
            None => {
                eprintln!("{}", format!("error: unknown rule type `{}` for target `{label}`", node.rule_type).red());
                return EXIT_PARSE_ERROR;
            }
        };
        let creation_ctx = RuleCreationContext {
            filesystem: filesystem.clone(),
            cell_paths: cell_paths.clone(),
            target_graph: graph.clone(),
            event_bus: event_bus.clone(),
        };
        let result = action_graph.require(&label, || description.create_rule(&creation_ctx, node));
        if let Err(e) = result {
            eprintln!("{}", format!("error: {e}").red());
            return EXIT_PARSE_ERROR;
        }
    }

    let content_hasher = Arc::new(FilesystemContentHasher::new(filesystem.clone(), cell_paths.clone()));
    let rule_keys = Arc::new(RuleKeyEngine::new(action_graph.clone(), content_hasher));

    let scheduler = BuildScheduler::new(
        action_graph.clone(),
        rule_keys.clone(),
        cache,
        event_bus,
        config.output.clone(),
        filesystem,
        cell_paths,
        process_executor,
        config.worker_threads,
        config.platform_env.clone(),
    );

    let report = scheduler.build(&roots).await;
    let success = report.is_empty();

    if cli.just_build {
        return if success { EXIT_SUCCESS } else { EXIT_BUILD_FAILURE };
    }

    if let Some(log_path) = &cli.rulekeys_log_path {
        let mut lines = String::new();
        for target in &roots {
            if let Ok(key) = rule_keys.key_of(target).await {
                lines.push_str(&format!("{target} {}\n", key.to_hex()));
            }
        }
        if let Err(e) = std::fs::write(log_path, lines) {
            eprintln!("{}", format!("warning: failed to write rulekeys log: {e}").yellow());
        }
    }

    report_results(&cli, &config.output, &roots, &rule_keys).await;

    if !success {
        eprintln!("{}", "build failed:".red().bold());
        eprint!("{report}");
        return EXIT_BUILD_FAILURE;
    }
    EXIT_SUCCESS
}

async fn report_results(cli: &Cli, output: &OutputLayout, roots: &[TargetLabel], rule_keys: &RuleKeyEngine) {
    let mut json_entries = Vec::new();
    for target in roots {
        let rule_key = rule_keys.key_of(target).await.ok();
        let hex = rule_key.map(|k| k.to_hex()).unwrap_or_default();
        let out_dir = output.gen_dir(target.package.as_str(), target.name.as_str(), &hex);

        if cli.show_rulekey {
            println!("{target} {}", hex.bold());
        }
        if cli.show_output {
            println!("{target} {}", out_dir.display());
        }
        if cli.show_full_output {
            println!("{target} {}", std::path::absolute(&out_dir).unwrap_or_else(|_| out_dir.clone()).display());
        }
        if cli.show_json_output {
            json_entries.push(json!({"target": target.to_string(), "rulekey": hex, "output": out_dir}));
        }
        if let Some(dest) = &cli.out {
            let _ = std::fs::create_dir_all(dest);
        }
    }
    if cli.show_json_output {
        println!("{}", serde_json::to_string_pretty(&json_entries).unwrap_or_default());
    }
}
