//! Bottom-up parallel execution of the action graph. For each requested
//! target, recursively ensures its build dependencies have completed,
//! computes its rule key, consults the artifact cache, and on a miss runs
//! its build steps on the step pool — in that order, with suspension only at
//! await points, never mid-step.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::OnceCell;

use ruleforge_action::step::merge_env;
use ruleforge_action::{ActionGraphBuilder, BuildableContext, OutputRecorder, Rule, RuleKeyEngine, Step, StepContext, StepOutcome};
use ruleforge_cache::{ArtifactBundle, ArtifactCache, FetchOutcome};
use ruleforge_core::config::OutputLayout;
use ruleforge_core::digest::Digest;
use ruleforge_core::error::{BuildError, ErrorReport, Result};
use ruleforge_core::event::{now_millis, BuildEvent, EventBus};
use ruleforge_core::target::TargetLabel;
use ruleforge_core::traits::{CellPaths, Filesystem, ProcessExecutor};

use crate::ready_queue::StepPool;

/// Whether a target's build completed. The reason for a failure lives in the
/// scheduler's [`ErrorReport`]; this only lets dependents decide whether to
/// proceed.
type Completion = std::result::Result<(), ()>;

pub struct BuildScheduler {
    action_graph: Arc<ActionGraphBuilder>,
    rule_keys: Arc<RuleKeyEngine>,
    cache: Arc<dyn ArtifactCache>,
    event_bus: Arc<EventBus>,
    output: OutputLayout,
    filesystem: Arc<dyn Filesystem>,
    cell_paths: Arc<dyn CellPaths>,
    process_executor: Arc<dyn ProcessExecutor>,
    step_pool: Arc<StepPool>,
    cancelled: Arc<AtomicBool>,
    completions: DashMap<TargetLabel, Arc<OnceCell<Completion>>>,
    error_report: Mutex<ErrorReport>,
    /// Captured once per scheduler so every step in this build sees the
    /// same process-inherited layer, rather than whatever the live host
    /// environment happens to be at the moment each step runs.
    process_env: BTreeMap<String, String>,
    platform_env: BTreeMap<String, String>,
}

impl BuildScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action_graph: Arc<ActionGraphBuilder>,
        rule_keys: Arc<RuleKeyEngine>,
        cache: Arc<dyn ArtifactCache>,
        event_bus: Arc<EventBus>,
        output: OutputLayout,
        filesystem: Arc<dyn Filesystem>,
        cell_paths: Arc<dyn CellPaths>,
        process_executor: Arc<dyn ProcessExecutor>,
        worker_threads: usize,
        platform_env: BTreeMap<String, String>,
    ) -> Self {
        let worker_threads = worker_threads.max(1);
        Self {
            action_graph,
            rule_keys,
            cache,
            event_bus,
            output,
            filesystem,
            cell_paths,
            process_executor,
            step_pool: Arc::new(StepPool::new(worker_threads, worker_threads * 64)),
            cancelled: Arc::new(AtomicBool::new(false)),
            completions: DashMap::new(),
            error_report: Mutex::new(ErrorReport::new()),
            process_env: std::env::vars().collect(),
            platform_env,
        }
    }

    /// Builds every target in `roots`, and transitively whatever they depend
    /// on. Returns once the whole closure has settled, carrying every
    /// failure observed rather than just the first.
    pub async fn build(&self, roots: &[TargetLabel]) -> ErrorReport {
        self.event_bus.post(BuildEvent::BuildStarted {
            targets: roots.to_vec(),
            timestamp_millis: now_millis(),
        });

        let results = join_all(roots.iter().map(|target| self.execute(target))).await;
        let success = results.iter().all(|r| r.is_ok());

        self.event_bus.post(BuildEvent::BuildFinished {
            success,
            timestamp_millis: now_millis(),
        });

        let empty = ErrorReport::new();
        std::mem::replace(&mut self.error_report.lock().unwrap(), empty)
    }

    /// Ensures `target` has run to completion exactly once for this
    /// scheduler instance. Concurrent callers for the same target share one
    /// in-flight completion future, the same memoization shape as
    /// [`RuleKeyEngine::key_of`].
    fn execute<'a>(&'a self, target: &'a TargetLabel) -> BoxFuture<'a, Completion> {
        let cell = self
            .completions
            .entry(target.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        async move { *cell.get_or_init(|| self.execute_once(target)).await }.boxed()
    }

    /// Boxed for the same reason as [`RuleKeyEngine::compute`]: this
    /// recursively calls back into [`Self::execute`] for each build
    /// dependency.
    fn execute_once<'a>(&'a self, target: &'a TargetLabel) -> BoxFuture<'a, Completion> {
        async move {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(());
            }

            let rule = match self.action_graph.require_existing(target) {
                Ok(rule) => rule,
                Err(e) => return self.fail(target, e),
            };

            let mut dep_targets: Vec<TargetLabel> = rule.build_deps().to_vec();
            dep_targets.sort();
            let dep_results = join_all(dep_targets.iter().map(|dep| self.execute(dep))).await;
            if dep_results.iter().any(|r| r.is_err()) {
                return Err(());
            }
            if self.cancelled.load(Ordering::Acquire) {
                return Err(());
            }

            let rule_key = match self.rule_keys.key_of(target).await {
                Ok(k) => k,
                Err(e) => return self.fail(target, e),
            };
            let build_ctx = self.buildable_context(target, &rule_key);

            if rule.is_cacheable() {
                if let Some(completion) = self.try_cache_hit(target, rule_key, &build_ctx).await {
                    return completion;
                }
            }

            self.event_bus.post(BuildEvent::RuleStarted {
                target: target.clone(),
                timestamp_millis: now_millis(),
            });

            if let Err(e) = self.build_locally(target, rule.as_ref(), &build_ctx, rule_key).await {
                self.event_bus.post(BuildEvent::RuleFinished {
                    target: target.clone(),
                    success: false,
                    timestamp_millis: now_millis(),
                });
                return self.fail(target, e);
            }

            self.event_bus.post(BuildEvent::RuleFinished {
                target: target.clone(),
                success: true,
                timestamp_millis: now_millis(),
            });
            Ok(())
        }
        .boxed()
    }

    /// Returns `Some(completion)` if a cache hit (or a cache error, treated
    /// as a miss) settles this target without running any steps.
    async fn try_cache_hit(
        &self,
        target: &TargetLabel,
        rule_key: Digest,
        build_ctx: &BuildableContext,
    ) -> Option<Completion> {
        let outcome = match self.cache.fetch(rule_key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.event_bus.post(BuildEvent::CacheChecked {
                    target: target.clone(),
                    rule_key,
                    hit: false,
                    timestamp_millis: now_millis(),
                });
                tracing::warn!(%target, error = %e, "artifact cache fetch failed, building locally");
                return None;
            }
        };

        self.event_bus.post(BuildEvent::CacheChecked {
            target: target.clone(),
            rule_key,
            hit: outcome.is_hit(),
            timestamp_millis: now_millis(),
        });

        let FetchOutcome::Hit(bundle) = outcome else {
            return None;
        };
        Some(match self.restore(build_ctx, &bundle).await {
            Ok(()) => Ok(()),
            Err(e) => self.fail(target, e),
        })
    }

    async fn build_locally(
        &self,
        target: &TargetLabel,
        rule: &dyn Rule,
        build_ctx: &BuildableContext,
        rule_key: Digest,
    ) -> Result<()> {
        let steps = rule.get_build_steps(build_ctx)?;
        self.run_steps(target, build_ctx, steps).await?;

        let mut recorder = OutputRecorder::new();
        rule.record_outputs(build_ctx, &mut recorder)?;

        if rule.is_cacheable() {
            match self.collect_bundle(&recorder).await {
                Ok(bundle) => {
                    self.cache.store(rule_key, bundle).await;
                    self.event_bus.post(BuildEvent::CacheStored {
                        target: target.clone(),
                        rule_key,
                        timestamp_millis: now_millis(),
                    });
                }
                Err(e) => {
                    tracing::warn!(%target, error = %e, "failed to collect outputs for the artifact cache");
                }
            }
        }
        Ok(())
    }

    fn fail(&self, target: &TargetLabel, error: BuildError) -> Completion {
        self.cancelled.store(true, Ordering::Release);
        self.error_report.lock().unwrap().record(target.clone(), error);
        Err(())
    }

    fn buildable_context(&self, target: &TargetLabel, rule_key: &Digest) -> BuildableContext {
        let hex = rule_key.to_hex();
        BuildableContext {
            output_dir: self.output.gen_dir(target.package.as_str(), target.name.as_str(), &hex),
            scratch_dir: self.output.scratch_dir(target.package.as_str(), target.name.as_str(), &hex),
        }
    }

    async fn run_steps(
        &self,
        target: &TargetLabel,
        build_ctx: &BuildableContext,
        steps: Vec<Box<dyn Step>>,
    ) -> Result<()> {
        self.filesystem.mkdirs(&build_ctx.output_dir).await?;
        self.filesystem.mkdirs(&build_ctx.scratch_dir).await?;

        for step in steps {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(BuildError::Cancelled);
            }

            let step: Arc<dyn Step> = Arc::from(step);
            // Rule-scoped overrides have no data source yet (no `Rule`
            // implementation declares any), so that layer is empty; the
            // merge still runs in the declared precedence order so a future
            // rule type only needs to supply its own layer here.
            let env = merge_env(&self.process_env, &self.platform_env, &BTreeMap::new(), &step.tool_env());
            let ctx = Arc::new(StepContext::new(
                self.filesystem.clone(),
                self.cell_paths.clone(),
                self.process_executor.clone(),
                build_ctx.scratch_dir.clone(),
                build_ctx.output_dir.clone(),
                env,
                self.cancelled.clone(),
            ));
            let step_name = step.short_name().to_string();

            self.event_bus.post(BuildEvent::StepStarted {
                target: target.clone(),
                step_name: step_name.clone(),
                timestamp_millis: now_millis(),
            });

            let run: BoxFuture<'static, Result<StepOutcome>> = {
                let step = step.clone();
                let ctx = ctx.clone();
                async move { step.execute(&ctx).await }.boxed()
            };
            let outcome = self.step_pool.run(run).await?;

            self.event_bus.post(BuildEvent::StepFinished {
                target: target.clone(),
                step_name,
                success: outcome.is_success(),
                timestamp_millis: now_millis(),
            });

            if let StepOutcome::Failure { exit_code, stderr } = outcome {
                return Err(BuildError::BuildExecution {
                    target: target.clone(),
                    reason: format!("step exited with code {exit_code}: {}", String::from_utf8_lossy(&stderr)),
                });
            }
        }
        Ok(())
    }

    async fn restore(&self, build_ctx: &BuildableContext, bundle: &ArtifactBundle) -> Result<()> {
        self.filesystem.mkdirs(&build_ctx.output_dir).await?;
        for (path, bytes) in &bundle.contents {
            self.filesystem.write_bytes(path, bytes).await?;
        }
        Ok(())
    }

    async fn collect_bundle(&self, recorder: &OutputRecorder) -> Result<ArtifactBundle> {
        let mut bundle = ArtifactBundle::new();
        for (path, _content) in recorder.outputs() {
            let bytes = self.filesystem.read_bytes(path).await?;
            bundle = bundle.with_output(path.clone(), bytes);
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ruleforge_action::{BuildableContext, ContentHasher, OutputRecorder, Rule};
    use ruleforge_core::digest::Digest;
    use ruleforge_core::target::SourcePath;
    use ruleforge_core::traits::CellPaths;
    use ruleforge_exec::{LocalFilesystem, TokioProcessExecutor, WriteStep};
    use ruleforge_cache::{DedupingArtifactCache, InMemoryArtifactCache};

    use super::*;

    struct NoopHasher;
    impl ContentHasher for NoopHasher {
        fn hash_source(&self, _path: &SourcePath) -> Result<Digest> {
            Ok(Digest::ZERO)
        }
    }

    struct NoCellPaths;
    impl CellPaths for NoCellPaths {
        fn root_of(&self, _cell: &ruleforge_core::target::CellName) -> Option<&std::path::Path> {
            None
        }
    }

    /// A `writefile`-like stub rule that counts how many times its build
    /// step actually ran, so a test can assert a cache hit skipped it.
    struct CountingWriteRule {
        target: TargetLabel,
        content: String,
        runs: Arc<AtomicUsize>,
    }

    impl Rule for CountingWriteRule {
        fn target(&self) -> &TargetLabel {
            &self.target
        }
        fn build_deps(&self) -> &[TargetLabel] {
            &[]
        }
        fn append_to_rule_key(&self, sink: &mut ruleforge_core::digest::DigestBuilder, _: &dyn ContentHasher) -> Result<()> {
            sink.update_str("content", &self.content);
            Ok(())
        }
        fn get_build_steps(&self, ctx: &BuildableContext) -> Result<Vec<Box<dyn Step>>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Box::new(WriteStep {
                path: ctx.output_dir.join("out.txt"),
                contents: self.content.clone().into_bytes(),
            })])
        }
        fn record_outputs(&self, ctx: &BuildableContext, sink: &mut OutputRecorder) -> Result<()> {
            sink.record(ctx.output_dir.join("out.txt"), Digest::of_bytes(self.content.as_bytes()));
            Ok(())
        }
    }

    fn scheduler_with_rule(target: TargetLabel, content: &str, runs: Arc<AtomicUsize>, root: &std::path::Path) -> BuildScheduler {
        let action_graph = Arc::new(ActionGraphBuilder::new());
        action_graph
            .require(&target.clone(), {
                let target = target.clone();
                let content = content.to_string();
                move || {
                    Ok(Arc::new(CountingWriteRule { target, content, runs }) as Arc<dyn Rule>)
                }
            })
            .unwrap();
        let rule_keys = Arc::new(RuleKeyEngine::new(action_graph.clone(), Arc::new(NoopHasher)));
        BuildScheduler::new(
            action_graph,
            rule_keys,
            Arc::new(DedupingArtifactCache::new(InMemoryArtifactCache::new())),
            Arc::new(EventBus::default()),
            OutputLayout::new(root.join("buck-out")),
            Arc::new(LocalFilesystem::new(root)),
            Arc::new(NoCellPaths),
            Arc::new(TokioProcessExecutor),
            4,
            BTreeMap::new(),
        )
    }

    #[tokio::test]
    async fn concurrent_roots_for_the_same_target_build_it_at_most_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = TargetLabel::unconfigured("root", "pkg", "leaf");
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = scheduler_with_rule(target.clone(), "hello", runs.clone(), dir.path());

        // One `build()` call naming the same target twice exercises the
        // same per-target memoization `execute` relies on — both entries
        // in `roots` race on `self.completions`'s `OnceCell`.
        let report = scheduler.build(&[target.clone(), target]).await;
        assert!(report.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_cache_hit_rebuild_runs_zero_steps_and_posts_zero_step_started_events() {
        let dir = tempfile::tempdir().unwrap();
        let target = TargetLabel::unconfigured("root", "pkg", "leaf");
        let runs = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(DedupingArtifactCache::new(InMemoryArtifactCache::new()));

        let build_once = |runs: Arc<AtomicUsize>, cache: Arc<dyn ArtifactCache>, bus: Arc<EventBus>| {
            let action_graph = Arc::new(ActionGraphBuilder::new());
            let target = target.clone();
            action_graph
                .require(&target.clone(), {
                    let target = target.clone();
                    move || {
                        Ok(Arc::new(CountingWriteRule {
                            target,
                            content: "hello".to_string(),
                            runs,
                        }) as Arc<dyn Rule>)
                    }
                })
                .unwrap();
            let rule_keys = Arc::new(RuleKeyEngine::new(action_graph.clone(), Arc::new(NoopHasher)));
            let dir = dir.path().to_path_buf();
            BuildScheduler::new(
                action_graph,
                rule_keys,
                cache,
                bus,
                OutputLayout::new(dir.join("buck-out")),
                Arc::new(LocalFilesystem::new(dir.clone())),
                Arc::new(NoCellPaths),
                Arc::new(TokioProcessExecutor),
                4,
                BTreeMap::new(),
            )
        };

        let first = build_once(runs.clone(), cache.clone(), Arc::new(EventBus::default()));
        let report = first.build(&[target.clone()]).await;
        assert!(report.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let second = build_once(runs.clone(), cache, bus);
        let report = second.build(&[target]).await;
        assert!(report.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1, "cache hit must not re-run the build step");

        let mut step_started = 0;
        loop {
            match rx.try_recv() {
                Ok(BuildEvent::StepStarted { .. }) => step_started += 1,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        assert_eq!(step_started, 0);
    }
}
