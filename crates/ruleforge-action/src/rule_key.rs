//! Bottom-up parallel rule-key computation with per-invocation memoization.
//!
//! `key_of(rule)` is a digest over the rule's target identity, its own
//! key-contributing fields, and the keys of its direct build dependencies.
//! Dependency keys are computed concurrently; a per-target memo ensures each
//! rule's key is computed at most once even when many dependents request it
//! at the same instant.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use ruleforge_core::digest::{Digest, DigestBuilder};
use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::TargetLabel;
use tokio::sync::OnceCell;

use crate::action_graph::ActionGraphBuilder;
use crate::rule::ContentHasher;

/// Computes and memoizes rule keys for the lifetime of one build invocation.
/// A new engine (and therefore a new memo) must be created per invocation;
/// keys are never retained across builds.
pub struct RuleKeyEngine {
    action_graph: Arc<ActionGraphBuilder>,
    content_hasher: Arc<dyn ContentHasher>,
    memo: DashMap<TargetLabel, Arc<OnceCell<Digest>>>,
}

impl RuleKeyEngine {
    pub fn new(action_graph: Arc<ActionGraphBuilder>, content_hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            action_graph,
            content_hasher,
            memo: DashMap::new(),
        }
    }

    /// The rule key of `target`, computing it (and, transitively, its
    /// dependencies' keys) at most once. Concurrent callers for the same
    /// target observe the same pending or completed computation rather than
    /// duplicating work.
    pub async fn key_of(&self, target: &TargetLabel) -> Result<Digest> {
        let cell = self
            .memo
            .entry(target.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        // OnceCell::get_or_try_init only runs the initializer for the first
        // caller; racing callers await the same in-flight future.
        let digest = cell.get_or_try_init(|| self.compute(target)).await?;
        Ok(*digest)
    }

    /// Boxed because this recursively calls back into [`Self::key_of`] for
    /// each build dependency: an unboxed `async fn` cycle here would need an
    /// infinitely-sized future type.
    fn compute<'a>(&'a self, target: &'a TargetLabel) -> BoxFuture<'a, Result<Digest>> {
        async move {
            let rule = self.action_graph.require_existing(target)?;

            let mut dep_targets: Vec<TargetLabel> = rule.build_deps().to_vec();
            dep_targets.sort();

            let dep_futures = dep_targets.iter().map(|dep| self.key_of(dep));
            let dep_keys: Vec<Digest> = try_join_all(dep_futures).await?;

            let mut own_fields = DigestBuilder::new();
            rule.append_to_rule_key(&mut own_fields, self.content_hasher.as_ref())
                .map_err(|e| BuildError::RuleKeyHashing {
                    target: target.clone(),
                    field: "<rule-fields>".to_string(),
                    reason: e.to_string(),
                })?;
            let own_digest = own_fields.finish();

            let mut composed = DigestBuilder::new();
            composed.update_str("target", &target.to_string());
            composed.update_content_hash("own-fields", own_digest);
            composed.update_bool("cacheable", rule.is_cacheable());
            composed.update_sequence("build-deps", &dep_keys);
            Ok(composed.finish())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{BuildableContext, OutputRecorder, Rule};
    use crate::step::Step;
    use ruleforge_core::target::SourcePath;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopHasher;
    impl ContentHasher for NoopHasher {
        fn hash_source(&self, _path: &SourcePath) -> Result<Digest> {
            Ok(Digest::ZERO)
        }
    }

    struct StubRule {
        target: TargetLabel,
        deps: Vec<TargetLabel>,
        field: String,
        hash_calls: Arc<AtomicUsize>,
    }

    impl Rule for StubRule {
        fn target(&self) -> &TargetLabel {
            &self.target
        }
        fn build_deps(&self) -> &[TargetLabel] {
            &self.deps
        }
        fn append_to_rule_key(
            &self,
            sink: &mut DigestBuilder,
            _content_hasher: &dyn ContentHasher,
        ) -> Result<()> {
            self.hash_calls.fetch_add(1, Ordering::SeqCst);
            sink.update_str("field", &self.field);
            Ok(())
        }
        fn get_build_steps(&self, _ctx: &BuildableContext) -> Result<Vec<Box<dyn Step>>> {
            Ok(Vec::new())
        }
        fn record_outputs(&self, _ctx: &BuildableContext, _sink: &mut OutputRecorder) -> Result<()> {
            Ok(())
        }
    }

    fn register(graph: &ActionGraphBuilder, target: TargetLabel, deps: Vec<TargetLabel>, field: &str) {
        let hash_calls = Arc::new(AtomicUsize::new(0));
        graph
            .require(&target.clone(), move || {
                Ok(Arc::new(StubRule {
                    target: target.clone(),
                    deps,
                    field: field.to_string(),
                    hash_calls: hash_calls.clone(),
                }) as Arc<dyn Rule>)
            })
            .unwrap();
    }

    #[tokio::test]
    async fn identical_rules_produce_identical_keys() {
        let graph = Arc::new(ActionGraphBuilder::new());
        let leaf = TargetLabel::unconfigured("root", "pkg", "leaf");
        register(&graph, leaf.clone(), vec![], "x");

        let engine = RuleKeyEngine::new(graph, Arc::new(NoopHasher));
        let a = engine.key_of(&leaf).await.unwrap();
        let b = engine.key_of(&leaf).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn changing_a_field_changes_the_key() {
        let graph_a = Arc::new(ActionGraphBuilder::new());
        let target = TargetLabel::unconfigured("root", "pkg", "leaf");
        register(&graph_a, target.clone(), vec![], "x");
        let engine_a = RuleKeyEngine::new(graph_a, Arc::new(NoopHasher));

        let graph_b = Arc::new(ActionGraphBuilder::new());
        register(&graph_b, target.clone(), vec![], "y");
        let engine_b = RuleKeyEngine::new(graph_b, Arc::new(NoopHasher));

        assert_ne!(
            engine_a.key_of(&target).await.unwrap(),
            engine_b.key_of(&target).await.unwrap()
        );
    }

    #[tokio::test]
    async fn concurrent_requests_for_the_same_target_hash_once() {
        let graph = Arc::new(ActionGraphBuilder::new());
        let leaf = TargetLabel::unconfigured("root", "pkg", "leaf");
        let hash_calls = Arc::new(AtomicUsize::new(0));
        {
            let hash_calls = hash_calls.clone();
            let leaf = leaf.clone();
            graph
                .require(&leaf.clone(), move || {
                    Ok(Arc::new(StubRule {
                        target: leaf,
                        deps: vec![],
                        field: "x".to_string(),
                        hash_calls,
                    }) as Arc<dyn Rule>)
                })
                .unwrap();
        }

        let engine = Arc::new(RuleKeyEngine::new(graph, Arc::new(NoopHasher)));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let leaf = leaf.clone();
            handles.push(tokio::spawn(async move { engine.key_of(&leaf).await.unwrap() }));
        }
        let mut keys = Vec::new();
        for h in handles {
            keys.push(h.await.unwrap());
        }
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn key_folds_in_dependency_keys() {
        let graph = Arc::new(ActionGraphBuilder::new());
        let dep = TargetLabel::unconfigured("root", "pkg", "dep");
        let root = TargetLabel::unconfigured("root", "pkg", "root");
        register(&graph, dep.clone(), vec![], "dep-field");
        register(&graph, root.clone(), vec![dep.clone()], "root-field");

        let engine = RuleKeyEngine::new(graph.clone(), Arc::new(NoopHasher));
        let root_key_with_dep = engine.key_of(&root).await.unwrap();

        let graph2 = Arc::new(ActionGraphBuilder::new());
        register(&graph2, dep, vec![], "different-dep-field");
        register(&graph2, root.clone(), vec![], "root-field");
        let engine2 = RuleKeyEngine::new(graph2, Arc::new(NoopHasher));
        let root_key_without_dep = engine2.key_of(&root).await.unwrap();

        assert_ne!(root_key_with_dep, root_key_without_dep);
    }
}
