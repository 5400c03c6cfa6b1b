//! Build-wide configuration: worker pool size, output layout and the
//! `-c section.key=value` override table threaded through from the CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-build output directory layout, rooted at `<cell-root>/<out_root>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLayout {
    pub out_root: PathBuf,
}

impl OutputLayout {
    pub fn new(out_root: impl Into<PathBuf>) -> Self {
        Self {
            out_root: out_root.into(),
        }
    }

    /// `<out_root>/gen/<package>/<target-name>__<hash>`
    pub fn gen_dir(&self, package: &str, target_name: &str, rule_key_hex: &str) -> PathBuf {
        self.out_root
            .join("gen")
            .join(package)
            .join(format!("{target_name}__{}", &rule_key_hex[..16.min(rule_key_hex.len())]))
    }

    /// `<out_root>/scratch/<package>/<target-name>__<hash>`
    pub fn scratch_dir(&self, package: &str, target_name: &str, rule_key_hex: &str) -> PathBuf {
        self.out_root
            .join("scratch")
            .join(package)
            .join(format!("{target_name}__{}", &rule_key_hex[..16.min(rule_key_hex.len())]))
    }

    pub fn last_output_symlink(&self) -> PathBuf {
        self.out_root.join("last")
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new("buck-out")
    }
}

/// A `-c section.key=value` override, applied on top of any config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverride {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl ConfigOverride {
    /// Parses `section.key=value`. Returns `None` for malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        let (path, value) = raw.split_once('=')?;
        let (section, key) = path.split_once('.')?;
        if section.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Build-wide configuration. Constructed once per invocation and shared
/// (read-only) across every rule description and the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Bounded worker-thread count for the scheduler's executor. Rule
    /// execution and rule-key computation share this pool.
    pub worker_threads: usize,
    pub output: OutputLayout,
    /// Resolved `-c` overrides, keyed by `section.key`.
    overrides: BTreeMap<String, String>,
    pub target_platform: Option<String>,
    pub exclude_incompatible_targets: bool,
    /// The platform-default layer of the subprocess env-precedence merge:
    /// process-inherited < platform-default < rule-scoped < tool-scoped.
    pub platform_env: BTreeMap<String, String>,
}

impl BuildConfig {
    pub fn new(worker_threads: usize) -> Self {
        Self {
            worker_threads: worker_threads.max(1),
            output: OutputLayout::default(),
            overrides: BTreeMap::new(),
            target_platform: None,
            exclude_incompatible_targets: false,
            platform_env: BTreeMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = ConfigOverride>) -> Self {
        for o in overrides {
            self.overrides.insert(format!("{}.{}", o.section, o.key), o.value);
        }
        self
    }

    pub fn with_platform_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.platform_env.extend(env);
        self
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.overrides
            .get(&format!("{section}.{key}"))
            .map(String::as_str)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
