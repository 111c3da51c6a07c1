//! Per-host path configuration and resolution.
//!
//! A dataset's storage location is declared as an ordered list of path
//! groups (`local`, `radar`, `__test`, ...). Each group maps a host OS tag to
//! a directory or to nothing. Resolution walks the groups in declared order
//! and returns the first directory that exists on this host.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smio_common::{SmioError, SmioResult};
use tracing::{debug, info};

use crate::catalog::DatasetId;

/// Placeholder expanded to [`ResolverConfig::testdata_dir`].
pub const TESTDATA_PLACEHOLDER: &str = "{testdata}";

/// Group conventionally reserved for bundled fixture data.
pub const TEST_GROUP: &str = "__test";

/// Host operating system tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Win,
    Lin,
}

impl HostOs {
    /// Tag of the running host.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Win
        } else {
            HostOs::Lin
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostOs::Win => "win",
            HostOs::Lin => "lin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "win" | "windows" => Some(HostOs::Win),
            "lin" | "linux" | "unix" => Some(HostOs::Lin),
            _ => None,
        }
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named candidate location, per host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathGroup {
    #[serde(rename = "group")]
    pub name: String,
    #[serde(flatten)]
    pub paths: BTreeMap<HostOs, Option<String>>,
}

impl PathGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths: BTreeMap::new(),
        }
    }

    /// Builder-style: declare the path (or explicit null) for one host.
    pub fn with(mut self, host: HostOs, path: Option<&str>) -> Self {
        self.paths.insert(host, path.map(str::to_string));
        self
    }

    /// Same path on every host.
    pub fn everywhere(name: impl Into<String>, path: &str) -> Self {
        Self::new(name)
            .with(HostOs::Win, Some(path))
            .with(HostOs::Lin, Some(path))
    }

    /// Declared, non-null path for `host`.
    pub fn candidate(&self, host: HostOs) -> Option<&str> {
        self.paths.get(&host).and_then(|p| p.as_deref())
    }
}

/// Ordered path groups of one dataset. Order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathConfig {
    groups: Vec<PathGroup>,
}

impl PathConfig {
    pub fn new(groups: Vec<PathGroup>) -> Self {
        Self { groups }
    }

    /// Append a group; a group of the same name is replaced in place.
    pub fn group(mut self, group: PathGroup) -> Self {
        match self.groups.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => *existing = group,
            None => self.groups.push(group),
        }
        self
    }

    pub fn groups(&self) -> &[PathGroup] {
        &self.groups
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PathGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Resolver settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Replacement for `{testdata}` in configured paths.
    pub testdata_dir: Option<PathBuf>,

    /// Resolve as if running on this host (defaults to the real host).
    pub host: Option<HostOs>,
}

impl ResolverConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SMIO_TESTDATA_DIR") {
            if !val.is_empty() {
                config.testdata_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("SMIO_HOST_OS") {
            config.host = HostOs::from_str(&val);
        }

        config
    }

    pub fn with_testdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.testdata_dir = Some(dir.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(dir) = &self.testdata_dir {
            if dir.as_os_str().is_empty() {
                return Err("testdata_dir must not be empty".to_string());
            }
        }
        Ok(())
    }
}

/// A resolved storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub group: String,
    pub path: PathBuf,
}

/// Maps a dataset's path configuration to an existing directory.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    config: ResolverConfig,
}

impl PathResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(ResolverConfig::from_env())
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn host(&self) -> HostOs {
        self.config.host.unwrap_or_else(HostOs::current)
    }

    /// Expand placeholders. `None` when a placeholder cannot be filled.
    pub fn expand(&self, raw: &str) -> Option<PathBuf> {
        if raw.contains(TESTDATA_PLACEHOLDER) {
            let dir = self.config.testdata_dir.as_ref()?;
            let dir = dir.to_string_lossy();
            return Some(PathBuf::from(raw.replace(TESTDATA_PLACEHOLDER, &dir)));
        }
        Some(PathBuf::from(raw))
    }

    /// First existing directory, trying groups in declared order (or only
    /// `force_group`).
    pub fn resolve(
        &self,
        dataset: &DatasetId,
        paths: &PathConfig,
        force_group: Option<&str>,
    ) -> SmioResult<ResolvedPath> {
        match self.candidates(dataset, paths, force_group).into_iter().next() {
            Some(resolved) => {
                info!(
                    dataset = %dataset,
                    group = %resolved.group,
                    path = ?resolved.path,
                    "Resolved dataset path"
                );
                Ok(resolved)
            }
            None => Err(SmioError::PathResolutionFailed {
                dataset: dataset.to_string(),
                host: self.host().to_string(),
            }),
        }
    }

    /// Every existing candidate, in resolution order.
    pub fn resolve_all(&self, dataset: &DatasetId, paths: &PathConfig) -> Vec<ResolvedPath> {
        self.candidates(dataset, paths, None)
    }

    fn candidates(
        &self,
        dataset: &DatasetId,
        paths: &PathConfig,
        force_group: Option<&str>,
    ) -> Vec<ResolvedPath> {
        let host = self.host();
        let mut found = Vec::new();

        for group in paths.groups() {
            if force_group.is_some_and(|forced| forced != group.name) {
                continue;
            }
            let Some(raw) = group.candidate(host) else {
                debug!(dataset = %dataset, group = %group.name, host = %host, "No path declared");
                continue;
            };
            let Some(path) = self.expand(raw) else {
                debug!(dataset = %dataset, group = %group.name, raw = raw, "Placeholder not configured");
                continue;
            };
            if path.is_dir() {
                found.push(ResolvedPath {
                    group: group.name.clone(),
                    path,
                });
            } else {
                debug!(dataset = %dataset, group = %group.name, path = ?path, "Candidate does not exist");
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> DatasetId {
        DatasetId::new(["TEST", "v1"])
    }

    #[test]
    fn test_null_and_missing_groups_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().to_string_lossy().to_string();

        let paths = PathConfig::default()
            .group(PathGroup::new("local").with(HostOs::Lin, None).with(HostOs::Win, None))
            .group(PathGroup::everywhere("radar", "/definitely/not/here"))
            .group(PathGroup::everywhere("__test", &existing));

        let resolver = PathResolver::default();
        let resolved = resolver.resolve(&id(), &paths, None).unwrap();
        assert_eq!(resolved.group, "__test");
        assert_eq!(resolved.path, dir.path());

        // Repeated resolution is stable
        assert_eq!(resolver.resolve(&id(), &paths, None).unwrap(), resolved);
    }

    #[test]
    fn test_force_group_only_tries_that_group() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().to_string_lossy().to_string();
        let paths = PathConfig::default()
            .group(PathGroup::everywhere("radar", "/definitely/not/here"))
            .group(PathGroup::everywhere("__test", &existing));

        let err = PathResolver::default()
            .resolve(&id(), &paths, Some("radar"))
            .unwrap_err();
        assert!(matches!(err, SmioError::PathResolutionFailed { .. }));
    }

    #[test]
    fn test_testdata_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cci")).unwrap();
        let paths =
            PathConfig::default().group(PathGroup::everywhere("__test", "{testdata}/cci"));

        // Unset placeholder: group skipped
        assert!(PathResolver::default().resolve(&id(), &paths, None).is_err());

        let resolver =
            PathResolver::new(ResolverConfig::default().with_testdata_dir(dir.path()));
        let resolved = resolver.resolve(&id(), &paths, None).unwrap();
        assert_eq!(resolved.path, dir.path().join("cci"));
    }

    #[test]
    fn test_host_override() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().to_string_lossy().to_string();
        let paths = PathConfig::default()
            .group(PathGroup::new("local").with(HostOs::Win, Some(&existing)));

        let as_win = PathResolver::new(ResolverConfig {
            host: Some(HostOs::Win),
            ..Default::default()
        });
        let as_lin = PathResolver::new(ResolverConfig {
            host: Some(HostOs::Lin),
            ..Default::default()
        });
        assert!(as_win.resolve(&id(), &paths, None).is_ok());
        assert!(as_lin.resolve(&id(), &paths, None).is_err());
    }

    #[test]
    fn test_path_config_yaml_keeps_order() {
        let yaml = r#"
- group: radar
  lin: /data/radar
  win: null
- group: local
  lin: /data/local
"#;
        let paths: PathConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(paths.group_names(), vec!["radar", "local"]);
        assert_eq!(paths.get("radar").unwrap().candidate(HostOs::Win), None);
        assert_eq!(
            paths.get("local").unwrap().candidate(HostOs::Lin),
            Some("/data/local")
        );
    }
}
