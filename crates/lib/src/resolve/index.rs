//! Version-pinning resolver backed by a local package index.
//!
//! The index is a TOML file listing every known release:
//!
//! ```toml
//! [[package]]
//! name = "requests"
//! version = "2.31.0"
//! dependencies = ["urllib3>=1.21,<3", "idna>=2.5"]
//! ```
//!
//! Resolution is a depth-first search with backtracking. At each step the
//! requirements of the roots and of every chosen release are gathered; the
//! first unchosen package in name order is tried with each release allowed
//! by all of them, highest first. A choice whose dependencies later
//! contradict an earlier one is undone and the next lower release tried, so
//! `Conflict` is only returned when no combination satisfies every
//! constraint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, trace};

use super::specifier::{Requirement, Version, normalize_name};
use super::{ResolveError, Resolver};
use crate::resolve::lock::LockedDependency;

/// Upper bound on candidate releases tried before giving up.
pub const MAX_ATTEMPTS: usize = 10_000;

#[derive(Debug, Deserialize)]
struct IndexFile {
  #[serde(default)]
  package: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexEntry {
  name: String,
  version: String,
  #[serde(default)]
  dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Release {
  pub version: Version,
  pub dependencies: Vec<Requirement>,
}

/// Known releases per normalized package name, highest version first.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
  packages: BTreeMap<String, Vec<Release>>,
}

impl PackageIndex {
  pub fn load(path: &Path) -> Result<Self, ResolveError> {
    let index_error = |message: String| ResolveError::Index {
      path: path.to_path_buf(),
      message,
    };
    let content = std::fs::read_to_string(path).map_err(|e| index_error(e.to_string()))?;
    let file: IndexFile = toml::from_str(&content).map_err(|e| index_error(e.message().to_string()))?;

    let mut index = Self::default();
    for entry in file.package {
      let dependencies = entry
        .dependencies
        .iter()
        .map(|d| Requirement::parse(d))
        .collect::<Result<Vec<_>, _>>()?;
      index.insert(&entry.name, entry.version.parse()?, dependencies);
    }
    debug!(path = %path.display(), packages = index.packages.len(), "loaded package index");
    Ok(index)
  }

  /// Add a release. A release with an equal version replaces the old one.
  pub fn insert(&mut self, name: &str, version: Version, dependencies: Vec<Requirement>) {
    let releases = self.packages.entry(normalize_name(name)).or_default();
    releases.retain(|r| r.version != version);
    releases.push(Release { version, dependencies });
    releases.sort_by(|a, b| b.version.cmp(&a.version));
  }

  pub fn releases(&self, name: &str) -> Option<&[Release]> {
    self.packages.get(name).map(Vec::as_slice)
  }
}

pub struct IndexResolver {
  index: PackageIndex,
  path: Option<PathBuf>,
}

impl IndexResolver {
  pub fn new(index: PackageIndex) -> Self {
    Self { index, path: None }
  }

  pub fn from_file(path: &Path) -> Result<Self, ResolveError> {
    Ok(Self {
      index: PackageIndex::load(path)?,
      path: Some(path.to_path_buf()),
    })
  }

  pub fn index_path(&self) -> Option<&Path> {
    self.path.as_deref()
  }
}

/// State of one backtracking search.
struct Search<'a> {
  index: &'a PackageIndex,
  roots: &'a [Requirement],
  attempts: usize,
  /// First dead end met, reported if the whole search fails.
  failure: Option<ResolveError>,
}

impl<'a> Search<'a> {
  fn dead_end(&mut self, error: ResolveError) -> bool {
    trace!(error = %error, "backtracking");
    self.failure.get_or_insert(error);
    false
  }

  /// Extend `chosen` until every gathered package has a release. Returns
  /// `Ok(false)` when this branch has no solution.
  fn extend(&mut self, chosen: &mut BTreeMap<String, &'a Release>) -> Result<bool, ResolveError> {
    let gathered = gather(self.roots, chosen);

    let violated = chosen.iter().find_map(|(name, release)| {
      let requirements = gathered.get(name)?;
      (!requirements.iter().all(|req| req.allows(&release.version))).then(|| conflict(name, requirements))
    });
    if let Some(error) = violated {
      return Ok(self.dead_end(error));
    }

    let Some((name, requirements)) = gathered.iter().find(|(name, _)| !chosen.contains_key(*name)) else {
      return Ok(true);
    };
    let Some(releases) = self.index.releases(name) else {
      return Ok(self.dead_end(ResolveError::UnknownPackage(name.clone())));
    };

    let candidates: Vec<&'a Release> = releases
      .iter()
      .filter(|r| requirements.iter().all(|req| req.allows(&r.version)))
      .collect();
    if candidates.is_empty() {
      return Ok(self.dead_end(conflict(name, requirements)));
    }

    for release in candidates {
      self.attempts += 1;
      if self.attempts > MAX_ATTEMPTS {
        return Err(ResolveError::Exhausted { attempts: MAX_ATTEMPTS });
      }
      chosen.insert(name.clone(), release);
      if self.extend(chosen)? {
        return Ok(true);
      }
      chosen.remove(name);
    }
    Ok(false)
  }
}

fn conflict(name: &str, requirements: &[&Requirement]) -> ResolveError {
  let mut specifiers: Vec<String> = requirements.iter().map(|r| r.raw.clone()).collect();
  specifiers.sort();
  specifiers.dedup();
  ResolveError::Conflict {
    package: name.to_string(),
    specifiers,
  }
}

fn gather<'a>(roots: &'a [Requirement], chosen: &BTreeMap<String, &'a Release>) -> BTreeMap<String, Vec<&'a Requirement>> {
  let mut gathered: BTreeMap<String, Vec<&Requirement>> = BTreeMap::new();
  let transitive = chosen.values().copied().flat_map(|release| release.dependencies.iter());
  for requirement in roots.iter().chain(transitive) {
    gathered.entry(requirement.name.clone()).or_default().push(requirement);
  }
  gathered
}

impl Resolver for IndexResolver {
  fn name(&self) -> &'static str {
    "index"
  }

  fn resolve(&self, dependencies: &[String]) -> Result<Vec<LockedDependency>, ResolveError> {
    let roots = dependencies
      .iter()
      .map(|d| Requirement::parse(d))
      .collect::<Result<Vec<_>, _>>()?;

    let mut search = Search {
      index: &self.index,
      roots: &roots,
      attempts: 0,
      failure: None,
    };
    let mut chosen: BTreeMap<String, &Release> = BTreeMap::new();
    if !search.extend(&mut chosen)? {
      return Err(search.failure.unwrap_or(ResolveError::Exhausted {
        attempts: search.attempts,
      }));
    }
    trace!(attempts = search.attempts, packages = chosen.len(), "search finished");

    // Declared roots first, in declaration order, then transitive packages by name.
    let mut locked = Vec::with_capacity(chosen.len());
    for root in &roots {
      if locked.iter().any(|l: &LockedDependency| l.name == root.name) {
        continue;
      }
      if let Some(release) = chosen.get(&root.name) {
        locked.push(LockedDependency {
          name: root.name.clone(),
          specifier: root.raw.clone(),
          version: Some(release.version.to_string()),
        });
      }
    }
    let gathered = gather(&roots, &chosen);
    for (name, release) in &chosen {
      if locked.iter().any(|l| &l.name == name) {
        continue;
      }
      let specifier = gathered
        .get(name)
        .and_then(|reqs| reqs.first())
        .map_or_else(|| name.clone(), |r| r.raw.clone());
      locked.push(LockedDependency {
        name: name.clone(),
        specifier,
        version: Some(release.version.to_string()),
      });
    }

    debug!(roots = roots.len(), pinned = locked.len(), "resolved dependencies against index");
    Ok(locked)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn index(src: &str) -> PackageIndex {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("index.toml");
    std::fs::write(&path, src).unwrap();
    PackageIndex::load(&path).unwrap()
  }

  fn resolve(index_src: &str, deps: &[&str]) -> Result<Vec<LockedDependency>, ResolveError> {
    let deps: Vec<String> = deps.iter().map(|s| s.to_string()).collect();
    IndexResolver::new(index(index_src)).resolve(&deps)
  }

  fn pins(locked: &[LockedDependency]) -> Vec<(String, String)> {
    locked
      .iter()
      .map(|l| (l.name.clone(), l.version.clone().unwrap_or_default()))
      .collect()
  }

  const INDEX: &str = r#"
[[package]]
name = "a"
version = "1.0"
dependencies = ["c<2"]

[[package]]
name = "a"
version = "2.0"
dependencies = ["c>=2"]

[[package]]
name = "b"
version = "1.0"
dependencies = ["c>=1.5"]

[[package]]
name = "c"
version = "1.0"

[[package]]
name = "c"
version = "1.8"

[[package]]
name = "c"
version = "2.1"
"#;

  #[test]
  fn picks_highest_satisfying_versions() {
    let locked = resolve(INDEX, &["a<2", "b"]).unwrap();

    assert_eq!(
      pins(&locked),
      vec![
        ("a".to_string(), "1.0".to_string()),
        ("b".to_string(), "1.0".to_string()),
        ("c".to_string(), "1.8".to_string()),
      ]
    );
    assert_eq!(locked[0].specifier, "a<2");
  }

  #[test]
  fn transitive_requirements_are_followed() {
    let locked = resolve(INDEX, &["a"]).unwrap();

    assert_eq!(
      pins(&locked),
      vec![("a".to_string(), "2.0".to_string()), ("c".to_string(), "2.1".to_string())]
    );
  }

  #[test]
  fn identical_inputs_resolve_identically() {
    let first = resolve(INDEX, &["b", "a<2"]).unwrap();
    let second = resolve(INDEX, &["b", "a<2"]).unwrap();

    assert_eq!(first, second);
  }

  #[test]
  fn conflict_names_every_constraint() {
    let err = resolve(INDEX, &["b", "c<1.5"]).unwrap_err();

    match err {
      ResolveError::Conflict { package, specifiers } => {
        assert_eq!(package, "c");
        assert_eq!(specifiers, vec!["c<1.5", "c>=1.5"]);
      }
      other => panic!("unexpected error: {}", other),
    }
  }

  #[test]
  fn lower_release_is_tried_when_highest_cannot_be_satisfied() {
    let index = r#"
[[package]]
name = "a"
version = "1.0"

[[package]]
name = "a"
version = "2.0"
dependencies = ["b<1"]

[[package]]
name = "b"
version = "1.5"
"#;

    let locked = resolve(index, &["a"]).unwrap();

    assert_eq!(pins(&locked), vec![("a".to_string(), "1.0".to_string())]);
  }

  #[test]
  fn later_dependency_undoes_an_earlier_choice() {
    // `a` is chosen before `z`, but only `a` 1.0 is compatible with `z`.
    let index = r#"
[[package]]
name = "a"
version = "1.0"

[[package]]
name = "a"
version = "2.0"

[[package]]
name = "z"
version = "1.0"
dependencies = ["a<2"]
"#;

    let locked = resolve(index, &["a", "z"]).unwrap();

    assert_eq!(
      pins(&locked),
      vec![("a".to_string(), "1.0".to_string()), ("z".to_string(), "1.0".to_string())]
    );
  }

  #[test]
  fn unknown_package_is_reported() {
    let err = resolve(INDEX, &["missing>=1"]).unwrap_err();

    assert!(matches!(err, ResolveError::UnknownPackage(name) if name == "missing"));
  }

  #[test]
  fn names_are_matched_normalized() {
    let locked = resolve("[[package]]\nname = \"Zope.Interface\"\nversion = \"5.0\"\n", &["zope_interface"]).unwrap();

    assert_eq!(locked[0].name, "zope-interface");
    assert_eq!(locked[0].version.as_deref(), Some("5.0"));
  }

  #[test]
  fn no_dependencies_resolve_to_nothing() {
    assert!(resolve(INDEX, &[]).unwrap().is_empty());
  }

  #[test]
  fn malformed_index_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("index.toml");
    std::fs::write(&path, "[[package]]\nname = 3\n").unwrap();

    assert!(matches!(PackageIndex::load(&path), Err(ResolveError::Index { .. })));
  }
}
