//! Requirement and version parsing.
//!
//! Supports the common subset of dependency specifiers:
//! `name[extras] op version, op version ; marker` with operators
//! `==`, `!=`, `>=`, `<=`, `>`, `<`, `~=`, and `==X.*` / `!=X.*` prefix
//! wildcards. Versions are dotted numeric release segments; trailing zero
//! segments are insignificant (`1.0 == 1.0.0`). Extras and markers are kept
//! but play no part in matching.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ResolveError;

/// Normalize a project name: lowercase, with runs of `-`, `_` and `.`
/// collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut pending_sep = false;
  for c in name.trim().chars() {
    if matches!(c, '-' | '_' | '.') {
      pending_sep = true;
      continue;
    }
    if pending_sep && !out.is_empty() {
      out.push('-');
    }
    pending_sep = false;
    out.push(c.to_ascii_lowercase());
  }
  out
}

/// Split the leading project name off a specifier.
fn split_name(spec: &str) -> (&str, &str) {
  let end = spec
    .char_indices()
    .find(|&(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    .map_or(spec.len(), |(i, _)| i);
  spec.split_at(end)
}

/// The normalized project name a specifier refers to.
pub fn requirement_name(spec: &str) -> Result<String, ResolveError> {
  let (name, _) = split_name(spec.trim());
  if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
    return Err(ResolveError::InvalidRequirement {
      requirement: spec.to_string(),
      reason: "missing project name".to_string(),
    });
  }
  Ok(normalize_name(name))
}

/// A release version such as `1.2.0`.
#[derive(Debug, Clone)]
pub struct Version {
  raw: String,
  release: Vec<u64>,
}

impl Version {
  pub fn release(&self) -> &[u64] {
    &self.release
  }

  fn segment(&self, i: usize) -> u64 {
    self.release.get(i).copied().unwrap_or(0)
  }

  /// Whether the first `prefix.len()` segments equal `prefix`.
  fn has_prefix(&self, prefix: &[u64]) -> bool {
    prefix.iter().enumerate().all(|(i, p)| self.segment(i) == *p)
  }
}

impl FromStr for Version {
  type Err = ResolveError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let raw = s.trim();
    let release = raw
      .split('.')
      .map(|part| part.parse::<u64>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| ResolveError::InvalidVersion(s.to_string()))?;
    Ok(Self {
      raw: raw.to_string(),
      release,
    })
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    let len = self.release.len().max(other.release.len());
    (0..len)
      .map(|i| self.segment(i).cmp(&other.segment(i)))
      .find(|o| o.is_ne())
      .unwrap_or(Ordering::Equal)
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Version {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
  Equal,
  NotEqual,
  GreaterEqual,
  LessEqual,
  Greater,
  Less,
  Compatible,
}

impl Operator {
  // Longest tokens first so `>=` is not read as `>`.
  const TOKENS: [(&'static str, Operator); 7] = [
    ("~=", Operator::Compatible),
    ("==", Operator::Equal),
    ("!=", Operator::NotEqual),
    (">=", Operator::GreaterEqual),
    ("<=", Operator::LessEqual),
    (">", Operator::Greater),
    ("<", Operator::Less),
  ];
}

/// One `op version` constraint.
#[derive(Debug, Clone)]
pub struct Clause {
  pub op: Operator,
  pub version: Version,
  /// `==X.*` / `!=X.*`
  pub wildcard: bool,
}

impl Clause {
  pub fn matches(&self, candidate: &Version) -> bool {
    match self.op {
      Operator::Equal if self.wildcard => candidate.has_prefix(self.version.release()),
      Operator::NotEqual if self.wildcard => !candidate.has_prefix(self.version.release()),
      Operator::Equal => candidate == &self.version,
      Operator::NotEqual => candidate != &self.version,
      Operator::GreaterEqual => candidate >= &self.version,
      Operator::LessEqual => candidate <= &self.version,
      Operator::Greater => candidate > &self.version,
      Operator::Less => candidate < &self.version,
      Operator::Compatible => {
        let release = self.version.release();
        candidate >= &self.version && candidate.has_prefix(&release[..release.len() - 1])
      }
    }
  }

  fn parse(text: &str, requirement: &str) -> Result<Self, ResolveError> {
    let invalid = |reason: String| ResolveError::InvalidRequirement {
      requirement: requirement.to_string(),
      reason,
    };

    let text = text.trim();
    if text.starts_with("===") {
      return Err(invalid("arbitrary equality '===' is not supported".to_string()));
    }
    let (op, rest) = Operator::TOKENS
      .iter()
      .find_map(|(token, op)| text.strip_prefix(token).map(|rest| (*op, rest.trim())))
      .ok_or_else(|| invalid(format!("expected a comparison operator in '{}'", text)))?;

    let (version, wildcard) = match rest.strip_suffix(".*") {
      Some(prefix) if matches!(op, Operator::Equal | Operator::NotEqual) => (prefix, true),
      Some(_) => return Err(invalid(format!("wildcard not allowed in '{}'", text))),
      None => (rest, false),
    };
    let version: Version = version.parse()?;

    if op == Operator::Compatible && version.release().len() < 2 {
      return Err(invalid(format!("'~=' needs at least two version segments in '{}'", text)));
    }

    Ok(Self { op, version, wildcard })
  }
}

/// A parsed dependency specifier.
#[derive(Debug, Clone)]
pub struct Requirement {
  /// Normalized project name.
  pub name: String,
  /// The specifier as written.
  pub raw: String,
  pub extras: Vec<String>,
  pub clauses: Vec<Clause>,
  pub marker: Option<String>,
}

impl Requirement {
  pub fn parse(spec: &str) -> Result<Self, ResolveError> {
    let raw = spec.trim().to_string();
    let invalid = |reason: &str| ResolveError::InvalidRequirement {
      requirement: raw.clone(),
      reason: reason.to_string(),
    };

    let (body, marker) = match raw.split_once(';') {
      Some((body, marker)) => (body.trim(), Some(marker.trim().to_string()).filter(|m| !m.is_empty())),
      None => (raw.as_str(), None),
    };

    let name = requirement_name(body)?;
    let (_, mut rest) = split_name(body);
    rest = rest.trim_start();

    let mut extras = Vec::new();
    if let Some(after) = rest.strip_prefix('[') {
      let (list, tail) = after.split_once(']').ok_or_else(|| invalid("unclosed extras list"))?;
      extras = list
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect();
      rest = tail.trim_start();
    }

    if rest.starts_with('@') {
      return Err(invalid("direct references are not supported"));
    }
    if let Some(inner) = rest.strip_prefix('(') {
      rest = inner.strip_suffix(')').ok_or_else(|| invalid("unbalanced parentheses"))?;
    }

    let clauses = if rest.trim().is_empty() {
      Vec::new()
    } else {
      rest
        .split(',')
        .map(|clause| Clause::parse(clause, &raw))
        .collect::<Result<Vec<_>, _>>()?
    };

    Ok(Self {
      name,
      raw: raw.clone(),
      extras,
      clauses,
      marker,
    })
  }

  /// Whether `version` satisfies every clause.
  pub fn allows(&self, version: &Version) -> bool {
    self.clauses.iter().all(|c| c.matches(version))
  }
}

impl fmt::Display for Requirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}
