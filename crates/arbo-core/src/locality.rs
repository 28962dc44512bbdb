//! Localities and slug-based name resolution.
//!
//! Sources spell municipality names inconsistently (`Teófilo Otoni`,
//! `TEOFILO OTONI`, `teofilo_otoni`). All of them reduce to the same slug, and
//! the resolver maps a slug back to the canonical stored name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{Error, Result};

// ─── Slugs ───────────────────────────────────────────────────────────────────

/// Reduce a locality name to its matching key: NFKD decomposition, combining
/// marks stripped, lowercased, whitespace runs replaced by `_`.
pub fn slugify(name: &str) -> String {
  let stripped: String = name
    .nfkd()
    .filter(|c| !is_combining_mark(*c))
    .collect::<String>()
    .to_lowercase();
  stripped.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Tidy a raw locality string for display: trim, `_` to space, collapse
/// whitespace, title case.
pub fn display_name(raw: &str) -> String {
  raw
    .replace('_', " ")
    .split_whitespace()
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first
          .to_uppercase()
          .chain(chars.flat_map(char::to_lowercase))
          .collect::<String>(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

// ─── Locality ────────────────────────────────────────────────────────────────

/// A municipality known to the store.
///
/// The name and slug never change once created; only the optional metadata
/// may be filled in later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locality {
  /// Canonical display name, e.g. `Teófilo Otoni`.
  pub name:          String,
  pub slug:          String,
  /// External registry code (IBGE municipality code for Brazilian sources).
  pub external_code: Option<String>,
  pub lat:           Option<f64>,
  pub lon:           Option<f64>,
}

impl Locality {
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    Self {
      slug: slugify(&name),
      name,
      external_code: None,
      lat: None,
      lon: None,
    }
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// What to do when a candidate matches no stored locality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
  /// Return the candidate unchanged.
  #[default]
  Lenient,
  /// Fail with [`Error::LocalityNotFound`].
  Strict,
}

/// Maps loosely formatted locality strings onto canonical stored names.
#[derive(Debug, Clone, Default)]
pub struct LocalityResolver {
  by_slug: HashMap<String, String>,
  mode:    ResolveMode,
}

impl LocalityResolver {
  pub fn new<I, S>(canonical: I, mode: ResolveMode) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut resolver = Self { by_slug: HashMap::new(), mode };
    for name in canonical {
      resolver.register(name);
    }
    resolver
  }

  pub fn mode(&self) -> ResolveMode { self.mode }

  /// Add a canonical name. The first name registered for a slug wins.
  pub fn register(&mut self, name: impl Into<String>) {
    let name = name.into();
    self.by_slug.entry(slugify(&name)).or_insert(name);
  }

  /// The canonical name whose slug matches `candidate`, if any.
  pub fn lookup(&self, candidate: &str) -> Option<&str> {
    self.by_slug.get(&slugify(candidate)).map(String::as_str)
  }

  pub fn resolve(&self, candidate: &str) -> Result<String> {
    match (self.lookup(candidate), self.mode) {
      (Some(name), _) => Ok(name.to_string()),
      (None, ResolveMode::Lenient) => Ok(candidate.to_string()),
      (None, ResolveMode::Strict) => {
        Err(Error::LocalityNotFound(candidate.to_string()))
      }
    }
  }

  pub fn len(&self) -> usize { self.by_slug.len() }

  pub fn is_empty(&self) -> bool { self.by_slug.is_empty() }
}
