use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::scanner::RawMatch;

/// Reasons a call site cannot become an entity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity `{key}` has no namespace and none can be inferred")]
    MissingNamespace { key: String },
    #[error("entity `{key}` has an empty name")]
    EmptyName { key: String },
}

/// `Namespace.Name` address of an entity. The namespace may itself contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub namespace: String,
    pub name: String,
}

impl EntityKey {
    /// Split a full key on its last dot. Keys without a dot have no namespace.
    pub fn parse(full: &str) -> Option<Self> {
        let (namespace, name) = full.rsplit_once('.')?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Build a key from a raw call-site key, using `fallback` when the key has no dot.
    /// An explicit namespace in the key always wins over the fallback.
    pub fn resolve(raw_key: &str, fallback: Option<&str>) -> Result<Self, EntityError> {
        let (namespace, name) = match raw_key.rsplit_once('.') {
            Some((namespace, name)) => (namespace, name),
            None => match fallback {
                Some(fallback) => (fallback, raw_key),
                None => {
                    return Err(EntityError::MissingNamespace {
                        key: raw_key.to_string(),
                    })
                }
            },
        };
        if namespace.is_empty() {
            return Err(EntityError::MissingNamespace {
                key: raw_key.to_string(),
            });
        }
        if name.is_empty() {
            return Err(EntityError::EmptyName {
                key: raw_key.to_string(),
            });
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// A translatable string with its ordering hint and translator note.
///
/// `value` is stored ready for a single-quoted output literal. Field order
/// matters: records compare by value first, then priority, then comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityRecord {
    pub value: String,
    pub priority: Option<String>,
    pub comment: Option<String>,
}

impl EntityRecord {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            priority: None,
            comment: None,
        }
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Remove the wrapping quotes of a literal, returning the quote character used
fn unquote(literal: &str) -> (&str, Option<char>) {
    let mut chars = literal.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open), Some(close)) if open == close && (open == '\'' || open == '"') => {
            (&literal[1..literal.len() - 1], Some(open))
        }
        _ => (literal, None),
    }
}

/// Backslash-escape every single quote
pub fn escape_single_quotes(text: &str) -> String {
    text.replace('\'', "\\'")
}

/// Inverse of [`escape_single_quotes`]
pub fn unescape_single_quotes(text: &str) -> String {
    text.replace("\\'", "'")
}

fn normalize_priority(raw: &str) -> Option<String> {
    let token = raw.trim_start();
    let token = token.strip_prefix(',').unwrap_or(token);
    let token: String = token.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Turn one scanned call site into an entity.
///
/// `fallback_namespace` is the enclosing template's name for template call
/// sites and `None` for code.
pub fn normalize(
    raw: &RawMatch<'_>,
    fallback_namespace: Option<&str>,
) -> Result<(EntityKey, EntityRecord), EntityError> {
    let (full_key, _) = unquote(raw.key);
    let key = EntityKey::resolve(full_key, fallback_namespace)?;

    let (value, quote) = unquote(raw.value);
    // Single-quoted literals are already escaped for single-quoted output.
    let value = match quote {
        Some('"') => escape_single_quotes(value),
        _ => value.to_string(),
    };

    let priority = raw.priority.and_then(normalize_priority);
    let comment = raw.comment.map(|c| unquote(c).0.to_string());

    Ok((
        key,
        EntityRecord {
            value,
            priority,
            comment,
        },
    ))
}

/// Entities of one module (or one file), keyed by `Namespace.Name`.
/// Inserting an existing key replaces the earlier record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMap {
    entries: HashMap<String, EntityRecord>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns true when an existing, different record was replaced.
    pub fn insert(&mut self, key: impl Into<String>, record: EntityRecord) -> bool {
        match self.entries.insert(key.into(), record.clone()) {
            Some(previous) => previous != record,
            None => false,
        }
    }

    /// Union with `other`, whose records win on duplicate keys.
    /// Returns the number of keys whose record changed.
    pub fn merge(&mut self, other: EntityMap) -> usize {
        let mut overwritten = 0;
        for (key, record) in other.entries {
            if self.insert(key, record) {
                overwritten += 1;
            }
        }
        overwritten
    }

    pub fn get(&self, key: &str) -> Option<&EntityRecord> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EntityRecord)> {
        self.entries.iter()
    }

    /// Entries ordered by record (value, then priority, then comment), ties broken by key.
    pub fn sorted(&self) -> Vec<(&str, &EntityRecord)> {
        let mut entries: Vec<(&str, &EntityRecord)> = self
            .entries
            .iter()
            .map(|(key, record)| (key.as_str(), record))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

impl FromIterator<(String, EntityRecord)> for EntityMap {
    fn from_iter<I: IntoIterator<Item = (String, EntityRecord)>>(iter: I) -> Self {
        let mut map = EntityMap::new();
        for (key, record) in iter {
            map.insert(key, record);
        }
        map
    }
}

impl IntoIterator for EntityMap {
    type Item = (String, EntityRecord);
    type IntoIter = std::collections::hash_map::IntoIter<String, EntityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
