use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::OutputFormat;
use crate::entity::{
    escape_single_quotes, unescape_single_quotes, EntityError, EntityKey, EntityMap, EntityRecord,
};
use crate::fs::FileSystem;

/// Folder inside each module that holds the language tables
pub const LANG_DIR: &str = "lang";

/// Marker keeping the lang folder out of the framework's class manifest
pub const MANIFEST_EXCLUDE: &str = "_manifest_exclude";

const PHP_HEADER: &str = "<?php\n\nglobal $lang;\n\n";
const PHP_FOOTER: &str = "\n?>";

/// Pattern for one master table entry, either form:
/// `$lang['en_US']['Ns']['Name'] = 'value';`
/// `$lang['en_US']['Ns']['Name'] = array(\n\t'value',\n\tPRIO,\n\t'comment'\n);`
static PHP_ENTRY_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_php_entry_regex() -> &'static Regex {
    PHP_ENTRY_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?s)\$lang\['(?P<locale>[^']*)'\]\['(?P<ns>[^']*)'\]\['(?P<name>[^']*)'\]\s*=\s*(?:'(?P<value>(?:[^'\\]|\\.)*)'\s*;|array\(\s*'(?P<avalue>(?:[^'\\]|\\.)*)'\s*,\s*(?P<prio>[^\n]*?)\s*(?:,\s*'(?P<comment>(?:[^'\\]|\\.)*)'\s*)?\);)"#,
        )
        .expect("PHP_ENTRY_REGEX pattern is invalid - this is a bug")
    })
}

/// `<save>/<module>/lang`
pub fn lang_dir(save_path: &Path, module: &str) -> PathBuf {
    save_path.join(module).join(LANG_DIR)
}

/// `<save>/<module>/lang/<locale>.<ext>`
pub fn master_table_path(
    save_path: &Path,
    module: &str,
    locale: &str,
    format: OutputFormat,
) -> PathBuf {
    lang_dir(save_path, module).join(format!("{}.{}", locale, format.extension()))
}

/// One `$lang[...] = ...;` statement, with trailing newline
pub fn php_entry(locale: &str, key: &EntityKey, record: &EntityRecord) -> String {
    let mut php = format!(
        "$lang['{}']['{}']['{}'] = ",
        locale, key.namespace, key.name
    );
    let priority = record.priority.as_deref().map(escape_single_quotes);
    let comment = record.comment.as_deref().map(escape_single_quotes);

    if priority.is_none() && comment.is_none() {
        php.push_str(&format!("'{}';", record.value));
    } else {
        php.push_str(&format!(
            "array(\n\t'{}',\n\t{}",
            record.value,
            priority.as_deref().unwrap_or("null")
        ));
        if let Some(comment) = comment {
            php.push_str(&format!(",\n\t'{}'", comment));
        }
        php.push_str("\n);");
    }
    php.push('\n');
    php
}

/// Render a master table as PHP. Keys that cannot be split into namespace and
/// name are left out and returned alongside the output.
pub fn render_php(locale: &str, entities: &EntityMap) -> (String, Vec<EntityError>) {
    let mut body = String::new();
    let mut skipped = Vec::new();
    for (full_key, record) in entities.sorted() {
        match EntityKey::parse(full_key) {
            Some(key) => body.push_str(&php_entry(locale, &key, record)),
            None => skipped.push(EntityError::MissingNamespace {
                key: full_key.to_string(),
            }),
        }
    }
    (format!("{}{}{}", PHP_HEADER, body, PHP_FOOTER), skipped)
}

/// Render a master table as JSON:
/// `{ locale: { namespace: { name: value | [value, priority, comment] } } }`
pub fn render_json(locale: &str, entities: &EntityMap) -> Result<(String, Vec<EntityError>)> {
    let mut namespaces: Map<String, Value> = Map::new();
    let mut skipped = Vec::new();

    for (full_key, record) in entities.sorted() {
        let Some(key) = EntityKey::parse(full_key) else {
            skipped.push(EntityError::MissingNamespace {
                key: full_key.to_string(),
            });
            continue;
        };
        let value = unescape_single_quotes(&record.value);
        let entry = if record.priority.is_none() && record.comment.is_none() {
            Value::String(value)
        } else {
            let mut parts = vec![
                Value::String(value),
                record
                    .priority
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            ];
            if let Some(comment) = &record.comment {
                parts.push(Value::String(comment.clone()));
            }
            Value::Array(parts)
        };

        let namespace = namespaces
            .entry(key.namespace)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(names) = namespace {
            names.insert(key.name, entry);
        }
    }

    let mut root = Map::new();
    root.insert(locale.to_string(), Value::Object(namespaces));
    let json = serde_json::to_string_pretty(&Value::Object(root))?;
    Ok((format!("{}\n", json), skipped))
}

/// A master table that was written to disk
#[derive(Debug, Clone)]
pub struct WrittenTable {
    pub path: PathBuf,
    pub entries: usize,
    pub skipped: Vec<EntityError>,
}

/// Write a module's master table, creating `lang/` and its manifest-exclusion
/// marker when the folder does not exist yet.
pub fn write_master_table(
    fs: &dyn FileSystem,
    save_path: &Path,
    module: &str,
    locale: &str,
    format: OutputFormat,
    entities: &EntityMap,
) -> Result<WrittenTable> {
    let dir = lang_dir(save_path, module);
    if !fs.exists(&dir) {
        fs.create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        let marker = dir.join(MANIFEST_EXCLUDE);
        fs.touch(&marker)
            .with_context(|| format!("Failed to create {}", marker.display()))?;
    }

    let (contents, skipped) = match format {
        OutputFormat::Php => render_php(locale, entities),
        OutputFormat::Json => render_json(locale, entities)?,
    };

    let path = master_table_path(save_path, module, locale, format);
    fs.write(&path, &contents).with_context(|| {
        format!(
            "Cannot write language file! Please check permissions of {}",
            path.display()
        )
    })?;

    Ok(WrittenTable {
        path,
        entries: entities.len() - skipped.len(),
        skipped,
    })
}

/// Parse a generated master table back into entities
pub fn parse_master_table(content: &str, format: OutputFormat) -> Result<EntityMap> {
    match format {
        OutputFormat::Php => Ok(parse_php(content)),
        OutputFormat::Json => parse_json(content),
    }
}

/// Read and parse a master table from disk
pub fn read_master_table(
    fs: &dyn FileSystem,
    path: &Path,
    format: OutputFormat,
) -> Result<EntityMap> {
    let content = fs
        .read_to_string(path)
        .with_context(|| format!("Failed to read language file: {}", path.display()))?;
    parse_master_table(&content, format)
        .with_context(|| format!("Failed to parse language file: {}", path.display()))
}

fn parse_php(content: &str) -> EntityMap {
    let mut entities = EntityMap::new();
    for cap in get_php_entry_regex().captures_iter(content) {
        let (Some(ns), Some(name)) = (cap.name("ns"), cap.name("name")) else {
            continue;
        };
        let record = if let Some(value) = cap.name("value") {
            EntityRecord::new(value.as_str())
        } else {
            let value = cap.name("avalue").map(|m| m.as_str()).unwrap_or_default();
            EntityRecord {
                value: value.to_string(),
                priority: cap
                    .name("prio")
                    .map(|m| m.as_str().trim())
                    .filter(|p| !p.is_empty() && *p != "null")
                    .map(unescape_single_quotes),
                comment: cap
                    .name("comment")
                    .map(|m| unescape_single_quotes(m.as_str())),
            }
        };
        entities.insert(format!("{}.{}", ns.as_str(), name.as_str()), record);
    }
    entities
}

fn json_string(value: &Value, key: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => bail!("Expected a string for {}, found {}", key, other),
    }
}

fn parse_json(content: &str) -> Result<EntityMap> {
    let root: Map<String, Value> =
        serde_json::from_str(content).context("Master table is not a JSON object")?;
    let mut entities = EntityMap::new();

    for (_locale, namespaces) in root {
        let Value::Object(namespaces) = namespaces else {
            bail!("Expected an object of namespaces");
        };
        for (namespace, names) in namespaces {
            let Value::Object(names) = names else {
                bail!("Expected an object of entities in namespace {}", namespace);
            };
            for (name, entry) in names {
                let full_key = format!("{}.{}", namespace, name);
                let record = match &entry {
                    Value::String(value) => EntityRecord::new(escape_single_quotes(value)),
                    Value::Array(parts) => {
                        let value = match parts.first() {
                            Some(v) => json_string(v, &full_key)?,
                            None => bail!("Empty entry for {}", full_key),
                        };
                        EntityRecord {
                            value: escape_single_quotes(&value),
                            priority: match parts.get(1) {
                                None | Some(Value::Null) => None,
                                Some(p) => Some(json_string(p, &full_key)?),
                            },
                            comment: match parts.get(2) {
                                None | Some(Value::Null) => None,
                                Some(c) => Some(json_string(c, &full_key)?),
                            },
                        }
                    }
                    other => bail!("Unexpected entry for {}: {}", full_key, other),
                };
                entities.insert(full_key, record);
            }
        }
    }

    Ok(entities)
}
