//! Template scanning with `<% include Name %>` expansion.
//!
//! Entities found in an included fragment use the fragment's file name as
//! their fallback namespace and are merged before the including template's
//! own call sites. An include that is already being expanded further up the
//! chain is skipped with a warning instead of recursing forever.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::entity::{self, EntityMap};
use crate::fs::{is_hidden_name, FileSystem};
use crate::scanner::CallSiteScanner;

/// Pattern for include directives.
/// Matches: `<% include Footer %>`, `<% include  Sidebar_2  %>`
/// Captures: Group 1 = the include name
static INCLUDE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_include_regex() -> &'static Regex {
    INCLUDE_REGEX.get_or_init(|| {
        Regex::new(r"<% include +([A-Za-z0-9_]+) +%>")
            .expect("INCLUDE_REGEX pattern is invalid - this is a bug")
    })
}

/// Names of all includes referenced by a template, in order of appearance
pub fn include_names(content: &str) -> Vec<&str> {
    get_include_regex()
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect()
}

/// Locates the file behind an include name
pub trait IncludeResolver {
    fn resolve_include(&self, name: &str, fs: &dyn FileSystem) -> Option<PathBuf>;
}

/// Looks for `<base>/<module>/<templates>/<includes>/<Name>.<ext>` across all
/// modules, trying modules in name order.
#[derive(Debug, Clone)]
pub struct ModuleIncludeResolver {
    pub base_path: PathBuf,
    pub templates_dir: String,
    pub includes_dir: String,
    pub extension: String,
}

impl ModuleIncludeResolver {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            base_path: config.base_path.clone(),
            templates_dir: config.templates_dir.clone(),
            includes_dir: config.includes_dir.clone(),
            extension: config.template_extension.clone(),
        }
    }
}

impl IncludeResolver for ModuleIncludeResolver {
    fn resolve_include(&self, name: &str, fs: &dyn FileSystem) -> Option<PathBuf> {
        let file_name = format!("{}.{}", name, self.extension);
        let modules = fs.read_dir(&self.base_path).ok()?;
        modules
            .into_iter()
            .filter(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !is_hidden_name(n))
                    .unwrap_or(false)
            })
            .map(|dir| {
                dir.join(&self.templates_dir)
                    .join(&self.includes_dir)
                    .join(&file_name)
            })
            .find(|candidate| fs.is_file(candidate))
    }
}

/// Entities collected from one scan root plus diagnostics
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub entities: EntityMap,
    /// Keys replaced by a later call site with a different record
    pub overwritten: usize,
    pub warnings: Vec<String>,
}

impl ScanOutcome {
    /// Fold a nested scan into this one; `other` wins on duplicate keys
    pub fn absorb(&mut self, other: ScanOutcome) {
        self.overwritten += other.overwritten;
        self.overwritten += self.entities.merge(other.entities);
        self.warnings.extend(other.warnings);
    }
}

/// Scan text for call sites, normalizing each against `fallback_namespace`
pub fn collect_call_sites(
    scanner: &CallSiteScanner,
    content: &str,
    fallback_namespace: Option<&str>,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    for raw in scanner.scan(content) {
        match entity::normalize(&raw, fallback_namespace) {
            Ok((key, record)) => {
                if outcome.entities.insert(key.to_string(), record) {
                    outcome.overwritten += 1;
                }
            }
            Err(err) => outcome.warnings.push(format!("Skipped {}", err)),
        }
    }
    outcome
}

/// Expands includes and scans templates
pub struct TemplateCollector<'a> {
    scanner: &'a CallSiteScanner,
    resolver: &'a dyn IncludeResolver,
    fs: &'a dyn FileSystem,
    extension: &'a str,
}

impl<'a> TemplateCollector<'a> {
    pub fn new(
        scanner: &'a CallSiteScanner,
        resolver: &'a dyn IncludeResolver,
        fs: &'a dyn FileSystem,
        extension: &'a str,
    ) -> Self {
        Self {
            scanner,
            resolver,
            fs,
            extension,
        }
    }

    /// Collect entities from a template and everything it includes.
    /// `namespace` is the fallback for keys without a dot; `path` identifies
    /// the template itself so it cannot be re-entered through its includes.
    pub fn collect(&self, content: &str, namespace: &str, path: Option<&Path>) -> ScanOutcome {
        let mut chain: Vec<PathBuf> = path.map(Path::to_path_buf).into_iter().collect();
        self.collect_nested(content, namespace, &mut chain)
    }

    fn collect_nested(
        &self,
        content: &str,
        namespace: &str,
        chain: &mut Vec<PathBuf>,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for include in include_names(content) {
            let Some(include_path) = self.resolver.resolve_include(include, self.fs) else {
                outcome
                    .warnings
                    .push(format!("Include '{}' could not be resolved", include));
                continue;
            };

            if chain.contains(&include_path) {
                outcome.warnings.push(format!(
                    "Include cycle through '{}' ({}), skipped",
                    include,
                    include_path.display()
                ));
                continue;
            }

            let include_content = match self.fs.read_lossy(&include_path) {
                Ok(content) => content,
                Err(e) => {
                    outcome.warnings.push(format!(
                        "Failed to read include {}: {}",
                        include_path.display(),
                        e
                    ));
                    continue;
                }
            };

            let include_namespace = format!("{}.{}", include, self.extension);
            chain.push(include_path);
            let nested = self.collect_nested(&include_content, &include_namespace, chain);
            chain.pop();
            outcome.absorb(nested);
        }

        outcome.absorb(collect_call_sites(self.scanner, content, Some(namespace)));
        outcome
    }
}
