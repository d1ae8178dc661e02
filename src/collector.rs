use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::entity::EntityMap;
use crate::fs::{is_hidden_name, FileSystem, RealFileSystem};
use crate::lang_table;
use crate::logging;
use crate::scanner::CallSiteScanner;
use crate::statics::StaticsRegistry;
use crate::template::{
    collect_call_sites, IncludeResolver, ModuleIncludeResolver, ScanOutcome, TemplateCollector,
};

/// Failures that stop a module's master table from being written
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    #[error("cannot write language file for module '{module}' at {}: {message}", .path.display())]
    Write {
        module: String,
        path: PathBuf,
        message: String,
    },
}

/// Merged entities of one module
#[derive(Debug, Default)]
pub struct ModuleEntities {
    pub module: String,
    pub entities: EntityMap,
    /// Keys whose record was replaced by a later source
    pub overwritten: usize,
    pub warnings: usize,
    pub files_scanned: usize,
}

/// Outcome of one module in a collection run
#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub module: String,
    pub entities: usize,
    pub overwritten: usize,
    pub warnings: usize,
    pub files_scanned: usize,
    /// Written master table, if any
    pub output: Option<PathBuf>,
}

/// Result of a collection run
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub modules: Vec<ModuleReport>,
    pub warning_count: usize,
    pub errors: Vec<CollectError>,
}

impl CollectionReport {
    pub fn total_entities(&self) -> usize {
        self.modules.iter().map(|m| m.entities).sum()
    }

    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.modules.iter().filter_map(|m| m.output.as_deref())
    }
}

/// Walks modules, collects their entities and writes master tables
pub struct TextCollector<F: FileSystem = RealFileSystem> {
    config: Config,
    fs: F,
    scanner: CallSiteScanner,
    resolver: Box<dyn IncludeResolver>,
    statics: StaticsRegistry,
    ignore: Vec<Pattern>,
}

impl TextCollector<RealFileSystem> {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_fs(config, RealFileSystem)
    }
}

impl<F: FileSystem> TextCollector<F> {
    pub fn with_fs(config: Config, fs: F) -> Result<Self> {
        let scanner = CallSiteScanner::new(&config.function)?;
        let ignore = compile_ignore_patterns(&config.ignore)?;
        let resolver = Box::new(ModuleIncludeResolver::from_config(&config));
        Ok(Self {
            config,
            fs,
            scanner,
            resolver,
            statics: StaticsRegistry::new(),
            ignore,
        })
    }

    /// Replace the include lookup used for templates
    pub fn with_resolver(mut self, resolver: impl IncludeResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Add statically declared translations as an entity source
    pub fn with_statics(mut self, statics: StaticsRegistry) -> Self {
        self.statics = statics;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Collect every module (or only `module_filter`) and write one master
    /// table per module that yielded entities. Write failures are reported
    /// per module and do not stop the run.
    pub fn run(&self, module_filter: Option<&str>) -> Result<CollectionReport> {
        logging::info("Collecting text...");

        let mut report = CollectionReport::default();
        for module in self.modules(module_filter)? {
            let collected = self.process_module(&module);
            report.warning_count += collected.warnings;

            let mut module_report = ModuleReport {
                module: module.clone(),
                entities: collected.entities.len(),
                overwritten: collected.overwritten,
                warnings: collected.warnings,
                files_scanned: collected.files_scanned,
                output: None,
            };

            if collected.entities.is_empty() {
                logging::debug(&format!("No entities in module '{}'", module));
                report.modules.push(module_report);
                continue;
            }

            match self.write_module(&module, &collected.entities) {
                Ok(path) => module_report.output = Some(path),
                Err(err) => {
                    logging::error(&err.to_string());
                    report.errors.push(err);
                }
            }
            report.modules.push(module_report);
        }

        logging::info("Done!");
        Ok(report)
    }

    /// Module names to process, in name order
    pub fn modules(&self, module_filter: Option<&str>) -> Result<Vec<String>> {
        let candidates: Vec<String> = match module_filter {
            Some(filter) => Path::new(filter)
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| vec![n.to_string()])
                .unwrap_or_default(),
            None => self
                .fs
                .read_dir(&self.config.base_path)
                .with_context(|| {
                    format!(
                        "Failed to read base directory: {}",
                        self.config.base_path.display()
                    )
                })?
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .map(str::to_string)
                .collect(),
        };

        let mut modules = Vec::new();
        for name in candidates {
            if self.is_module(&name) {
                modules.push(name);
            } else if module_filter.is_some() {
                logging::warn(&format!(
                    "'{}' is not a module (missing {})",
                    name, self.config.module_marker
                ));
            }
        }
        Ok(modules)
    }

    /// A directory below the base path, not dot-prefixed, holding the module marker
    pub fn is_module(&self, name: &str) -> bool {
        let dir = self.config.base_path.join(name);
        !is_hidden_name(name)
            && self.fs.is_dir(&dir)
            && self.fs.is_file(&dir.join(&self.config.module_marker))
    }

    /// Build a module's entity map: code files, then static providers, then templates
    pub fn process_module(&self, module: &str) -> ModuleEntities {
        logging::info(&format!("Processing module '{}'", module));

        let module_dir = self.config.base_path.join(module);
        let mut collected = ModuleEntities {
            module: module.to_string(),
            ..ModuleEntities::default()
        };

        let code_dir = module_dir.join(&self.config.code_dir);
        let code_root = if self.fs.is_dir(&code_dir) {
            Some(code_dir)
        } else if module == self.config.framework_module {
            Some(module_dir.clone())
        } else {
            None
        };

        if let Some(root) = code_root {
            for path in self.files_with_extension(&root, &module_dir, &self.config.code_extension)
            {
                let Some(content) = self.read_source(&path, &mut collected) else {
                    continue;
                };
                let outcome = self.collect_from_code(&content);
                self.absorb(&mut collected, &path, outcome);
            }
        }

        let (statics, overwritten) = self.statics.collect(module);
        collected.overwritten += overwritten;
        collected.overwritten += collected.entities.merge(statics);

        let templates_dir = module_dir.join(&self.config.templates_dir);
        if self.fs.is_dir(&templates_dir) {
            for path in self.files_with_extension(
                &templates_dir,
                &module_dir,
                &self.config.template_extension,
            ) {
                let Some(content) = self.read_source(&path, &mut collected) else {
                    continue;
                };
                // Templates use their file name, suffix included, as namespace
                let namespace = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                let outcome = self.collect_from_template(&content, &namespace, Some(&path));
                self.absorb(&mut collected, &path, outcome);
            }
        }

        if collected.overwritten > 0 {
            logging::warn(&format!(
                "Module '{}': {} key(s) defined more than once with different values (last one kept)",
                module, collected.overwritten
            ));
        }

        collected
    }

    /// Entities from code; keys must carry their own namespace
    pub fn collect_from_code(&self, content: &str) -> ScanOutcome {
        collect_call_sites(&self.scanner, content, None)
    }

    /// Entities from a template and its includes; `namespace` backs bare keys
    pub fn collect_from_template(
        &self,
        content: &str,
        namespace: &str,
        path: Option<&Path>,
    ) -> ScanOutcome {
        TemplateCollector::new(
            &self.scanner,
            self.resolver.as_ref(),
            &self.fs,
            &self.config.template_extension,
        )
        .collect(content, namespace, path)
    }

    fn write_module(&self, module: &str, entities: &EntityMap) -> Result<PathBuf, CollectError> {
        let table = lang_table::write_master_table(
            &self.fs,
            self.config.save_path(),
            module,
            &self.config.default_locale,
            self.config.output_format,
            entities,
        )
        .map_err(|e| CollectError::Write {
            module: module.to_string(),
            path: lang_table::master_table_path(
                self.config.save_path(),
                module,
                &self.config.default_locale,
                self.config.output_format,
            ),
            message: format!("{:#}", e),
        })?;

        for skipped in &table.skipped {
            logging::warn(&format!("Module '{}': {}", module, skipped));
        }
        logging::info(&format!("Created file: {}", table.path.display()));
        Ok(table.path)
    }

    fn read_source(&self, path: &Path, collected: &mut ModuleEntities) -> Option<String> {
        match self.fs.read_lossy(path) {
            Ok(content) => {
                collected.files_scanned += 1;
                Some(content)
            }
            Err(e) => {
                collected.warnings += 1;
                logging::warn(&format!("Failed to read {}: {}", path.display(), e));
                None
            }
        }
    }

    fn absorb(&self, collected: &mut ModuleEntities, path: &Path, outcome: ScanOutcome) {
        for warning in &outcome.warnings {
            logging::warn(&format!("{}: {}", path.display(), warning));
        }
        collected.warnings += outcome.warnings.len();

        let replaced = outcome.overwritten + collected.entities.merge(outcome.entities);
        if replaced > 0 {
            logging::debug(&format!(
                "{}: {} key(s) overwritten",
                path.display(),
                replaced
            ));
        }
        collected.overwritten += replaced;
    }

    /// Files below `root` ending in `.<extension>`, minus ignored ones
    fn files_with_extension(&self, root: &Path, module_dir: &Path, extension: &str) -> Vec<PathBuf> {
        let files = match self.fs.walk_files(root) {
            Ok(files) => files,
            Err(e) => {
                logging::warn(&format!("Failed to list {}: {:#}", root.display(), e));
                return Vec::new();
            }
        };
        files
            .into_iter()
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
            .filter(|path| !self.is_ignored(path, module_dir))
            .collect()
    }

    fn is_ignored(&self, path: &Path, module_dir: &Path) -> bool {
        let relative = path.strip_prefix(module_dir).unwrap_or(path);
        self.ignore.iter().any(|p| p.matches_path(relative))
    }
}

fn compile_ignore_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    let mut compiled = Vec::new();
    for pattern in patterns {
        let matcher = Pattern::new(pattern)
            .with_context(|| format!("Invalid ignore glob pattern: {}", pattern))?;
        compiled.push(matcher);
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::entity::EntityRecord;
    use crate::fs::mock::InMemoryFileSystem;
    use pretty_assertions::assert_eq;

    fn config() -> Config {
        Config {
            base_path: PathBuf::from("site"),
            default_locale: "en".to_string(),
            ..Config::default()
        }
    }

    fn site() -> InMemoryFileSystem {
        let fs = InMemoryFileSystem::new();
        fs.add_file("site/MyModule/_config.php", "<?php");
        fs.add_file(
            "site/MyModule/code/Page.php",
            "<?php class Page { function t() { return _t('MyModule.TITLE', 'Title'); } }",
        );
        fs.add_file(
            "site/MyModule/templates/Layout.ss",
            "<h2><% _t('SUBTITLE', 'Sub') %></h2>",
        );
        fs
    }

    #[test]
    fn test_end_to_end_single_module() {
        let fs = site();
        let collector = TextCollector::with_fs(config(), fs.clone()).unwrap();

        let report = collector.run(None).unwrap();

        assert!(report.errors.is_empty());
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].entities, 2);

        let files = fs.get_files();
        let table = files
            .get(Path::new("site/MyModule/lang/en.php"))
            .expect("master table should be written");
        assert_eq!(
            table,
            "<?php\n\nglobal $lang;\n\n\
             $lang['en']['Layout.ss']['SUBTITLE'] = 'Sub';\n\
             $lang['en']['MyModule']['TITLE'] = 'Title';\n\
             \n?>"
        );
        assert!(files.contains_key(Path::new("site/MyModule/lang/_manifest_exclude")));
    }

    #[test]
    fn test_directory_without_marker_is_not_a_module() {
        let fs = site();
        fs.add_file("site/notamodule/code/A.php", "_t('X.Y', 'z')");
        fs.add_file("site/.hidden/_config.php", "");
        fs.add_file("site/.hidden/code/A.php", "_t('X.Y', 'z')");
        let collector = TextCollector::with_fs(config(), fs.clone()).unwrap();

        assert_eq!(collector.modules(None).unwrap(), vec!["MyModule"]);
        collector.run(None).unwrap();

        let files = fs.get_files();
        assert!(!files.keys().any(|p| p.starts_with("site/notamodule/lang")));
        assert!(!files.keys().any(|p| p.starts_with("site/.hidden/lang")));
    }

    #[test]
    fn test_module_filter() {
        let fs = site();
        fs.add_file("site/other/_config.php", "");
        fs.add_file("site/other/code/A.php", "_t('Other.KEY', 'v')");
        let collector = TextCollector::with_fs(config(), fs.clone()).unwrap();

        assert_eq!(
            collector.modules(Some("/abs/path/to/other")).unwrap(),
            vec!["other"]
        );
        assert!(collector.modules(Some("missing")).unwrap().is_empty());

        collector.run(Some("other")).unwrap();
        let files = fs.get_files();
        assert!(files.contains_key(Path::new("site/other/lang/en.php")));
        assert!(!files.contains_key(Path::new("site/MyModule/lang/en.php")));
    }

    #[test]
    fn test_framework_module_scanned_from_root() {
        let fs = InMemoryFileSystem::new();
        fs.add_file("site/sapphire/_config.php", "");
        fs.add_file("site/sapphire/core/Object.php", "_t('Object.NAME', 'Object')");
        fs.add_file("site/plain/_config.php", "");
        fs.add_file("site/plain/lib/Helper.php", "_t('Helper.NAME', 'Helper')");
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let framework = collector.process_module("sapphire");
        assert!(framework.entities.contains_key("Object.NAME"));

        let plain = collector.process_module("plain");
        assert!(plain.entities.is_empty());
    }

    #[test]
    fn test_only_code_extension_is_scanned_in_code_dir() {
        let fs = site();
        fs.add_file("site/MyModule/code/readme.txt", "_t('Readme.KEY', 'x')");
        fs.add_file("site/MyModule/code/deep/er/Form.php", "_t('Form.KEY', 'Form')");
        fs.add_file("site/MyModule/code/.svn/Old.php", "_t('Old.KEY', 'Old')");
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let collected = collector.process_module("MyModule");
        assert!(collected.entities.contains_key("Form.KEY"));
        assert!(!collected.entities.contains_key("Readme.KEY"));
        assert!(!collected.entities.contains_key("Old.KEY"));
    }

    #[test]
    fn test_invalid_code_entity_is_skipped() {
        let fs = site();
        fs.add_file(
            "site/MyModule/code/Bad.php",
            "_t('NONAMESPACE', 'x'); _t('Bad.OK', 'fine');",
        );
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let collected = collector.process_module("MyModule");
        assert_eq!(collected.warnings, 1);
        assert!(collected.entities.contains_key("Bad.OK"));
        assert!(!collected.entities.iter().any(|(k, _)| k.contains("NONAMESPACE")));
    }

    #[test]
    fn test_non_utf8_source_is_still_scanned() {
        let fs = site();
        fs.add_bytes(
            "site/MyModule/code/Legacy.php",
            b"<?php // caf\xe9\n_t('A.B', 'x');".to_vec(),
        );
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let collected = collector.process_module("MyModule");
        assert_eq!(collected.warnings, 0);
        assert_eq!(collected.entities.get("A.B"), Some(&EntityRecord::new("x")));
    }

    #[test]
    fn test_unreadable_folder_does_not_hide_siblings() {
        let fs = site();
        fs.add_file("site/MyModule/code/locked/Secret.php", "_t('Secret.KEY', 's')");
        fs.add_file("site/MyModule/code/Zebra.php", "_t('Zebra.KEY', 'z')");
        fs.deny_reads("site/MyModule/code/locked");
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let collected = collector.process_module("MyModule");
        assert!(collected.entities.contains_key("MyModule.TITLE"));
        assert!(collected.entities.contains_key("Zebra.KEY"));
        assert!(!collected.entities.contains_key("Secret.KEY"));
    }

    #[test]
    fn test_later_sources_win() {
        let fs = site();
        fs.add_file("site/MyModule/code/A.php", "_t('Shared.KEY', 'from A')");
        fs.add_file("site/MyModule/code/B.php", "_t('Shared.KEY', 'from B')");
        fs.add_file(
            "site/MyModule/templates/Z.ss",
            "<% _t('Shared.KEY', 'from template') %>",
        );
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let collected = collector.process_module("MyModule");
        assert_eq!(
            collected.entities.get("Shared.KEY"),
            Some(&EntityRecord::new("from template"))
        );
        assert_eq!(collected.overwritten, 2);
    }

    #[test]
    fn test_statics_merge_between_code_and_templates() {
        let fs = site();
        let mut statics = StaticsRegistry::new();
        statics.register("MyModule", || {
            let mut map = EntityMap::new();
            map.insert("MyModule.TITLE", EntityRecord::new("Static title"));
            map.insert("Page.SINGULARNAME", EntityRecord::new("Page"));
            map
        });
        let collector = TextCollector::with_fs(config(), fs)
            .unwrap()
            .with_statics(statics);

        let collected = collector.process_module("MyModule");
        assert_eq!(
            collected.entities.get("MyModule.TITLE"),
            Some(&EntityRecord::new("Static title"))
        );
        assert!(collected.entities.contains_key("Page.SINGULARNAME"));
        assert!(collected.entities.contains_key("Layout.ss.SUBTITLE"));
    }

    #[test]
    fn test_template_include_counted_once() {
        let fs = site();
        fs.add_file(
            "site/MyModule/templates/Includes/Foo.ss",
            "<% _t('FOO', 'Foo text') %>",
        );
        fs.add_file(
            "site/MyModule/templates/Page.ss",
            "<% include Foo %><% _t('BODY', 'Body') %>",
        );
        let collector = TextCollector::with_fs(config(), fs).unwrap();

        let outcome = collector.collect_from_template(
            "<% include Foo %><% _t('BODY', 'Body') %>",
            "Page.ss",
            None,
        );
        let foo: Vec<_> = outcome
            .entities
            .iter()
            .filter(|(k, _)| k.as_str() == "Foo.ss.FOO")
            .collect();
        assert_eq!(foo.len(), 1);
        assert!(outcome.entities.contains_key("Page.ss.BODY"));
    }

    #[test]
    fn test_ignore_patterns() {
        let fs = site();
        fs.add_file("site/MyModule/code/thirdparty/Lib.php", "_t('Lib.KEY', 'Lib')");
        let config = Config {
            ignore: vec!["code/thirdparty/**".to_string()],
            ..config()
        };
        let collector = TextCollector::with_fs(config, fs).unwrap();

        let collected = collector.process_module("MyModule");
        assert!(!collected.entities.contains_key("Lib.KEY"));
        assert!(collected.entities.contains_key("MyModule.TITLE"));
    }

    #[test]
    fn test_module_without_entities_writes_nothing() {
        let fs = InMemoryFileSystem::new();
        fs.add_file("site/empty/_config.php", "");
        fs.add_file("site/empty/code/A.php", "<?php echo 'no calls';");
        let collector = TextCollector::with_fs(config(), fs.clone()).unwrap();

        let report = collector.run(None).unwrap();
        assert_eq!(report.modules.len(), 1);
        assert!(report.modules[0].output.is_none());
        assert!(!fs.get_files().keys().any(|p| p.starts_with("site/empty/lang")));
    }

    #[test]
    fn test_write_failure_is_reported_and_run_continues() {
        let fs = site();
        fs.add_file("site/other/_config.php", "");
        fs.add_file("site/other/code/A.php", "_t('Other.KEY', 'v')");
        fs.deny_writes("out/MyModule");
        let config = Config {
            save_path: Some(PathBuf::from("out")),
            ..config()
        };
        let collector = TextCollector::with_fs(config, fs.clone()).unwrap();

        let report = collector.run(None).unwrap();

        assert_eq!(report.errors.len(), 1);
        let CollectError::Write { module, path, .. } = &report.errors[0];
        assert_eq!(module, "MyModule");
        assert_eq!(path, &PathBuf::from("out/MyModule/lang/en.php"));
        assert!(fs.get_files().contains_key(Path::new("out/other/lang/en.php")));
    }

    #[test]
    fn test_json_output_format() {
        let fs = site();
        let config = Config {
            output_format: OutputFormat::Json,
            ..config()
        };
        let collector = TextCollector::with_fs(config, fs.clone()).unwrap();
        collector.run(None).unwrap();

        let written = lang_table::read_master_table(
            &fs,
            Path::new("site/MyModule/lang/en.json"),
            OutputFormat::Json,
        )
        .unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            written.get("Layout.ss.SUBTITLE"),
            Some(&EntityRecord::new("Sub"))
        );
    }
}
