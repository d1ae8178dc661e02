use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::logging::LogLevel;

/// Name of the config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "text-collector.json";

/// Serialization format of the generated master tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `$lang['en_US']['Namespace']['Name'] = '...';` assignment table
    #[default]
    Php,
    /// `{ "en_US": { "Namespace": { "Name": "..." } } }`
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "php" => Some(Self::Php),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Php => "php",
            Self::Json => "json",
        }
    }
}

/// Configuration for text-collector
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory containing the modules to scan
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Directory under which `<module>/lang/` folders are written (defaults to `base_path`)
    #[serde(default)]
    pub save_path: Option<PathBuf>,

    /// Locale the master tables are written for (e.g., "en_US")
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Translation function name recognised in code and templates
    #[serde(default = "default_function")]
    pub function: String,

    /// File whose presence marks a directory as a module
    #[serde(default = "default_module_marker")]
    pub module_marker: String,

    /// Code subfolder of each module
    #[serde(default = "default_code_dir")]
    pub code_dir: String,

    /// Template subfolder of each module
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,

    /// Folder below a module's templates folder holding includable fragments
    #[serde(default = "default_includes_dir")]
    pub includes_dir: String,

    /// Module without a code folder that is scanned from its root
    #[serde(default = "default_framework_module")]
    pub framework_module: String,

    /// Suffix of code files
    #[serde(default = "default_code_extension")]
    pub code_extension: String,

    /// Suffix of template files
    #[serde(default = "default_template_extension")]
    pub template_extension: String,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Glob patterns, relative to a module folder, of files to skip
    #[serde(default)]
    pub ignore: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_function() -> String {
    "_t".to_string()
}

fn default_module_marker() -> String {
    "_config.php".to_string()
}

fn default_code_dir() -> String {
    "code".to_string()
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_includes_dir() -> String {
    "Includes".to_string()
}

fn default_framework_module() -> String {
    "sapphire".to_string()
}

fn default_code_extension() -> String {
    "php".to_string()
}

fn default_template_extension() -> String {
    "ss".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            save_path: None,
            default_locale: default_locale(),
            function: default_function(),
            module_marker: default_module_marker(),
            code_dir: default_code_dir(),
            templates_dir: default_templates_dir(),
            includes_dir: default_includes_dir(),
            framework_module: default_framework_module(),
            code_extension: default_code_extension(),
            template_extension: default_template_extension(),
            output_format: OutputFormat::default(),
            ignore: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json_string(json_str: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json_str)
            .with_context(|| "Failed to parse config JSON string")?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from default config file, or return default config
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Root under which output folders are created
    pub fn save_path(&self) -> &Path {
        self.save_path.as_deref().unwrap_or(&self.base_path)
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        Ok(self.log_level.parse::<LogLevel>()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.function.trim().is_empty() {
            bail!("`function` must not be empty");
        }
        if self.default_locale.trim().is_empty() {
            bail!("`defaultLocale` must not be empty");
        }
        if self.default_locale.contains(|c| matches!(c, '/' | '\\' | '\'')) {
            bail!("Invalid `defaultLocale`: {}", self.default_locale);
        }
        for pattern in &self.ignore {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid ignore glob pattern: {}", pattern))?;
        }
        self.log_level()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.function, "_t");
        assert_eq!(config.default_locale, "en_US");
        assert_eq!(config.output_format, OutputFormat::Php);
        assert_eq!(config.save_path(), Path::new("."));
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json_string(
            r#"{ "basePath": "site", "defaultLocale": "de_DE", "outputFormat": "json" }"#,
        )
        .unwrap();
        assert_eq!(config.base_path, PathBuf::from("site"));
        assert_eq!(config.save_path(), Path::new("site"));
        assert_eq!(config.default_locale, "de_DE");
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.templates_dir, "templates");
    }

    #[test]
    fn test_save_path_override() {
        let config =
            Config::from_json_string(r#"{ "basePath": "site", "savePath": "export" }"#).unwrap();
        assert_eq!(config.save_path(), Path::new("export"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_json_string(r#"{ "function": " " }"#).is_err());
        assert!(Config::from_json_string(r#"{ "defaultLocale": "../en" }"#).is_err());
        assert!(Config::from_json_string(r#"{ "ignore": ["[bad"] }"#).is_err());
        assert!(Config::from_json_string(r#"{ "logLevel": "loud" }"#).is_err());
        assert!(Config::from_json_string(r#"{ "outputFormat": "yaml" }"#).is_err());
    }
}
