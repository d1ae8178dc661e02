use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use text_collector::commands;
use text_collector::config::{Config, OutputFormat};
use text_collector::logging;

#[derive(Parser)]
#[command(name = "text-collector")]
#[command(author, version, about = "Collects translatable strings into per-module master tables", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect translatable strings and write the default-locale master tables
    Collect {
        /// Only process this module
        #[arg(short, long)]
        module: Option<String>,

        /// Directory containing the modules (overrides config)
        #[arg(long)]
        base: Option<PathBuf>,

        /// Directory the lang folders are written under (overrides config)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Locale of the generated tables (overrides config)
        #[arg(short, long)]
        locale: Option<String>,

        /// Output format: php or json (overrides config)
        #[arg(long)]
        format: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_ref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    match cli.command {
        Commands::Collect {
            module,
            base,
            save,
            locale,
            format,
        } => {
            if let Some(base) = base {
                config.base_path = base;
            }
            if let Some(save) = save {
                config.save_path = Some(save);
            }
            if let Some(locale) = locale {
                config.default_locale = locale;
            }
            if let Some(format) = format {
                config.output_format = OutputFormat::parse(&format)
                    .with_context(|| format!("Unknown output format: {}", format))?;
            }
            config.validate()?;
            logging::set_level(config.log_level()?);

            commands::collect::run(&config, module.as_deref())?;
        }
    }

    Ok(())
}
