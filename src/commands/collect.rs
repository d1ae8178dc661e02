use anyhow::{bail, Result};

use crate::collector::TextCollector;
use crate::config::Config;

pub fn run(config: &Config, module: Option<&str>) -> Result<()> {
    println!("=== text-collector collect ===\n");

    println!("Configuration:");
    println!("  Base path: {}", config.base_path.display());
    println!("  Save path: {}", config.save_path().display());
    println!("  Default locale: {}", config.default_locale);
    println!("  Function: {}", config.function);
    println!("  Output format: {:?}", config.output_format);
    if let Some(module) = module {
        println!("  Module: {}", module);
    }
    println!();

    let collector = TextCollector::new(config.clone())?;
    let report = collector.run(module)?;

    if report.modules.is_empty() {
        println!("No modules found.");
        return Ok(());
    }

    println!("\nCollection Summary:");
    println!("{}", "-".repeat(60));
    for module in &report.modules {
        let output = module
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} {:>5} entities  {:>4} files  {}",
            module.module, module.entities, module.files_scanned, output
        );
        if module.overwritten > 0 {
            println!("  {:<24} {:>5} overwritten key(s)", "", module.overwritten);
        }
    }
    println!("{}", "-".repeat(60));
    println!("  Modules: {}", report.modules.len());
    println!("  Entities: {}", report.total_entities());
    if report.warning_count > 0 {
        println!("  Warnings: {}", report.warning_count);
    }

    if !report.errors.is_empty() {
        eprintln!("\nWrite errors:");
        for error in &report.errors {
            eprintln!("  {}", error);
        }
        bail!(
            "{} module(s) could not be written",
            report.errors.len()
        );
    }

    Ok(())
}
