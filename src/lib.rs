pub mod collector;
pub mod commands;
pub mod config;
pub mod entity;
pub mod fs;
pub mod lang_table;
pub mod logging;
pub mod scanner;
pub mod statics;
pub mod template;

pub use collector::{CollectError, CollectionReport, TextCollector};
pub use config::Config;
pub use entity::{EntityKey, EntityMap, EntityRecord};
pub use statics::{ProvidesTranslations, StaticsRegistry};
