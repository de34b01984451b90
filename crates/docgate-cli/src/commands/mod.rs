//! CLI command handlers

pub mod ask;
pub mod audit;
pub mod import;
pub mod roles;
pub mod status;

use anyhow::Result;
use docgate_core::{Config, Database, QueryNormalizer, RoleResolver, RoleTable, Vocabulary};
use std::sync::Arc;

/// Role table from `config.roles`, or the built-in one
pub fn load_resolver(config: &Config) -> Result<RoleResolver> {
    let table = match config.roles {
        Some(ref path) => RoleTable::load(path)?,
        None => RoleTable::builtin()?,
    };
    Ok(RoleResolver::new(Arc::new(table)))
}

/// Query vocabulary from `config.query.vocabulary`, or the built-in one
pub fn load_normalizer(config: &Config) -> Result<QueryNormalizer> {
    let vocabulary = match config.query.vocabulary {
        Some(ref path) => Vocabulary::load(path)?,
        None => Vocabulary::builtin()?,
    };
    Ok(QueryNormalizer::new(vocabulary).with_max_variants(config.query.max_variants))
}

pub fn open_database(config: &Config) -> Result<Database> {
    let path = config.index.database_path();
    tracing::debug!("Opening index database at {}", path.display());
    Ok(Database::open_initialized(&path)?)
}
