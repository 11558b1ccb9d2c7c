pub mod chat;
pub mod serve;
pub mod sessions;

use std::sync::Arc;

use lifeos_core::config::Config;
use lifeos_core::paths::Paths;
use lifeos_orchestrator::Orchestrator;
use lifeos_providers::create_provider;
use lifeos_storage::Database;

/// Wire up the full pipeline from on-disk config. Shared by every command
/// that needs a working orchestrator.
pub fn build_orchestrator() -> anyhow::Result<(Config, Arc<Orchestrator>)> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let provider = create_provider(&config)?;
    let db = Database::open(&paths.database_file())?;
    let orchestrator = Arc::new(Orchestrator::new(db, provider, &config));
    Ok((config, orchestrator))
}
