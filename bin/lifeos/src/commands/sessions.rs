use lifeos_core::config::Config;
use lifeos_core::paths::Paths;
use lifeos_storage::Database;

/// List sessions without requiring a configured provider.
pub async fn run(user: Option<String>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let _config = Config::load_or_default(&paths)?;
    let db = Database::open(&paths.database_file())?;

    let sessions = db.list_sessions(user.as_deref())?;
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    for session in sessions {
        let messages = db.count_messages(&session.id)?;
        println!(
            "{}  user={}  agent={}  messages={}  updated={}",
            session.id,
            session.user_id.as_deref().unwrap_or("-"),
            session.agent_type.as_deref().unwrap_or("-"),
            messages,
            session.updated_at,
        );
    }
    Ok(())
}
