use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".lifeos"))
            .unwrap_or_else(|| PathBuf::from(".lifeos"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn database_file(&self) -> PathBuf {
        self.base.join("lifeos.db")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
