//! Person lookup used to enrich escalated tickets with a display name.

use std::collections::HashMap;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub display_name: String,
    pub mail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn lookup(&self, login: &str) -> Result<Option<DirectoryEntry>, DirectoryError>;
}

/// Fixed login → entry table.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    entries: HashMap<String, DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, login: &str, display_name: &str, mail: Option<&str>) -> Self {
        self.entries.insert(
            login.to_owned(),
            DirectoryEntry { display_name: display_name.to_owned(), mail: mail.map(str::to_owned) },
        );
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn lookup(&self, login: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        Ok(self.entries.get(login).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lookup() {
        let dir = StaticDirectory::new().with_entry("jdoe", "Jane Doe", Some("jane@campus.example"));
        let entry = dir.lookup("jdoe").await.unwrap().unwrap();
        assert_eq!(entry.display_name, "Jane Doe");
        assert!(dir.lookup("nobody").await.unwrap().is_none());
    }
}
