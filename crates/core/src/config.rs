use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::DeskError;

/// Help desk parameters. Loaded from the `deskloop_config` table at startup,
/// then overlaid with the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskCfg {
    // routing
    pub confidence_threshold: f64,
    pub top_k: usize,

    // collaborator calls
    pub adapter_timeout_secs: u64,

    // escalation
    pub title_max_chars: usize,
    pub dedup_open_tickets: bool,
    pub remote_sync_interval_secs: u64,

    // answer rendering
    pub generation_max_tokens: u32,
    pub generation_temperature: f32,
}

impl Default for DeskCfg {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            top_k: 4,
            adapter_timeout_secs: 10,
            title_max_chars: 100,
            dedup_open_tickets: true,
            remote_sync_interval_secs: 300,
            generation_max_tokens: 512,
            generation_temperature: 0.3,
        }
    }
}

impl DeskCfg {
    /// Load config from `deskloop_config`. If the table is empty, seed it with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM deskloop_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO deskloop_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Overlay `CONFIDENCE_THRESHOLD`, `TOP_K` and `ADAPTER_TIMEOUT` (seconds)
    /// from the process environment. Unparseable values are ignored.
    pub fn apply_env(self) -> Self {
        let env: HashMap<String, String> = ["CONFIDENCE_THRESHOLD", "TOP_K", "ADAPTER_TIMEOUT"]
            .iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v)))
            .collect();
        self.with_overrides(&env)
    }

    fn with_overrides(self, env: &HashMap<String, String>) -> Self {
        Self {
            confidence_threshold: get_or(env, "CONFIDENCE_THRESHOLD", self.confidence_threshold),
            top_k: get_or(env, "TOP_K", self.top_k),
            adapter_timeout_secs: get_or(env, "ADAPTER_TIMEOUT", self.adapter_timeout_secs),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), DeskError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DeskError::Validation(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.top_k < 1 {
            return Err(DeskError::Validation("top_k must be >= 1".into()));
        }
        if self.adapter_timeout_secs == 0 {
            return Err(DeskError::Validation("adapter_timeout_secs must be > 0".into()));
        }
        if self.title_max_chars == 0 {
            return Err(DeskError::Validation("title_max_chars must be > 0".into()));
        }
        Ok(())
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            confidence_threshold: get_or(m, "confidence_threshold", d.confidence_threshold),
            top_k: get_or(m, "top_k", d.top_k),
            adapter_timeout_secs: get_or(m, "adapter_timeout_secs", d.adapter_timeout_secs),
            title_max_chars: get_or(m, "title_max_chars", d.title_max_chars),
            dedup_open_tickets: get_or(m, "dedup_open_tickets", d.dedup_open_tickets),
            remote_sync_interval_secs: get_or(m, "remote_sync_interval_secs", d.remote_sync_interval_secs),
            generation_max_tokens: get_or(m, "generation_max_tokens", d.generation_max_tokens),
            generation_temperature: get_or(m, "generation_temperature", d.generation_temperature),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("confidence_threshold", self.confidence_threshold.to_string(), "Minimum local score answered without web fallback"),
            ("top_k", self.top_k.to_string(), "Candidates kept per routing decision"),
            ("adapter_timeout_secs", self.adapter_timeout_secs.to_string(), "Timeout for each collaborator call"),
            ("title_max_chars", self.title_max_chars.to_string(), "Ticket title length limit"),
            ("dedup_open_tickets", self.dedup_open_tickets.to_string(), "Reuse an open ticket for a repeated question"),
            ("remote_sync_interval_secs", self.remote_sync_interval_secs.to_string(), "Remote resolution polling interval"),
            ("generation_max_tokens", self.generation_max_tokens.to_string(), "Answer generation token limit"),
            ("generation_temperature", self.generation_temperature.to_string(), "Answer generation temperature"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
