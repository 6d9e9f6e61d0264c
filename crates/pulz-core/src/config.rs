use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

const DEFAULT_COST_PER_1M_TOKENS_USD: f64 = 2.0;
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";

/// Engine-wide configuration resolved once at startup from environment variables.
/// Unlike `tandem-core`'s layered `ConfigStore`, this engine has no on-disk config
/// file to merge: the system it replaces configures itself purely from the
/// environment, so we follow that rather than carry the layered-file machinery.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub cost_per_1m_tokens_usd: CostTable,
    pub ollama_model: String,
    pub ollama_url: String,
    pub auth_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct CostTable {
    default_rate: f64,
    by_provider: HashMap<String, f64>,
}

impl CostTable {
    pub fn rate_for(&self, provider: &str) -> f64 {
        self.by_provider
            .get(provider)
            .copied()
            .unwrap_or(self.default_rate)
    }

    fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Number(n)) => Self {
                default_rate: n.as_f64().unwrap_or(DEFAULT_COST_PER_1M_TOKENS_USD),
                by_provider: HashMap::new(),
            },
            Ok(Value::Object(map)) => {
                let default_rate = map
                    .get("default")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_COST_PER_1M_TOKENS_USD);
                let by_provider = map
                    .into_iter()
                    .filter_map(|(k, v)| v.as_f64().map(|rate| (k, rate)))
                    .collect();
                Self {
                    default_rate,
                    by_provider,
                }
            }
            _ => Self::default(),
        }
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_COST_PER_1M_TOKENS_USD,
            by_provider: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("pulz")
            });

        let cost_per_1m_tokens_usd = std::env::var("COST_PER_1M_TOKENS_USD")
            .map(|raw| CostTable::parse(&raw))
            .unwrap_or_default();

        let ollama_model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        let ollama_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let auth_enabled = std::env::var("AUTH")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            data_dir,
            cost_per_1m_tokens_usd,
            ollama_model,
            ollama_url,
            auth_enabled,
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts").join("executions")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("engine.sqlite3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_table_parses_single_number() {
        let table = CostTable::parse("3.5");
        assert_eq!(table.rate_for("anything"), 3.5);
    }

    #[test]
    fn cost_table_parses_provider_map_with_default() {
        let table = CostTable::parse(r#"{"default": 2.0, "openai": 5.0}"#);
        assert_eq!(table.rate_for("openai"), 5.0);
        assert_eq!(table.rate_for("anthropic"), 2.0);
    }

    #[test]
    fn cost_table_falls_back_on_garbage() {
        let table = CostTable::parse("not json");
        assert_eq!(table.rate_for("x"), DEFAULT_COST_PER_1M_TOKENS_USD);
    }
}
