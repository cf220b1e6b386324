use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `WAYMARK__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub plan: PlanConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Which ambiguity strategy a plan starts with. Custom resolver functions
/// cannot come from configuration and are attached in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterMode {
    None,
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanConfig {
    #[serde(default = "default_validate_before_route_condition")]
    pub validate_before_route_condition: bool,
    #[serde(default = "default_arbiter")]
    pub arbiter: ArbiterMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_store_key")]
    pub store_key: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_validate_before_route_condition() -> bool {
    true
}

fn default_arbiter() -> ArbiterMode {
    ArbiterMode::None
}

fn default_store_key() -> String {
    "journeyContextList".to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    100_000
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            validate_before_route_condition: default_validate_before_route_condition(),
            arbiter: default_arbiter(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_key: default_store_key(),
            ttl_secs: default_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plan: PlanConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("WAYMARK")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        if loaded.session.store_key.is_empty() {
            return Err(config::ConfigError::Message(
                "session.store_key must not be empty".to_string(),
            ));
        }
        tracing::debug!(
            arbiter = ?loaded.plan.arbiter,
            validate_before_route_condition = loaded.plan.validate_before_route_condition,
            "Loaded waymark configuration"
        );
        Ok(loaded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.plan.validate_before_route_condition);
        assert_eq!(config.plan.arbiter, ArbiterMode::None);
        assert_eq!(config.session.store_key, "journeyContextList");
        assert_eq!(config.session.ttl_secs, 3600);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AppConfig =
            serde_json::from_str(r#"{"plan": {"arbiter": "auto"}}"#).unwrap();
        assert_eq!(config.plan.arbiter, ArbiterMode::Auto);
        assert!(config.plan.validate_before_route_condition);
        assert_eq!(config.session.max_sessions, 100_000);
    }

    #[test]
    fn test_load_from_environment() {
        std::env::set_var("WAYMARK__PLAN__ARBITER", "auto");
        std::env::set_var("WAYMARK__PLAN__VALIDATE_BEFORE_ROUTE_CONDITION", "false");
        std::env::set_var("WAYMARK__SESSION__TTL_SECS", "60");

        let loaded = AppConfig::load();

        std::env::remove_var("WAYMARK__PLAN__ARBITER");
        std::env::remove_var("WAYMARK__PLAN__VALIDATE_BEFORE_ROUTE_CONDITION");
        std::env::remove_var("WAYMARK__SESSION__TTL_SECS");

        let config = loaded.unwrap();
        assert_eq!(config.plan.arbiter, ArbiterMode::Auto);
        assert!(!config.plan.validate_before_route_condition);
        assert_eq!(config.session.ttl_secs, 60);
        assert_eq!(config.session.store_key, "journeyContextList");
    }
}
