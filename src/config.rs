use anyhow::{Context, Result};
use serde::Deserialize;

const DEALER_SITE: &str = "https://www.repentignychevrolet.com";

/// Environment-driven configuration.
///
/// Built once at startup and passed explicitly; nothing in the crate reads
/// the environment after this point. `DATABASE_URL` is the one required
/// value - without it the process exits non-zero before touching the store
/// or the network.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Path to the SQLite inventory database.
    pub database_url: String,

    #[serde(default = "default_inventory_url")]
    pub inventory_url: String,

    #[serde(default = "default_website_url")]
    pub website_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_inventory_url() -> String {
    format!("{DEALER_SITE}/en/used-inventory")
}

fn default_website_url() -> String {
    DEALER_SITE.into()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36".into()
}

impl Config {
    pub fn from_env() -> Result<Config> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>()
            .context("failed to load config (is DATABASE_URL set?)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_everything_but_database_url() {
        let config: Config =
            envy::from_iter(vec![("DATABASE_URL".to_string(), "inventory.db".to_string())])
                .unwrap();

        assert_eq!(config.database_url, "inventory.db");
        assert_eq!(
            config.inventory_url,
            "https://www.repentignychevrolet.com/en/used-inventory"
        );
        assert_eq!(config.website_url, "https://www.repentignychevrolet.com");
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_missing_database_url_is_an_error() {
        let result: Result<Config, _> = envy::from_iter(Vec::<(String, String)>::new());
        assert!(result.is_err());
    }
}
