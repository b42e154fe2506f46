use std::net::SocketAddr;
use std::path::PathBuf;

use linkshelf_api::BillingConfig;

const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";
const DEFAULT_STRIPE_API: &str = "https://api.stripe.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} still holds the placeholder value")]
    Placeholder(&'static str),
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub billing: BillingConfig,
}

impl Config {
    /// Reads `LINKSHELF_*` and `STRIPE_*` variables. Stripe settings are
    /// optional; billing routes answer 500 without them.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("LINKSHELF_JWT_SECRET").ok_or(ConfigError::Missing("LINKSHELF_JWT_SECRET"))?;
        if jwt_secret == PLACEHOLDER_SECRET {
            return Err(ConfigError::Placeholder("LINKSHELF_JWT_SECRET"));
        }

        let host = get("LINKSHELF_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = get("LINKSHELF_PORT").unwrap_or_else(|| "3000".into());
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "LINKSHELF_HOST/LINKSHELF_PORT",
                value: format!("{}:{}", host, port),
            })?;

        let db_path = PathBuf::from(get("LINKSHELF_DB_PATH").unwrap_or_else(|| "linkshelf.db".into()));
        let public_url = get("LINKSHELF_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let billing = BillingConfig {
            secret_key: get("STRIPE_SECRET_KEY"),
            webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            price_monthly: get("STRIPE_PRICE_MONTHLY"),
            price_yearly: get("STRIPE_PRICE_YEARLY"),
            api_base: get("STRIPE_API_BASE")
                .unwrap_or_else(|| DEFAULT_STRIPE_API.into())
                .trim_end_matches('/')
                .to_string(),
            public_url,
        };

        Ok(Self {
            addr,
            db_path,
            jwt_secret,
            billing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[("LINKSHELF_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.db_path, PathBuf::from("linkshelf.db"));
        assert_eq!(config.billing.api_base, DEFAULT_STRIPE_API);
        assert_eq!(config.billing.public_url, "http://localhost:3000");
        assert!(config.billing.secret_key.is_none());
    }

    #[test]
    fn refuses_missing_or_placeholder_secret() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("LINKSHELF_JWT_SECRET", PLACEHOLDER_SECRET)])),
            Err(ConfigError::Placeholder(_))
        ));
    }

    #[test]
    fn rejects_bad_port() {
        let result = Config::from_lookup(lookup(&[
            ("LINKSHELF_JWT_SECRET", "x"),
            ("LINKSHELF_PORT", "http"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn trims_trailing_slashes() {
        let config = Config::from_lookup(lookup(&[
            ("LINKSHELF_JWT_SECRET", "x"),
            ("LINKSHELF_PUBLIC_URL", "https://linkshelf.app/"),
            ("STRIPE_API_BASE", "http://localhost:12111/"),
        ]))
        .unwrap();
        assert_eq!(config.billing.public_url, "https://linkshelf.app");
        assert_eq!(config.billing.api_base, "http://localhost:12111");
    }
}
