//! Environment configuration for the verifier server and for clients.

use crate::session::DEFAULT_TTL_MINUTES;
use crate::types::ObjectId;
use crate::verifier::{
    VerifierConfig, DEFAULT_APPROVE_FUNCTION, DEFAULT_MAX_TTL_MIN, DEFAULT_TOKEN_ISSUER,
};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

fn scope_from_env() -> Result<ObjectId, ConfigError> {
    required("PASSPORT_PACKAGE")?
        .parse()
        .map_err(|e: crate::types::IdParseError| ConfigError::Invalid {
            name: "PASSPORT_PACKAGE",
            reason: e.to_string(),
        })
}

fn approve_function_from_env() -> String {
    env::var("APPROVE_FUNCTION").unwrap_or_else(|_| DEFAULT_APPROVE_FUNCTION.to_string())
}

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub port: u16,
    /// PEM file holding the master secret. Absent means an ephemeral secret.
    pub key_path: Option<String>,
    pub chain_rpc_url: String,
    pub scope: ObjectId,
    pub approve_function: String,
    pub max_ttl_min: u16,
    pub token_issuer: String,
}

impl VerifierSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_ttl_min: u16 = parse("MAX_SESSION_TTL_MIN", &DEFAULT_MAX_TTL_MIN.to_string())?;
        if max_ttl_min == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_SESSION_TTL_MIN",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: parse("PORT", "8080")?,
            key_path: env::var("VERIFIER_KEY_PATH").ok(),
            chain_rpc_url: env::var("CHAIN_RPC_URL")
                .unwrap_or_else(|_| "ws://localhost:9944".to_string()),
            scope: scope_from_env()?,
            approve_function: approve_function_from_env(),
            max_ttl_min,
            token_issuer: env::var("TOKEN_ISSUER")
                .unwrap_or_else(|_| DEFAULT_TOKEN_ISSUER.to_string()),
        })
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            scope: self.scope,
            approve_function: self.approve_function.clone(),
            max_ttl_min: self.max_ttl_min,
            issuer: self.token_issuer.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub verifier_url: String,
    pub scope: ObjectId,
    /// Must match the verifier's `APPROVE_FUNCTION`.
    pub approve_function: String,
    pub ttl_minutes: u16,
}

impl ClientSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let ttl_minutes: u16 = parse("SESSION_TTL_MIN", &DEFAULT_TTL_MINUTES.to_string())?;
        if ttl_minutes == 0 {
            return Err(ConfigError::Invalid {
                name: "SESSION_TTL_MIN",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            verifier_url: env::var("VERIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            scope: scope_from_env()?,
            approve_function: approve_function_from_env(),
            ttl_minutes,
        })
    }

    pub fn context_config(&self) -> crate::session::ContextConfig {
        let mut config = crate::session::ContextConfig::new(self.scope);
        config.approve_function = self.approve_function.clone();
        config.ttl_minutes = self.ttl_minutes;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests share the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear() {
        for name in [
            "PORT",
            "VERIFIER_KEY_PATH",
            "CHAIN_RPC_URL",
            "PASSPORT_PACKAGE",
            "APPROVE_FUNCTION",
            "MAX_SESSION_TTL_MIN",
            "TOKEN_ISSUER",
            "VERIFIER_URL",
            "SESSION_TTL_MIN",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_verifier_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("PASSPORT_PACKAGE", "0x2");

        let settings = VerifierSettings::from_env().unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.key_path, None);
        assert_eq!(settings.chain_rpc_url, "ws://localhost:9944");
        assert_eq!(settings.scope, ObjectId::from_hex_literal("0x2").unwrap());
        assert_eq!(settings.approve_function, DEFAULT_APPROVE_FUNCTION);
        assert_eq!(settings.max_ttl_min, DEFAULT_MAX_TTL_MIN);
        assert_eq!(settings.verifier_config().issuer, DEFAULT_TOKEN_ISSUER);
        clear();
    }

    #[test]
    fn test_package_required() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        assert!(matches!(
            VerifierSettings::from_env(),
            Err(ConfigError::Missing("PASSPORT_PACKAGE"))
        ));
        assert!(matches!(
            ClientSettings::from_env(),
            Err(ConfigError::Missing("PASSPORT_PACKAGE"))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("PASSPORT_PACKAGE", "0x2");
        env::set_var("PORT", "not-a-port");
        assert!(matches!(
            VerifierSettings::from_env(),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));

        env::remove_var("PORT");
        env::set_var("MAX_SESSION_TTL_MIN", "0");
        assert!(VerifierSettings::from_env().is_err());

        env::set_var("SESSION_TTL_MIN", "0");
        assert!(ClientSettings::from_env().is_err());
        clear();
    }

    #[test]
    fn test_client_settings() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("PASSPORT_PACKAGE", "0xabc");
        env::set_var("VERIFIER_URL", "https://auth.example.org");
        env::set_var("SESSION_TTL_MIN", "5");

        let settings = ClientSettings::from_env().unwrap();
        assert_eq!(settings.verifier_url, "https://auth.example.org");
        assert_eq!(settings.context_config().ttl_minutes, 5);
        assert_eq!(
            settings.context_config().approve_function,
            DEFAULT_APPROVE_FUNCTION
        );
        clear();
    }

    #[test]
    fn test_approve_function_shared_by_both_sides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("PASSPORT_PACKAGE", "0xabc");
        env::set_var("APPROVE_FUNCTION", "arcade::approve_player");

        let server = VerifierSettings::from_env().unwrap().verifier_config();
        let client = ClientSettings::from_env().unwrap().context_config();
        assert_eq!(server.approve_function, "arcade::approve_player");
        assert_eq!(client.approve_function, server.approve_function);
        clear();
    }
}
