//! Shared auth configuration and state.

use super::session::SessionKey;

/// TTL for session tokens: 10 days, matching the frontend's login horizon.
const SESSION_TTL_SECONDS: i64 = 10 * 24 * 60 * 60;

/// TTL for verification and reset links: 10 minutes.
const EMAIL_TOKEN_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    email_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: SESSION_TTL_SECONDS,
            email_token_ttl_seconds: EMAIL_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub const fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }
}

/// Process-wide auth state attached to the router as an extension.
#[derive(Debug, Clone)]
pub struct AuthState {
    config: AuthConfig,
    session_key: SessionKey,
}

impl AuthState {
    #[must_use]
    pub const fn new(config: AuthConfig, session_key: SessionKey) -> Self {
        Self {
            config,
            session_key,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn session_key(&self) -> &SessionKey {
        &self.session_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AuthConfig::new("https://app.fiscus.dev".to_string());
        assert_eq!(config.frontend_base_url(), "https://app.fiscus.dev");
        assert_eq!(config.session_ttl_seconds(), 864_000);
        assert_eq!(config.email_token_ttl_seconds(), 600);
    }
}
