use anyhow::{Context, Result};

use super::config_model::{
    AuthConfig, Database, DotEnvyConfig, MailerConfig, PaypalConfig, Server, StripeConfig,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("SERVER_PORT is invalid")?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is invalid")?,
    };

    let stripe = StripeConfig {
        secret_key: resolve_stripe_secret_key()?,
        webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
            .context("STRIPE_WEBHOOK_SECRET is invalid")?,
    };

    let paypal = PaypalConfig {
        client_id: std::env::var("PAYPAL_CLIENT_ID").context("PAYPAL_CLIENT_ID is invalid")?,
        client_secret: std::env::var("PAYPAL_CLIENT_SECRET")
            .context("PAYPAL_CLIENT_SECRET is invalid")?,
        webhook_id: std::env::var("PAYPAL_WEBHOOK_ID").context("PAYPAL_WEBHOOK_ID is invalid")?,
        api_base: std::env::var("PAYPAL_API_BASE")
            .unwrap_or_else(|_| "https://api-m.paypal.com".to_string()),
    };

    let auth = AuthConfig {
        jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET is invalid")?,
        token_ttl_seconds: std::env::var("JWT_TTL_SECONDS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .context("JWT_TTL_SECONDS is invalid")?,
    };

    let mailer = MailerConfig {
        api_base: std::env::var("MAILER_API_BASE").ok(),
        api_key: std::env::var("MAILER_API_KEY").ok(),
    };

    Ok(DotEnvyConfig {
        server,
        database,
        stripe,
        paypal,
        auth,
        mailer,
    })
}

/// Resolves which Stripe secret key this process uses.
///
/// A live key always wins over the platform-managed default key. Resolved once
/// at startup and injected into the card client, never read from a global.
pub fn resolve_stripe_secret_key() -> Result<String> {
    if let Ok(live_key) = std::env::var("STRIPE_SECRET_KEY_LIVE") {
        if !live_key.trim().is_empty() {
            return Ok(live_key);
        }
    }

    std::env::var("STRIPE_SECRET_KEY").context("no Stripe secret key configured")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Single test because the two cases share process-wide env vars.
    #[test]
    fn live_key_wins_and_blank_live_key_falls_back() {
        unsafe {
            env::set_var("STRIPE_SECRET_KEY_LIVE", "sk_live_abc");
            env::set_var("STRIPE_SECRET_KEY", "sk_test_def");
        }
        assert_eq!(resolve_stripe_secret_key().unwrap(), "sk_live_abc");

        unsafe {
            env::set_var("STRIPE_SECRET_KEY_LIVE", "  ");
        }
        assert_eq!(resolve_stripe_secret_key().unwrap(), "sk_test_def");
    }
}
