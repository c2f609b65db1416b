#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub stripe: StripeConfig,
    pub paypal: PaypalConfig,
    pub auth: AuthConfig,
    pub mailer: MailerConfig,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
}
