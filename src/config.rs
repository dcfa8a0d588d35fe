use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Shared secret for verifying payment-processor webhook signatures.
    /// Webhook delivery is rejected outright when this is unset.
    pub payment_webhook_secret: Option<String>,
    /// Resend API key for order-confirmation emails (None = emails disabled).
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KEYMINT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "keymint.db".to_string()),
            base_url,
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "orders@keymint.local".to_string()),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default tracing filter when RUST_LOG is unset; dev mode is chattier.
    pub fn default_log_filter(&self) -> &'static str {
        if self.dev_mode {
            "keymint=debug,tower_http=debug"
        } else {
            "keymint=info,tower_http=info"
        }
    }
}
