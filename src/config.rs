use serde::Deserialize;

/// Error verbosity of the response funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub public_url: String,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub reset_token_ttl_minutes: i64,
    pub email_from: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::parse(
            &std::env::var("APP_ENV").unwrap_or_else(|_| "production".into()),
        );
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tourbook".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "tourbook-users".into()),
            ttl_minutes: env_i64("JWT_TTL_MINUTES").unwrap_or(60 * 24 * 90),
            cookie_ttl_days: env_i64("JWT_COOKIE_TTL_DAYS").unwrap_or(90),
        };
        Ok(Self {
            environment,
            public_url: std::env::var("APP_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            jwt,
            reset_token_ttl_minutes: env_i64("RESET_TOKEN_TTL_MINUTES").unwrap_or(10),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Tourbook <hello@tourbook.local>".into()),
        })
    }

    /// Configuration used by tests and local tooling.
    pub fn for_tests(environment: Environment) -> Self {
        Self {
            environment,
            public_url: "http://localhost:8080".into(),
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                cookie_ttl_days: 1,
            },
            reset_token_ttl_minutes: 10,
            email_from: "Tourbook <test@tourbook.local>".into(),
        }
    }
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse::<i64>().ok())
}
