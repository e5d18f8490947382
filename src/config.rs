use std::env;

/// Value of `DATABASE_URL` that selects the in-process store (local mode only).
pub const MEMORY_DATABASE: &str = "memory";

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Immutable runtime configuration, loaded once at startup and shared through the
/// application state via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string, or `memory` in local mode.
    pub db_url: String,
    // Runtime environment marker. Controls the `x-user-id` bypass and log format.
    pub env: Env,
    // HS256 secret shared with the login flow that mints bearer tokens.
    pub jwt_secret: String,
    // Where unauthenticated callers are redirected; `?next=` is appended.
    pub login_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
}

/// Env
///
/// Distinguishes development conveniences (identity bypass, pretty logs, in-memory
/// store) from hardened production behavior.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for tests: local mode, in-memory store.
    fn default() -> Self {
        Self {
            db_url: MEMORY_DATABASE.to_string(),
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            login_url: "/login/".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            max_connections: 5,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the environment.
    ///
    /// # Panics
    /// Fails fast when `DATABASE_URL` is missing, or when `JWT_SECRET` is missing in
    /// production, or when `DB_MAX_CONNECTIONS` is not a number.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        // The production secret is mandatory; local falls back to a known dev value.
        let jwt_secret = match env {
            Env::Production => {
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production.")
            }
            Env::Local => env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
        };

        let db_url = env::var("DATABASE_URL").expect("FATAL: DATABASE_URL must be set.");
        if env == Env::Production && db_url == MEMORY_DATABASE {
            panic!("FATAL: the in-memory store is not available in production.");
        }

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .map(|raw| {
                raw.parse()
                    .expect("FATAL: DB_MAX_CONNECTIONS must be a positive integer.")
            })
            .unwrap_or(5);

        Self {
            db_url,
            env,
            jwt_secret,
            login_url: env::var("LOGIN_URL").unwrap_or_else(|_| "/login/".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            max_connections,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.env == Env::Local && self.db_url == MEMORY_DATABASE
    }
}
