pub mod database;
pub mod rolls;
pub mod sheets;
pub mod stats;
pub mod submission;

use std::time::Duration;

const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

pub struct Config {
    /// How long a sheet form or retry prompt waits for the user.
    pub submission_timeout: Duration,
}

impl Config {
    /// Reads `SUBMISSION_TIMEOUT_SECS`, falling back to fifteen minutes.
    pub fn from_env() -> Result<Self, Error> {
        let submission_timeout = match std::env::var("SUBMISSION_TIMEOUT_SECS") {
            Ok(secs) => Duration::from_secs(secs.trim().parse().map_err(|e| {
                format!("'SUBMISSION_TIMEOUT_SECS' must be a number of seconds: {e}")
            })?),
            Err(_) => DEFAULT_SUBMISSION_TIMEOUT,
        };

        Ok(Config { submission_timeout })
    }
}

pub struct Data {
    pub config: Config,
    pub database: sqlx::PgPool,
    pub registry: stats::Registry,
    pub catalog: sheets::Catalog,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type ApplicationContext<'a> = poise::ApplicationContext<'a, Data, Error>;
