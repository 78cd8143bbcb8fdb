//! Database connection utilities.

use switchy_database::Database;
use switchy_database_connection::Credentials;

/// Creates a new database connection from the `PG_CONNECTION` environment
/// variable.
///
/// # Errors
///
/// Returns an error if `PG_CONNECTION` is not set or the connection fails.
pub async fn connect_from_env() -> Result<Box<dyn Database>, Box<dyn std::error::Error>> {
    let url = std::env::var("PG_CONNECTION")
        .map_err(|_| "PG_CONNECTION environment variable is not set")?;

    let creds = Credentials::from_url(&url)?;
    let db = switchy_database_connection::init_postgres_raw_native_tls(creds).await?;
    Ok(db)
}
