//! Pluggable health checks.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use tokio::net::TcpStream;
use tracing::debug;

/// A boolean "is the target alive" check.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name recorded as the recovery detection method.
    fn name(&self) -> &str;

    async fn check(&self) -> bool;
}

/// HTTP GET that succeeds on any status in the accepted set.
///
/// Redirects are not followed so a `302` counts as "alive".
pub struct HttpHealthCheck {
    client: reqwest::Client,
    url: String,
    accepted: Vec<u16>,
}

impl HttpHealthCheck {
    pub fn new(
        url: impl Into<String>,
        accepted: Vec<u16>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            accepted,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    fn name(&self) -> &str {
        "http"
    }

    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let healthy = self.accepted.contains(&status);
                debug!(url = %self.url, status, healthy, "HTTP health check");
                healthy
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "HTTP health check failed");
                false
            }
        }
    }
}

/// TCP connect to `host:port`.
pub struct TcpHealthCheck {
    addr: String,
    connect_timeout: Duration,
}

impl TcpHealthCheck {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl HealthCheck for TcpHealthCheck {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn check(&self) -> bool {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "TCP health check failed");
                false
            }
            Err(_) => false,
        }
    }
}

/// Fresh connection plus `SELECT 1`.
///
/// A new connection per check, since a pool would hide an outage behind
/// already-open sessions.
pub struct DatabaseHealthCheck {
    options: MySqlConnectOptions,
}

impl DatabaseHealthCheck {
    pub fn new(options: MySqlConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl HealthCheck for DatabaseHealthCheck {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> bool {
        let mut conn = match MySqlConnection::connect_with(&self.options).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(error = %e, "Database connect failed");
                return false;
            }
        };
        let ok = sqlx::query("SELECT 1").execute(&mut conn).await.is_ok();
        let _ = conn.close().await;
        ok
    }
}

/// Wraps a synchronous closure. Mostly useful for tests and composition.
pub struct FnHealthCheck<F> {
    name: String,
    f: F,
}

impl<F> FnHealthCheck<F>
where
    F: Fn() -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> HealthCheck for FnHealthCheck<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> bool {
        (self.f)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_check_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let check = TcpHealthCheck::new(addr.clone(), Duration::from_secs(1));
        assert!(check.check().await);

        drop(listener);
        let check = TcpHealthCheck::new(addr, Duration::from_secs(1));
        assert!(!check.check().await);
    }

    #[tokio::test]
    async fn test_fn_check() {
        let check = FnHealthCheck::new("always", || true);
        assert_eq!(check.name(), "always");
        assert!(check.check().await);
    }

    #[tokio::test]
    async fn test_database_check_fails_when_unreachable() {
        let options = MySqlConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("root")
            .password("p@ss/w#rd");
        let check = DatabaseHealthCheck::new(options);
        assert_eq!(check.name(), "database");
        assert!(!check.check().await);
    }
}
