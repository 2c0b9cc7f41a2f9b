use reqwest::{Client, ClientBuilder, Response};
use std::time::Duration;
use once_cell::sync::Lazy;
use crate::error::{AppError, Result};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

pub fn shared() -> Client {
    CLIENT.clone()
}

/// Passes 2xx responses through and turns anything else into a `FetchError`
/// carrying the status and body.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::FetchError(format!("HTTP {}: {}", status.as_u16(), body.trim())))
}
