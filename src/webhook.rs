use tracing::info;

use crate::error::{AppError, Result};
use crate::http_client::shared;
use crate::models::SavedAnalysis;

/// POSTs the analysis as JSON to `url`. Not retried.
pub async fn send_analysis(url: &str, analysis: &SavedAnalysis) -> Result<()> {
    let response = shared()
        .post(url)
        .json(analysis)
        .send()
        .await
        .map_err(|e| AppError::FetchError(format!("Webhook request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::FetchError(format!(
            "Webhook responded with status {}",
            status.as_u16()
        )));
    }

    info!("Sent analysis {} to webhook", analysis.id);
    Ok(())
}
