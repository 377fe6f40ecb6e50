// Smoke test against a running model service
//
// Triggers a test-mode train action and checks the service answers with a
// truthy completion signal.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::time::Duration;

use crate::server::TEST_MODE;

/// Strip everything but word characters, so `true\n` or `"true"` both read as `true`
pub fn completion_signal(body: &str) -> String {
    body.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Returns `Ok(())` iff POST /train in test mode reports completion
pub async fn run_smoke(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;

    let url = format!("{}/train", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&json!({ "mode": TEST_MODE }))
        .send()
        .await
        .with_context(|| format!("Service not reachable at {url}"))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read train response")?;

    let signal = completion_signal(&body);
    if !status.is_success() || signal != "true" {
        bail!("Train smoke test failed: status {status}, body {body:?}");
    }

    tracing::info!(%url, "Smoke test passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_signal_strips_punctuation() {
        assert_eq!(completion_signal("true\n"), "true");
        assert_eq!(completion_signal("\"true\""), "true");
        assert_eq!(completion_signal("[false]"), "false");
    }
}
