// 🌐 Extraction client - one request per fiscal year, issued concurrently
//
// Fetching is parallel, merging is not: callers feed the returned responses
// to the session one at a time. Failed years come back as errors so the
// caller can retry just those.

use crate::config::ExtractionConfig;
use crate::error::{ReconError, Result};
use crate::wire::ExtractionResponse;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ExtractionClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl ExtractionClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        ExtractionClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }

    /// Endpoint from config, bearer token from the configured env variable
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ReconError::Config("extraction.endpoint is not set".to_string()))?;
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            warn!(var = %config.token_env, "no bearer token in environment");
        }
        Ok(Self::new(endpoint, token))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn fetch_year(&self, year: i32) -> Result<ExtractionResponse> {
        let mut request = self.http.get(&self.endpoint).query(&[("year", year)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.json::<ExtractionResponse>().await?;
        debug!(year, rows = body.rows.len(), "fetched extraction batch");
        Ok(body)
    }

    /// Fetch all years concurrently. Results come back sorted by year, one
    /// per requested year; a task that dies reports its year as an error.
    pub async fn fetch_years(&self, years: &[i32]) -> Vec<(i32, Result<ExtractionResponse>)> {
        let mut tasks = JoinSet::new();
        for &year in years {
            let client = self.clone();
            tasks.spawn(async move { (year, client.fetch_year(year).await) });
        }

        collect_years(years, tasks).await
    }
}

type YearResult = (i32, Result<ExtractionResponse>);

async fn collect_years(years: &[i32], mut tasks: JoinSet<YearResult>) -> Vec<YearResult> {
    let mut pending = years.to_vec();
    let mut aborted = Vec::new();
    let mut results = Vec::with_capacity(years.len());

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((year, result)) => {
                if let Err(e) = &result {
                    warn!(year, error = %e, "extraction fetch failed");
                }
                if let Some(pos) = pending.iter().position(|&y| y == year) {
                    pending.swap_remove(pos);
                }
                results.push((year, result));
            }
            Err(e) => {
                warn!(error = %e, "fetch task aborted");
                aborted.push(e.to_string());
            }
        }
    }

    // JoinError does not carry the year; whatever never reported is the
    // set of years whose task died
    for year in pending {
        let reason = aborted.pop().unwrap_or_else(|| "task lost".to_string());
        results.push((year, Err(ReconError::FetchAborted { year, reason })));
    }

    results.sort_by_key(|(year, _)| *year);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_endpoint() {
        let err = ExtractionClient::from_config(&ExtractionConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ReconError::Config(_)));
    }

    #[test]
    fn test_from_config() {
        let config = ExtractionConfig {
            endpoint: Some("https://extract.example/projection/pl".to_string()),
            token_env: "RECON_TEST_TOKEN_THAT_IS_NOT_SET".to_string(),
        };
        let client = ExtractionClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "https://extract.example/projection/pl");
        assert!(client.token.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_years_are_reported() {
        // Port 9 (discard) on localhost: connection refused on test hosts
        let client = ExtractionClient::new("http://127.0.0.1:9/projection", None);
        let results = client.fetch_years(&[2024, 2023]).await;

        let years: Vec<i32> = results.iter().map(|(year, _)| *year).collect();
        assert_eq!(years, vec![2023, 2024]);
        assert!(results.iter().all(|(_, r)| r.is_err()));
    }

    async fn crashing_worker() -> YearResult {
        panic!("extraction worker crashed")
    }

    #[tokio::test]
    async fn test_panicked_task_reports_its_year() {
        let mut tasks: JoinSet<YearResult> = JoinSet::new();
        tasks.spawn(async { (2023, Ok(ExtractionResponse::default())) });
        tasks.spawn(crashing_worker());

        let results = collect_years(&[2023, 2024], tasks).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, 2024);
        assert!(matches!(results[1].1, Err(ReconError::FetchAborted { year: 2024, .. })));
    }
}
