use super::{Response, StepReport, Suite, SuiteReport};
use eyre::WrapErr;
use std::time::{Duration, Instant};

/// Run the suite's steps one after another against `base_url`
///
/// A step that gets no response at all fails the whole suite, check failures
/// are recorded in the report and judged by [`SuiteReport::verdict`]
pub(crate) async fn run(suite: &Suite, base_url: &str) -> eyre::Result<SuiteReport> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(suite.timeout_ms))
        .user_agent(&suite.user_agent)
        .build()
        .wrap_err("Failed to build HTTP client")?;

    let mut steps = Vec::new();

    for step in &suite.steps {
        let url = format!("{}{}", base_url.trim_end_matches('/'), step.path);
        log::info!("{}: GET {url}", suite.name);

        let started = Instant::now();

        let response = client
            .get(&url)
            .send()
            .await
            .wrap_err_with(|| format!("{}: request to {url} failed", suite.name))?;

        let status = response.status().as_u16();

        let body = response
            .text()
            .await
            .wrap_err_with(|| format!("{}: failed to read response of {url}", suite.name))?;

        let response = Response {
            status,
            body,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        log::debug!("{} - Status: {status}, Time: {}ms", step.name, response.elapsed_ms);
        steps.push(StepReport::new(step, &response));
    }

    Ok(SuiteReport {
        suite: suite.name.clone(),
        steps,
    })
}
