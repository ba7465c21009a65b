//! Synthetic probes of the public API
//!
//! A [`Suite`] is a list of GET requests with checks on each response and a
//! policy that turns the check outcomes into a verdict. The same definition is
//! run locally by [`runner`] and serialized into the deployed canaries by
//! [`canary`].

pub(crate) mod canary;
pub(crate) mod runner;
pub(crate) mod suites;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Check {
    Status { expected: Vec<u16> },

    /// Strictly faster than the limit
    ResponseTime { max_ms: u64 },

    /// Not slower than the limit
    WithinSla { max_ms: u64 },

    JsonField { field: String },
    NonEmptyJson,

    /// Body is JSON whenever the status is 200
    JsonWhenOk,

    NoServerError,
}

impl Check {
    pub(crate) fn status(expected: &[u16]) -> Self {
        Self::Status {
            expected: expected.to_vec(),
        }
    }

    pub(crate) fn name(&self) -> String {
        match self {
            Self::Status { expected } => format!(
                "Status code is {}",
                expected.iter().map(u16::to_string).collect::<Vec<_>>().join(" or ")
            ),
            Self::ResponseTime { .. } => "Response time is acceptable".into(),
            Self::WithinSla { max_ms } => format!("Within SLA of {max_ms}ms"),
            Self::JsonField { field } => format!("Response contains {field}"),
            Self::NonEmptyJson => "Response contains data".into(),
            Self::JsonWhenOk => "Response is valid JSON".into(),
            Self::NoServerError => "No server error".into(),
        }
    }

    pub(crate) fn evaluate(&self, response: &Response) -> bool {
        match self {
            Self::Status { expected } => expected.contains(&response.status),
            Self::ResponseTime { max_ms } => response.elapsed_ms < *max_ms,
            Self::WithinSla { max_ms } => response.elapsed_ms <= *max_ms,
            Self::JsonField { field } => response.json().is_some_and(|json| json.get(field).is_some()),
            Self::NonEmptyJson => response.json().is_some_and(|json| match json {
                serde_json::Value::Object(map) => !map.is_empty(),
                serde_json::Value::Array(items) => !items.is_empty(),
                serde_json::Value::String(text) => !text.is_empty(),
                _ => false,
            }),
            Self::JsonWhenOk => response.status != 200 || response.json().is_some(),
            Self::NoServerError => response.status < 500,
        }
    }
}

/// Verdict messages by key, `{name}` placeholders are filled from the report
///
/// The canary script gets the same table, so both report failures alike
pub(crate) const MESSAGES: [(&str, &str); 5] = [
    ("checks_failed", "{suite}: {failed} out of {total} checks failed"),
    ("critical_failed", "{suite}: {critical} critical steps failed"),
    ("too_many_failures", "{suite}: too many failures, {failed} out of {total} checks failed"),
    ("server_errors", "{suite}: {count} endpoints returned 5xx errors"),
    ("sla_exceeded", "{suite}: {count}/{steps} endpoints exceeded their SLA"),
];

pub(crate) fn message(key: &str, values: &[(&str, String)]) -> String {
    let template = MESSAGES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, template)| *template)
        .unwrap_or(key);

    values.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Policy {
    /// Every check passes
    AllPass,

    /// No critical step fails and at most the given share of checks fails
    Journey { max_failed_ratio: f64 },

    /// No server errors and at most the given share of steps misses its SLA
    Performance { max_violation_ratio: f64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Step {
    pub(crate) name: String,

    /// Path and query appended to the base URL
    pub(crate) path: String,

    #[serde(default)]
    pub(crate) critical: bool,

    pub(crate) checks: Vec<Check>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Suite {
    pub(crate) name: String,
    pub(crate) schedule_minutes: u32,
    pub(crate) timeout_ms: u64,
    pub(crate) user_agent: String,
    pub(crate) steps: Vec<Step>,
    pub(crate) policy: Policy,
}

impl Suite {
    /// Canary schedule, e.g. "rate(5 minutes)" or "rate(1 hour)"
    pub(crate) fn schedule_expression(&self) -> String {
        let minutes = self.schedule_minutes;

        match (minutes % 60, minutes / 60) {
            (0, 1) => "rate(1 hour)".into(),
            (0, hours) if hours > 1 => format!("rate({hours} hours)"),
            _ if minutes == 1 => "rate(1 minute)".into(),
            _ => format!("rate({minutes} minutes)"),
        }
    }
}

/// What a step observed
#[derive(Clone, Debug)]
pub(crate) struct Response {
    pub(crate) status: u16,
    pub(crate) body: String,
    pub(crate) elapsed_ms: u64,
}

impl Response {
    fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Outcome {
    pub(crate) check: Check,
    pub(crate) passed: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct StepReport {
    pub(crate) name: String,
    pub(crate) critical: bool,
    pub(crate) status: u16,
    pub(crate) elapsed_ms: u64,
    pub(crate) outcomes: Vec<Outcome>,
}

impl StepReport {
    pub(crate) fn new(step: &Step, response: &Response) -> Self {
        Self {
            name: step.name.clone(),
            critical: step.critical,
            status: response.status,
            elapsed_ms: response.elapsed_ms,
            outcomes: step
                .checks
                .iter()
                .map(|check| Outcome {
                    check: check.clone(),
                    passed: check.evaluate(response),
                })
                .collect(),
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.outcomes.iter().any(|outcome| !outcome.passed)
    }

    fn failed_check(&self, kind: fn(&Check) -> bool) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| kind(&outcome.check) && !outcome.passed)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SuiteReport {
    pub(crate) suite: String,
    pub(crate) steps: Vec<StepReport>,
}

impl SuiteReport {
    pub(crate) fn total(&self) -> usize {
        self.steps.iter().map(|step| step.outcomes.len()).sum()
    }

    pub(crate) fn failed(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|step| &step.outcomes)
            .filter(|outcome| !outcome.passed)
            .count()
    }

    /// Apply the suite policy, an error names the suite and what failed
    pub(crate) fn verdict(&self, policy: &Policy) -> eyre::Result<()> {
        let (suite, total, failed) = (&self.suite, self.total(), self.failed());
        let counts = || {
            vec![
                ("suite", suite.clone()),
                ("failed", failed.to_string()),
                ("total", total.to_string()),
            ]
        };

        match policy {
            Policy::AllPass => {
                if failed > 0 {
                    eyre::bail!(message("checks_failed", &counts()));
                }
            }

            Policy::Journey { max_failed_ratio } => {
                let critical = self.steps.iter().filter(|step| step.critical && step.failed()).count();

                if critical > 0 {
                    eyre::bail!(message(
                        "critical_failed",
                        &[("suite", suite.clone()), ("critical", critical.to_string())]
                    ));
                }

                if failed as f64 > total as f64 * max_failed_ratio {
                    eyre::bail!(message("too_many_failures", &counts()));
                }
            }

            Policy::Performance { max_violation_ratio } => {
                let server_errors = self
                    .steps
                    .iter()
                    .filter(|step| step.failed_check(|check| matches!(check, Check::NoServerError)))
                    .count();

                if server_errors > 0 {
                    eyre::bail!(message(
                        "server_errors",
                        &[("suite", suite.clone()), ("count", server_errors.to_string())]
                    ));
                }

                let violations = self
                    .steps
                    .iter()
                    .filter(|step| step.failed_check(|check| matches!(check, Check::WithinSla { .. })))
                    .count();

                if violations as f64 > self.steps.len() as f64 * max_violation_ratio {
                    eyre::bail!(message(
                        "sla_exceeded",
                        &[
                            ("suite", suite.clone()),
                            ("count", violations.to_string()),
                            ("steps", self.steps.len().to_string()),
                        ]
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(status: u16, body: &str, elapsed_ms: u64) -> Response {
        Response {
            status,
            body: body.into(),
            elapsed_ms,
        }
    }

    fn report(steps: Vec<(bool, Vec<Check>, Response)>) -> SuiteReport {
        SuiteReport {
            suite: "suite".into(),
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(index, (critical, checks, response))| {
                    let step = Step {
                        name: format!("step {index}"),
                        path: "/".into(),
                        critical,
                        checks,
                    };

                    StepReport::new(&step, &response)
                })
                .collect(),
        }
    }

    #[test]
    fn time_limits_differ_at_the_boundary() {
        let response = response(200, "", 1000);
        assert!(!Check::ResponseTime { max_ms: 1000 }.evaluate(&response));
        assert!(Check::WithinSla { max_ms: 1000 }.evaluate(&response));
    }

    #[test]
    fn json_checks() {
        assert!(Check::JsonField { field: "version".into() }.evaluate(&response(200, r#"{"version":null}"#, 0)));
        assert!(!Check::JsonField { field: "version".into() }.evaluate(&response(200, "<html>", 0)));
        assert!(!Check::NonEmptyJson.evaluate(&response(200, "{}", 0)));
        assert!(Check::NonEmptyJson.evaluate(&response(200, "[1]", 0)));
        assert!(Check::JsonWhenOk.evaluate(&response(404, "Not Found", 0)));
        assert!(!Check::JsonWhenOk.evaluate(&response(200, "Not JSON", 0)));
    }

    #[test]
    fn check_names() {
        assert_eq!(Check::status(&[200, 404]).name(), "Status code is 200 or 404");
        assert_eq!(Check::status(&[200]).name(), "Status code is 200");
    }

    #[test]
    fn journey_fails_on_critical_step() {
        let report = report(vec![
            (true, vec![Check::status(&[200])], response(503, "", 10)),
            (false, vec![Check::status(&[200]), Check::NoServerError], response(200, "", 10)),
        ]);

        let error = report.verdict(&Policy::Journey { max_failed_ratio: 0.5 }).unwrap_err();
        assert_eq!(error.to_string(), "suite: 1 critical steps failed");
    }

    #[test]
    fn journey_tolerates_some_failures() {
        let report = report(vec![
            (true, vec![Check::status(&[200])], response(200, "", 10)),
            (false, vec![Check::status(&[200])], response(404, "", 10)),
        ]);

        assert!(report.verdict(&Policy::Journey { max_failed_ratio: 0.5 }).is_ok());
        assert!(report.verdict(&Policy::AllPass).is_err());
    }

    #[test]
    fn performance_counts_steps() {
        let checks = || vec![Check::NoServerError, Check::WithinSla { max_ms: 100 }];
        let policy = Policy::Performance { max_violation_ratio: 0.4 };

        let slow = report(vec![
            (false, checks(), response(200, "", 500)),
            (false, checks(), response(200, "", 50)),
            (false, checks(), response(200, "", 50)),
        ]);
        assert!(slow.verdict(&policy).is_ok());

        let slower = report(vec![
            (false, checks(), response(200, "", 500)),
            (false, checks(), response(200, "", 500)),
            (false, checks(), response(200, "", 50)),
        ]);
        assert!(slower.verdict(&policy).is_err());

        let broken = report(vec![(false, checks(), response(502, "", 5))]);
        assert_eq!(
            broken.verdict(&policy).unwrap_err().to_string(),
            "suite: 1 endpoints returned 5xx errors"
        );
    }

    #[test]
    fn schedule_expressions() {
        let suite = |schedule_minutes| Suite {
            name: "suite".into(),
            schedule_minutes,
            timeout_ms: 1000,
            user_agent: "agent".into(),
            steps: vec![],
            policy: Policy::AllPass,
        };

        assert_eq!(suite(5).schedule_expression(), "rate(5 minutes)");
        assert_eq!(suite(60).schedule_expression(), "rate(1 hour)");
        assert_eq!(suite(120).schedule_expression(), "rate(2 hours)");
        assert_eq!(suite(1).schedule_expression(), "rate(1 minute)");
    }
}
