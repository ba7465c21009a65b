use super::{Check, Suite, MESSAGES};
use eyre::{ContextCompat, WrapErr};
use serde::Serialize;
use std::collections::BTreeMap;

pub(crate) const RUNTIME_VERSION: &str = "syn-nodejs-puppeteer-6.2";
pub(crate) const HANDLER: &str = "index.handler";

const PLACEHOLDER: &str = "__DEFINITION__";

// Interprets the serialized suite the same way the local runner does
const SCRIPT: &str = r#"const synthetics = require('Synthetics');
const log = require('SyntheticsLogger');
const https = require('https');

const DEFINITION = __DEFINITION__;

const request = (suite, path) => new Promise((resolve, reject) => {
    const started = Date.now();
    const headers = { 'User-Agent': suite.user_agent };

    const req = https.request(DEFINITION.base_url.replace(/\/+$/, '') + path, { method: 'GET', headers }, (res) => {
        let body = '';
        res.on('data', (chunk) => { body += chunk; });
        res.on('end', () => resolve({ status: res.statusCode, body, elapsed: Date.now() - started }));
    });

    req.on('error', reject);
    req.setTimeout(suite.timeout_ms, () => {
        req.destroy();
        reject(new Error(suite.name + ': request to ' + path + ' timed out'));
    });
    req.end();
});

const json = (body) => {
    try {
        return { ok: true, value: JSON.parse(body) };
    } catch (e) {
        return { ok: false };
    }
};

const nonEmpty = (value) =>
    value !== null && (typeof value === 'object' || typeof value === 'string') && Object.keys(value).length > 0;

const evaluate = (check, response) => {
    switch (check.kind) {
        case 'status': return check.expected.includes(response.status);
        case 'response_time': return response.elapsed < check.max_ms;
        case 'within_sla': return response.elapsed <= check.max_ms;
        case 'json_field': {
            const parsed = json(response.body);
            return parsed.ok && parsed.value !== null && typeof parsed.value === 'object' && check.field in parsed.value;
        }
        case 'non_empty_json': {
            const parsed = json(response.body);
            return parsed.ok && nonEmpty(parsed.value);
        }
        case 'json_when_ok': return response.status !== 200 || json(response.body).ok;
        case 'no_server_error': return response.status < 500;
        default: throw new Error('Unknown check ' + check.kind);
    }
};

const fill = (template, values) => template.replace(/\{(\w+)\}/g, (_, name) => String(values[name]));

const failing = (steps, kind) =>
    steps.filter((step) => step.outcomes.some((outcome) => outcome.kind === kind && !outcome.passed)).length;

const verdict = (suite, steps) => {
    const outcomes = steps.flatMap((step) => step.outcomes);
    const total = outcomes.length;
    const failed = outcomes.filter((outcome) => !outcome.passed).length;
    const policy = suite.policy;
    const messages = DEFINITION.messages;

    log.info(suite.name + ': ' + (total - failed) + ' passed, ' + failed + ' failed');

    if (policy.kind === 'all_pass' && failed > 0) {
        throw new Error(fill(messages.checks_failed, { suite: suite.name, failed, total }));
    }

    if (policy.kind === 'journey') {
        const critical = steps.filter((step) => step.critical && step.outcomes.some((outcome) => !outcome.passed)).length;

        if (critical > 0) {
            throw new Error(fill(messages.critical_failed, { suite: suite.name, critical }));
        }

        if (failed > total * policy.max_failed_ratio) {
            throw new Error(fill(messages.too_many_failures, { suite: suite.name, failed, total }));
        }
    }

    if (policy.kind === 'performance') {
        const serverErrors = failing(steps, DEFINITION.kinds.server_error);

        if (serverErrors > 0) {
            throw new Error(fill(messages.server_errors, { suite: suite.name, count: serverErrors }));
        }

        const violations = failing(steps, DEFINITION.kinds.sla);

        if (violations > steps.length * policy.max_violation_ratio) {
            throw new Error(fill(messages.sla_exceeded, { suite: suite.name, count: violations, steps: steps.length }));
        }
    }
};

exports.handler = async () => {
    const suite = DEFINITION.suite;
    const steps = [];

    for (const step of suite.steps) {
        await synthetics.executeStep(step.name.replace(/\s+/g, '_'), async () => {
            const response = await request(suite, step.path);
            log.info(step.name + ' - Status: ' + response.status + ', Time: ' + response.elapsed + 'ms');

            const outcomes = step.checks.map((check) => ({ kind: check.kind, passed: evaluate(check, response) }));

            outcomes.forEach((outcome) => {
                if (outcome.passed) {
                    log.info('✓ ' + outcome.kind);
                } else {
                    log.error('✗ ' + outcome.kind);
                }
            });

            steps.push({ name: step.name, critical: step.critical, outcomes });
        });
    }

    verdict(suite, steps);
};
"#;

/// Check kinds the verdict counts failing steps by
#[derive(Debug, PartialEq, Serialize)]
struct Kinds {
    server_error: String,
    sla: String,
}

#[derive(Serialize)]
struct Definition<'a> {
    base_url: &'a str,
    suite: &'a Suite,
    messages: BTreeMap<&'static str, &'static str>,
    kinds: Kinds,
}

fn kind(check: &Check) -> eyre::Result<String> {
    serde_json::to_value(check)?["kind"]
        .as_str()
        .map(String::from)
        .wrap_err("Check is serialized without a kind")
}

/// Inline canary handler running `suite` against `base_url`
pub(crate) fn script(suite: &Suite, base_url: &str) -> eyre::Result<String> {
    let definition = Definition {
        base_url,
        suite,
        messages: MESSAGES.into_iter().collect(),
        kinds: Kinds {
            server_error: kind(&Check::NoServerError)?,
            sla: kind(&Check::WithinSla { max_ms: 0 })?,
        },
    };

    let definition = serde_json::to_string(&definition)
        .wrap_err_with(|| format!("Failed to serialize suite {}", suite.name))?;

    Ok(SCRIPT.replacen(PLACEHOLDER, &definition, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{message, suites, Policy};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    /// The JSON the script was rendered with
    fn definition(script: &str) -> Value {
        let start = script.find("const DEFINITION = ").unwrap() + "const DEFINITION = ".len();
        let end = start + script[start..].find(";\n").unwrap();
        serde_json::from_str(&script[start..end]).unwrap()
    }

    #[test]
    fn definition_is_embedded_once() {
        let suite = suites::all().remove(0);
        let script = script(&suite, "https://api.chronas.org").unwrap();

        assert!(!script.contains(PLACEHOLDER));
        assert!(script.contains(r#""base_url":"https://api.chronas.org""#));
        assert!(script.contains(r#""kind":"json_field","field":"version""#));
        assert_eq!(script.matches("chronas-health-version-check").count(), 1);
    }

    #[test]
    fn verdict_rules_come_from_the_definition() {
        let suite = suites::all()
            .into_iter()
            .find(|suite| matches!(suite.policy, Policy::Performance { .. }))
            .unwrap();

        let definition = definition(&script(&suite, "https://api.chronas.org").unwrap());

        assert_eq!(definition["suite"]["policy"], json!({"kind": "performance", "max_violation_ratio": 0.4}));
        assert_eq!(definition["kinds"], json!({"server_error": "no_server_error", "sla": "within_sla"}));

        for (key, template) in MESSAGES {
            assert_eq!(definition["messages"][key], template);
            assert!(!SCRIPT.contains(template.trim_start_matches("{suite}: ")));
        }

        // Thresholds and wording are not repeated in the handler
        for literal in ["0.4", "0.5", "5xx", "SLA"] {
            assert!(!SCRIPT.contains(literal), "{literal} is hardcoded in the canary");
        }
    }

    #[test]
    fn placeholders_are_filled_like_the_canary() {
        assert_eq!(
            message(
                "sla_exceeded",
                &[
                    ("suite", "chronas-performance-test".to_string()),
                    ("count", "3".to_string()),
                    ("steps", "6".to_string()),
                ]
            ),
            "chronas-performance-test: 3/6 endpoints exceeded their SLA"
        );
    }
}
