use super::{Check, Policy, Step, Suite};

const MONITOR: &str = "Chronas-Synthetic-Monitor";
const JOURNEY: &str = "Chronas-Journey-Monitor";
const PERFORMANCE: &str = "Chronas-Performance-Monitor";

const PROVINCES: &str = "/v1/metadata?type=g&f=provinces";
const CITIES_2000: &str = "/v1/metadata?type=g&f=cities&year=2000";
const SEARCH_ROME: &str = "/v1/metadata?search=rome&type=g&f=cities";
const AREAS_2000: &str = "/v1/areas/2000";
const MARKERS_CITIES: &str = "/v1/markers?year=2000&type=city";

fn step(name: &str, path: &str, checks: Vec<Check>) -> Step {
    Step {
        name: name.into(),
        path: path.into(),
        critical: false,
        checks,
    }
}

fn critical(step: Step) -> Step {
    Step { critical: true, ..step }
}

fn ok_within(max_ms: u64) -> Vec<Check> {
    vec![Check::status(&[200]), Check::ResponseTime { max_ms }]
}

fn found_within(max_ms: u64) -> Vec<Check> {
    vec![Check::status(&[200, 404]), Check::ResponseTime { max_ms }]
}

fn with(mut checks: Vec<Check>, check: Check) -> Vec<Check> {
    checks.push(check);
    checks
}

fn suite(name: &str, schedule_minutes: u32, timeout_ms: u64, user_agent: &str, policy: Policy, steps: Vec<Step>) -> Suite {
    Suite {
        name: name.into(),
        schedule_minutes,
        timeout_ms,
        user_agent: user_agent.into(),
        steps,
        policy,
    }
}

/// The suites deployed as canaries, in deployment order
pub(crate) fn all() -> Vec<Suite> {
    vec![
        suite(
            "chronas-health-version-check",
            5,
            10_000,
            MONITOR,
            Policy::AllPass,
            vec![
                step("Health Check", "/v1/health", ok_within(5000)),
                step(
                    "Version Check",
                    "/v1/version",
                    vec![
                        Check::status(&[200]),
                        Check::JsonField {
                            field: "version".into(),
                        },
                        Check::ResponseTime { max_ms: 5000 },
                    ],
                ),
            ],
        ),
        suite(
            "chronas-metadata-endpoints",
            10,
            10_000,
            MONITOR,
            Policy::AllPass,
            vec![
                step("Metadata Provinces", PROVINCES, with(ok_within(5000), Check::NonEmptyJson)),
                step("Metadata Cities", CITIES_2000, ok_within(5000)),
                step("Metadata Search", SEARCH_ROME, found_within(5000)),
            ],
        ),
        suite(
            "chronas-areas-markers",
            15,
            10_000,
            MONITOR,
            Policy::AllPass,
            vec![
                step("Areas 2000", AREAS_2000, with(found_within(8000), Check::JsonWhenOk)),
                step("Areas 1500", "/v1/areas/1500", found_within(8000)),
                step("Markers Cities", MARKERS_CITIES, found_within(5000)),
                step("Markers Search", "/v1/markers?search=rome&type=city", found_within(5000)),
            ],
        ),
        suite(
            "chronas-statistics-flags",
            20,
            10_000,
            MONITOR,
            Policy::AllPass,
            vec![
                step("Statistics Endpoint", "/v1/statistics", with(found_within(5000), Check::JsonWhenOk)),
                step("Flags Endpoint", "/v1/flags", found_within(5000)),
            ],
        ),
        suite(
            "chronas-user-journey",
            30,
            15_000,
            JOURNEY,
            Policy::Journey { max_failed_ratio: 0.5 },
            vec![
                critical(step("Health Check", "/v1/health", ok_within(3000))),
                critical(step("Load Provinces", PROVINCES, with(ok_within(5000), Check::NonEmptyJson))),
                step("Load Areas", AREAS_2000, found_within(10_000)),
                step("Load Markers", MARKERS_CITIES, found_within(8000)),
                step("Search Content", SEARCH_ROME, found_within(5000)),
                step(
                    "Discovery Content",
                    "/v1/metadata?year=2000&type=i&end=10&discover=artefacts",
                    found_within(5000),
                ),
            ],
        ),
        suite(
            "chronas-performance-test",
            60,
            15_000,
            PERFORMANCE,
            Policy::Performance { max_violation_ratio: 0.4 },
            [
                ("Health Check", "/v1/health", 1000),
                ("Version Check", "/v1/version", 1000),
                ("Metadata Provinces", PROVINCES, 5000),
                ("Areas 2000", AREAS_2000, 8000),
                ("Markers Cities", MARKERS_CITIES, 5000),
                ("Statistics", "/v1/statistics", 3000),
            ]
            .into_iter()
            .map(|(name, path, max_ms)| step(name, path, vec![Check::NoServerError, Check::WithinSla { max_ms }]))
            .collect(),
        ),
    ]
}

/// Suites by name, all of them when no name is given
pub(crate) fn select(names: &[String]) -> eyre::Result<Vec<Suite>> {
    let suites = all();

    if names.is_empty() {
        return Ok(suites);
    }

    names
        .iter()
        .map(|name| {
            suites
                .iter()
                .find(|suite| &suite.name == name)
                .cloned()
                .ok_or_else(|| eyre::eyre!("Unknown probe suite {name}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn six_suites_with_distinct_names() {
        let suites = all();
        let mut names = suites.iter().map(|suite| suite.name.clone()).collect::<Vec<_>>();
        names.sort();
        names.dedup();

        assert_eq!(names.len(), 6);
        assert_eq!(
            suites.iter().map(|suite| suite.schedule_minutes).collect::<Vec<_>>(),
            vec![5, 10, 15, 20, 30, 60]
        );
    }

    #[test]
    fn journey_has_two_critical_steps() {
        let journey = select(&["chronas-user-journey".into()]).unwrap().remove(0);
        let critical = journey.steps.iter().filter(|step| step.critical).count();

        assert_eq!(critical, 2);
        assert_eq!(journey.timeout_ms, 15_000);
        assert_eq!(journey.user_agent, "Chronas-Journey-Monitor");
    }

    #[test]
    fn unknown_suite() {
        assert!(select(&["chronas-nothing".into()]).is_err());
    }
}
