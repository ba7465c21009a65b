use crate::stack::Stack;
use regex::Regex;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Any,
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Any => "ANY",
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// ANY catches every method of the path
    fn collides_with(&self, other: &HttpMethod) -> bool {
        self == other || *self == HttpMethod::Any || *other == HttpMethod::Any
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route registered on the shared HTTP API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// Stack the route resources live in
    pub stack: String,
    pub method: HttpMethod,
    pub path: String,
}

impl Route {
    /// API Gateway route key, e.g. "ANY /v1/{proxy+}"
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Greedy,
}

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    PATTERN.get_or_init(|| {
        Regex::new(r"^/$|^(/([A-Za-z0-9._~-]+|\{[A-Za-z_][A-Za-z0-9_]*\}))*(/\{[A-Za-z_][A-Za-z0-9_]*\+\})?$")
            .expect("valid route pattern")
    })
}

/// Check the path syntax, a greedy parameter may only close the path
pub fn validate_path(path: &str) -> eyre::Result<()> {
    if path.is_empty() || !path_pattern().is_match(path) {
        eyre::bail!("Invalid route path {path:?}");
    }

    Ok(())
}

fn segments(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment {
            s if s.starts_with('{') && s.ends_with("+}") => Segment::Greedy,
            s if s.starts_with('{') => Segment::Param,
            s => Segment::Literal(s.to_string()),
        })
        .collect()
}

/// Whether some concrete request path would match both patterns
fn overlaps(a: &[Segment], b: &[Segment]) -> bool {
    match (a.first(), b.first()) {
        (None, None) => true,
        (Some(Segment::Greedy), _) => !b.is_empty(),
        (_, Some(Segment::Greedy)) => !a.is_empty(),
        (None, _) | (_, None) => false,
        (Some(x), Some(y)) => {
            let heads_match = match (x, y) {
                (Segment::Literal(x), Segment::Literal(y)) => x == y,
                _ => true,
            };

            heads_match && overlaps(&a[1..], &b[1..])
        }
    }
}

/// Routes of one HTTP API, collected from every stack that registers on it
///
/// Handles are cloned into the stacks that add routes. The table is checked
/// during synthesis: two routes with the same method and path are an error,
/// while merely overlapping patterns are reported as warnings
#[derive(Clone, Debug)]
pub struct RouteTable {
    api: String,
    routes: Rc<RefCell<Vec<Route>>>,
}

impl RouteTable {
    /// Table of an API declared in `stack`, validated when the app is synthesized
    pub fn new(stack: &mut Stack, api: &str) -> Self {
        let table = Self {
            api: api.to_string(),
            routes: Rc::default(),
        };

        stack.attach_route_table(table.clone());
        table
    }

    pub fn record(&self, route: Route) -> eyre::Result<()> {
        validate_path(&route.path)?;
        self.routes.borrow_mut().push(route);
        Ok(())
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.borrow().clone()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        let routes = self.routes.borrow();

        for (index, route) in routes.iter().enumerate() {
            for other in routes.iter().skip(index + 1) {
                if !route.method.collides_with(&other.method) {
                    continue;
                }

                let (ours, theirs) = (segments(&route.path), segments(&other.path));

                if ours == theirs {
                    eyre::bail!(
                        "Route {} of {} in {} collides with {} in {}",
                        route.key(),
                        self.api,
                        route.stack,
                        other.key(),
                        other.stack,
                    );
                }

                if overlaps(&ours, &theirs) {
                    log::warn!(
                        "Route {} ({}) overlaps {} ({}) on {}, the most specific one wins",
                        route.key(),
                        route.stack,
                        other.key(),
                        other.stack,
                        self.api,
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackProps;

    fn table() -> RouteTable {
        let mut stack = Stack::new("ApiGatewayStack", StackProps::default());
        RouteTable::new(&mut stack, "ChronasApiGateway")
    }

    fn route(stack: &str, method: HttpMethod, path: &str) -> Route {
        Route {
            stack: stack.into(),
            method,
            path: path.into(),
        }
    }

    #[test]
    fn distinct_routes_pass() {
        let table = table();
        table.record(route("Compute", HttpMethod::Any, "/v1/{proxy+}")).unwrap();
        table.record(route("Compute", HttpMethod::Any, "/")).unwrap();
        table
            .record(route("Metadata", HttpMethod::Any, "/v1/metadata/links"))
            .unwrap();

        assert!(table.validate().is_ok());
        assert_eq!(table.routes().len(), 3);
    }

    #[test]
    fn duplicate_route_fails() {
        let table = table();
        table.record(route("Compute", HttpMethod::Any, "/v1/{proxy+}")).unwrap();
        table.record(route("Other", HttpMethod::Get, "/v1/{rest+}")).unwrap();

        assert!(table.validate().is_err());
    }

    #[test]
    fn different_methods_do_not_collide() {
        let table = table();
        table.record(route("A", HttpMethod::Get, "/v1/users")).unwrap();
        table.record(route("B", HttpMethod::Post, "/v1/users")).unwrap();

        assert!(table.validate().is_ok());
    }

    #[test]
    fn invalid_paths_are_rejected() {
        assert!(validate_path("/v1/{proxy+}/tail").is_err());
        assert!(validate_path("v1").is_err());
        assert!(validate_path("/v1/{id}/markers").is_ok());
    }

    #[test]
    fn overlap_detection() {
        let greedy = segments("/v1/{proxy+}");

        assert!(overlaps(&greedy, &segments("/v1/metadata/links")));
        assert!(!overlaps(&greedy, &segments("/")));
        assert!(!overlaps(&greedy, &segments("/v1")));
        assert!(!overlaps(&segments("/v1/a"), &segments("/v1/b")));
    }
}
