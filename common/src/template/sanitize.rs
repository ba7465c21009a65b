use regex::Regex;
use std::sync::OnceLock;

fn separators() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid separator pattern"))
}

/// Turn an arbitrary name into an alphanumeric CloudFormation logical ID
///
/// Every separated word gets capitalized: "chronas-api/{proxy+}" becomes "ChronasApiProxy"
pub fn logical_id(name: &str) -> String {
    let id = separators()
        .split(name)
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();

            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<String>();

    if id.is_empty() {
        "Root".into()
    } else {
        id
    }
}

/// Export names are unique per account and region, so they are prefixed with the stack name
pub fn export_name(stack: &str, id: &str) -> String {
    let stack = separators().replace_all(stack, "-");
    format!("{stack}:{}", logical_id(id))
}
