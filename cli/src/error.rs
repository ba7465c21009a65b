/// User-facing error: a title and an optional hint shown dimmed below it
#[derive(Debug)]
pub struct Error(String, Option<String>);

impl Error {
    pub fn new(title: &str, hint: Option<&str>) -> Self {
        Error(title.to_string(), hint.map(String::from))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.1 {
            Some(hint) => write!(f, "{}\n\n{}", self.0, console::style(hint).dim()),
            None => write!(f, "{}", self.0),
        }
    }
}

impl std::error::Error for Error {}

/// Reports keep their outermost context as the title and the causes as the hint
impl From<eyre::ErrReport> for Error {
    fn from(report: eyre::ErrReport) -> Self {
        report.downcast::<Error>().unwrap_or_else(|report| {
            let causes = report
                .chain()
                .skip(1)
                .map(|cause| cause.to_string())
                .collect::<Vec<_>>();

            let hint = (!causes.is_empty()).then(|| causes.join("\n"));
            Error::new(&report.to_string(), hint.as_deref())
        })
    }
}
