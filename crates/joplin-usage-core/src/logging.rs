use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV_VAR: &str = "JOPLIN_USAGE_LOG";

/// Logs the elapsed time of a stage at trace level.
///
/// ```rust,ignore
/// let start = Instant::now();
/// // ... some work ...
/// trace_time!(start, "aggregate", notebooks = notebooks.len());
/// ```
#[macro_export]
macro_rules! trace_time {
    ($start:expr, $name:expr) => {
        tracing::trace!(elapsed = ?$start.elapsed(), $name);
    };
    ($start:expr, $name:expr $(, $field:ident = $value:expr)*) => {
        tracing::trace!(elapsed = ?$start.elapsed(), $($field = $value),*, $name);
    };
}

/// Installs the stderr subscriber. `JOPLIN_USAGE_LOG` wins over the flags.
pub fn init_tracing(
    verbose: bool,
    log_level: Option<&str>,
    log_json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

fn default_directive(verbose: bool, log_level: Option<&str>) -> String {
    match (verbose, log_level) {
        (_, Some(level)) if level.contains('=') => level.to_string(),
        (_, Some(level)) => format!("joplin_usage={level},joplin_usage_core={level}"),
        (true, None) => "joplin_usage=debug,joplin_usage_core=debug".to_string(),
        (false, None) => "joplin_usage=warn,joplin_usage_core=warn".to_string(),
    }
}

/// Hides the value of any `token` query parameter in a URL before logging it.
pub fn redact_token(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=***".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_follows_flags() {
        assert_eq!(
            default_directive(false, None),
            "joplin_usage=warn,joplin_usage_core=warn"
        );
        assert_eq!(
            default_directive(true, None),
            "joplin_usage=debug,joplin_usage_core=debug"
        );
        assert_eq!(
            default_directive(true, Some("trace")),
            "joplin_usage=trace,joplin_usage_core=trace"
        );
        assert_eq!(default_directive(false, Some("ureq=info")), "ureq=info");
    }

    #[test]
    fn redact_token_hides_only_the_token() {
        assert_eq!(
            redact_token("http://h/resources?page=2&token=abc&limit=100"),
            "http://h/resources?page=2&token=***&limit=100"
        );
        assert_eq!(redact_token("http://h/ping"), "http://h/ping");
    }
}
