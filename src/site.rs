/// Which role the current page plays in a transfer
use crate::config::{Config, SourceSite};

#[derive(Debug, Clone, PartialEq)]
pub enum PageRole<'a> {
    Source(&'a SourceSite),
    Destination,
    Unrelated,
}

/// Classify a page URL against the configured site tables. The destination
/// is checked first so a site listed on both sides acts as a destination.
pub fn classify<'a>(url: &str, config: &'a Config) -> PageRole<'a> {
    let hostname = match extract_hostname(url) {
        Some(hostname) => hostname,
        None => return PageRole::Unrelated,
    };

    if host_matches_any(&hostname, &config.destination.hosts) {
        return PageRole::Destination;
    }

    config
        .sources
        .iter()
        .find(|source| host_matches_any(&hostname, &source.hosts))
        .map(PageRole::Source)
        .unwrap_or(PageRole::Unrelated)
}

/// Extract the lowercase hostname from a URL string, with or without scheme
pub fn extract_hostname(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);

    // Get everything before the first '/', '?' or '#'
    let authority = without_scheme.split(['/', '?', '#']).next()?;
    // Drop credentials and port
    let host_port = authority.rsplit('@').next()?;
    let hostname = host_port.split(':').next()?.to_lowercase();

    if hostname.is_empty() {
        None
    } else {
        Some(hostname)
    }
}

/// Exact host or any subdomain of it
pub fn host_matches(hostname: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().trim_start_matches("*.").to_lowercase();
    if pattern.is_empty() {
        return false;
    }
    hostname == pattern
        || hostname
            .strip_suffix(&pattern)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn host_matches_any(hostname: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| host_matches(hostname, pattern))
}
