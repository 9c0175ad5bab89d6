//! Utility functions

use std::time::Duration;

/// Calculate linear backoff delay for bounded retry loops
pub fn calc_linear_backoff(step: Duration, attempt: u32) -> Duration {
    step * attempt
}

/// Strip the scheme and trailing slash from a site URL
pub fn clean_site_url(site_url: &str) -> String {
    site_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

/// Ensure an https:// scheme and a trailing slash on a site URL
pub fn ensure_https_base(site_url: &str) -> String {
    let mut url = if site_url.starts_with("https://") {
        site_url.to_string()
    } else {
        format!("https://{}", site_url)
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Compass component page URL for the given site
pub fn component_url(site_url: &str, slug: &str) -> String {
    format!("https://{}/compass/component/{}", clean_site_url(site_url), slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let step = Duration::from_secs(2);

        assert_eq!(calc_linear_backoff(step, 0), Duration::from_secs(0));
        assert_eq!(calc_linear_backoff(step, 1), Duration::from_secs(2));
        assert_eq!(calc_linear_backoff(step, 2), Duration::from_secs(4));
        assert_eq!(calc_linear_backoff(step, 3), Duration::from_secs(6));
    }

    #[test]
    fn test_clean_site_url() {
        assert_eq!(clean_site_url("https://example.atlassian.net/"), "example.atlassian.net");
        assert_eq!(clean_site_url("example.atlassian.net"), "example.atlassian.net");
    }

    #[test]
    fn test_ensure_https_base() {
        assert_eq!(ensure_https_base("example.atlassian.net"), "https://example.atlassian.net/");
        assert_eq!(ensure_https_base("https://example.atlassian.net/"), "https://example.atlassian.net/");
    }

    #[test]
    fn test_component_url() {
        assert_eq!(
            component_url("https://example.atlassian.net/", "my-app"),
            "https://example.atlassian.net/compass/component/my-app"
        );
    }
}
