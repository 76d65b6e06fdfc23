//! Classification of API endpoints that must go out without a bearer token.

use url::Url;

/// Decides which requests skip bearer attachment and 401 recovery.
///
/// A request is unauthenticated when its URL path ends with one of the
/// configured paths, compared segment by segment. `/v1/auth/login` matches
/// `/auth/login`; `/auth/login-history` does not.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    unauthenticated: Vec<Vec<String>>,
}

impl EndpointPolicy {
    pub fn new<I, S>(unauthenticated_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unauthenticated = unauthenticated_paths
            .into_iter()
            .map(|path| segments(path.as_ref()))
            .filter(|segments| !segments.is_empty())
            .collect();
        Self { unauthenticated }
    }

    pub fn is_unauthenticated(&self, url: &str) -> bool {
        let path = segments(&request_path(url));
        self.unauthenticated
            .iter()
            .any(|suffix| path.ends_with(suffix))
    }

    pub fn requires_auth(&self, url: &str) -> bool {
        !self.is_unauthenticated(url)
    }
}

/// Path component of an absolute or relative URL, without query or fragment.
pub(crate) fn request_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect()
}
