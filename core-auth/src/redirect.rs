//! Where to send the user once the session has ended.

use std::fmt;
use url::form_urlencoded;
use url::Url;

/// Query flag telling the login screen why it is being shown.
pub const SESSION_EXPIRED_PARAM: &str = "sessionExpired";
/// Query parameter carrying the location to restore after signing in.
pub const RETURN_URL_PARAM: &str = "returnUrl";

/// Login-screen location built for a session-ended navigation.
///
/// ```
/// use core_auth::LoginRedirect;
///
/// let redirect = LoginRedirect::for_location("/login", "/documents/7?tab=history");
/// assert_eq!(
///     redirect.to_string(),
///     "/login?sessionExpired=true&returnUrl=%2Fdocuments%2F7%3Ftab%3Dhistory"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    login_path: String,
    return_url: Option<String>,
}

impl LoginRedirect {
    /// `current` is the location the user was on, either a path with an
    /// optional query or an absolute URL. The return URL is dropped when the
    /// user is already on the login screen.
    pub fn for_location(login_path: &str, current: &str) -> Self {
        let current = relative_location(current);
        let current_path = current.split(['?', '#']).next().unwrap_or_default();

        let return_url = if current.is_empty() || same_path(current_path, login_path) {
            None
        } else {
            Some(current)
        };

        Self {
            login_path: login_path.to_string(),
            return_url,
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn return_url(&self) -> Option<&str> {
        self.return_url.as_deref()
    }

    pub fn to_url(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair(SESSION_EXPIRED_PARAM, "true");
        if let Some(return_url) = &self.return_url {
            query.append_pair(RETURN_URL_PARAM, return_url);
        }
        format!("{}?{}", self.login_path, query.finish())
    }
}

impl fmt::Display for LoginRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

fn relative_location(current: &str) -> String {
    let current = current.trim();
    match Url::parse(current) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => current.split('#').next().unwrap_or_default().to_string(),
    }
}

fn same_path(a: &str, b: &str) -> bool {
    let a = a.trim_end_matches('/');
    let b = b.trim_end_matches('/');
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_url_is_encoded() {
        let redirect = LoginRedirect::for_location("/login", "/documents?folder=a b&page=2");

        assert_eq!(redirect.return_url(), Some("/documents?folder=a b&page=2"));
        assert_eq!(
            redirect.to_url(),
            "/login?sessionExpired=true&returnUrl=%2Fdocuments%3Ffolder%3Da+b%26page%3D2"
        );
    }

    #[test]
    fn test_on_login_screen_omits_return_url() {
        for current in ["/login", "/login/", "/login?sessionExpired=true"] {
            let redirect = LoginRedirect::for_location("/login", current);
            assert_eq!(redirect.return_url(), None, "{current}");
            assert_eq!(redirect.to_string(), "/login?sessionExpired=true");
        }
    }

    #[test]
    fn test_absolute_location_reduced_to_path_and_query() {
        let redirect =
            LoginRedirect::for_location("/auth/login", "https://app.example.com/settings?tab=team#members");

        assert_eq!(redirect.return_url(), Some("/settings?tab=team"));
        assert_eq!(redirect.login_path(), "/auth/login");
    }

    #[test]
    fn test_empty_location() {
        let redirect = LoginRedirect::for_location("/login", "");
        assert_eq!(redirect.to_url(), "/login?sessionExpired=true");
    }
}
