//! Authorization header support for the transport link

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// Authentication attached to every request the link sends.
///
/// The generated `Authorization` header travels with the plain JSON request
/// and with every multipart upload the engine performs on the link's behalf,
/// so a background upload that outlives the caller stays authenticated.
///
/// # Examples
///
/// ```rust,no_run
/// use graphql_bg_upload::Auth;
///
/// let auth = Auth::bearer("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...");
/// assert!(auth.to_header_value().starts_with("Bearer "));
/// ```
#[derive(Debug, Clone)]
pub enum Auth {
    /// `Authorization: Basic <base64(username:password)>`
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// `Authorization: Bearer <token>`
    Bearer {
        /// Bearer token
        token: String,
    },
    /// `Authorization: <scheme> <credentials>`
    Custom {
        /// Authentication scheme (e.g. "ApiKey")
        scheme: String,
        /// Credentials for the scheme
        credentials: String,
    },
}

impl Auth {
    /// Create HTTP Basic authentication
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create Bearer token authentication
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Create authentication with a custom scheme
    pub fn custom(scheme: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self::Custom {
            scheme: scheme.into(),
            credentials: credentials.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn to_header_value(&self) -> String {
        match self {
            Auth::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                format!("Basic {}", encoded)
            }
            Auth::Bearer { token } => format!("Bearer {}", token),
            Auth::Custom {
                scheme,
                credentials,
            } => format!("{} {}", scheme, credentials),
        }
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => {
                write!(f, "Basic authentication for user: {}", username)
            }
            Auth::Bearer { .. } => write!(f, "Bearer token authentication"),
            Auth::Custom { scheme, .. } => write!(f, "Custom {} authentication", scheme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth() {
        let auth = Auth::basic("user", "pass");
        assert_eq!(auth.to_header_value(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_bearer_auth() {
        let auth = Auth::bearer("token123");
        assert_eq!(auth.to_header_value(), "Bearer token123");
    }

    #[test]
    fn test_custom_auth() {
        let auth = Auth::custom("ApiKey", "secret123");
        assert_eq!(auth.to_header_value(), "ApiKey secret123");
    }

    #[test]
    fn test_display_hides_secrets() {
        let auth = Auth::basic("john", "hunter2");
        assert!(!auth.to_string().contains("hunter2"));
    }
}
