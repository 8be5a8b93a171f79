//! Authentication for index and registry requests.
//!
//! The index speaks HTTP Basic; standalone registries accept the session
//! token the index hands out. Both are represented as [`Credentials`] and
//! rendered into `Authorization` header values.


/// Credentials attached to registry traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No authentication (anonymous access).
    Anonymous,

    /// HTTP Basic authentication with username and password.
    Basic {
        /// Username for authentication.
        username: String,
        /// Password for authentication.
        password: String,
    },

    /// A session token issued by the index.
    Token {
        /// The opaque token value.
        token: String,
    },
}

impl Credentials {
    /// Creates anonymous credentials.
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Creates Basic authentication credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::auth::Credentials;
    ///
    /// let creds = Credentials::basic("username", "password");
    /// assert!(creds.to_header_value().unwrap().starts_with("Basic "));
    /// ```
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates token credentials from an index-issued session token.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
        }
    }

    /// Returns the Authorization header value for these credentials.
    pub fn to_header_value(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { username, password } => {
                use base64::{Engine as _, engine::general_purpose};
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials);
                Some(format!("Basic {}", encoded))
            }
            Self::Token { token } => Some(format!("Token {}", token)),
        }
    }
}
