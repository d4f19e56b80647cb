//! Operator credentials.
//!
//! Captured once at startup and shared read-only with every device task. The secret is
//! wiped from memory on drop and never shows up in `Debug` output.

use std::fmt;

use zeroize::Zeroizing;

pub struct Credentials {
    username: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The login secret. Also answers the enable password question.
    pub fn secret(&self) -> &str {
        self.secret.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Credentials;

    #[test]
    fn debug_output_hides_secret() {
        let creds = Credentials::new("netops", "s3cr3t-value");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("netops"));
        assert!(!rendered.contains("s3cr3t-value"));
    }
}
