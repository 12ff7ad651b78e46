use secrecy::SecretString;

/// Process-wide configuration shared by the server action.
///
/// The session signing secret is held as a [`SecretString`] so it is redacted
/// from Debug output and never logged.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub session_secret: SecretString,
    pub frontend_url: String,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(frontend_url: String) -> Self {
        Self {
            session_secret: SecretString::from(""),
            frontend_url,
        }
    }

    pub fn set_session_secret(&mut self, secret: SecretString) {
        self.session_secret = secret;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new("http://localhost:3000".to_string());
        assert_eq!(args.frontend_url, "http://localhost:3000");
        assert_eq!(args.session_secret.expose_secret(), "");
    }

    #[test]
    fn test_set_session_secret() {
        let mut args = GlobalArgs::new("http://localhost:3000".to_string());
        args.set_session_secret(SecretString::from("s3cret"));
        assert_eq!(args.session_secret.expose_secret(), "s3cret");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut args = GlobalArgs::new("http://localhost:3000".to_string());
        args.set_session_secret(SecretString::from("s3cret"));
        let debug = format!("{args:?}");
        assert!(!debug.contains("s3cret"));
    }
}
