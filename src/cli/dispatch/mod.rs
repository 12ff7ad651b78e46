use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{anyhow, Result};
use secrecy::SecretString;

/// Build the action and global arguments from parsed CLI matches.
///
/// # Errors
///
/// Returns an error if a required argument is missing (clap enforces
/// `required` args, so this only fires for programmatic misuse).
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow!("missing required argument: --dsn"))?,
    };

    let frontend_url = matches
        .get_one("frontend-url")
        .map(|s: &String| s.to_string())
        .ok_or_else(|| anyhow!("missing required argument: --frontend-url"))?;

    let mut globals = GlobalArgs::new(frontend_url);

    let secret = matches
        .get_one("session-secret")
        .map(|s: &String| SecretString::from(s.as_str()))
        .ok_or_else(|| anyhow!("missing required argument: --session-secret"))?;
    globals.set_session_secret(secret);

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_builds_action_and_globals() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "fiscus",
            "--dsn",
            "postgres://localhost/fiscus",
            "--session-secret",
            "0123456789abcdef0123456789abcdef",
            "--frontend-url",
            "https://app.fiscus.dev",
        ]);

        let (action, globals) = handler(&matches)?;

        let Action::Server { port, dsn } = action;
        assert_eq!(port, 8080);
        assert_eq!(dsn, "postgres://localhost/fiscus");
        assert_eq!(globals.frontend_url, "https://app.fiscus.dev");
        assert_eq!(
            globals.session_secret.expose_secret(),
            "0123456789abcdef0123456789abcdef"
        );
        Ok(())
    }
}
