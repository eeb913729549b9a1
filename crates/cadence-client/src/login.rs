//! Browser login from a terminal.

use std::fmt;
use std::io::{self, BufRead};

use cadence_online::{OAuthError, OnlineClient};

#[derive(Debug)]
pub enum BrowserLoginError {
    Io(io::Error),
    /// Input ended before a code was entered.
    NoCode,
    OAuth(OAuthError),
}

impl fmt::Display for BrowserLoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "could not read the login code: {e}"),
            Self::NoCode => write!(f, "no login code entered"),
            Self::OAuth(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BrowserLoginError {}

impl From<io::Error> for BrowserLoginError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<OAuthError> for BrowserLoginError {
    fn from(e: OAuthError) -> Self {
        Self::OAuth(e)
    }
}

/// Open the login page, then finish with the first non-empty line of `input`.
///
/// The line may be the bare code or the whole `<scheme>://login/...` uri the
/// browser was redirected to. The code exchange completes on a later tick.
pub fn browser_login(client: &mut OnlineClient, input: impl BufRead) -> Result<(), BrowserLoginError> {
    client.start_oauth_login();
    println!("Paste the login code:");

    for line in input.lines() {
        let line = line?;
        let code = line.trim();
        if code.is_empty() {
            continue;
        }
        if code.contains("://") {
            client.handle_uri(code)?;
        } else {
            client.complete_oauth(code)?;
        }
        return Ok(());
    }
    Err(BrowserLoginError::NoCode)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use cadence_config::{Config, ConfigHandle};
    use cadence_net::HttpResponse;
    use cadence_net::testing::MockTransport;
    use cadence_online::{Collaborators, LoginState};

    use super::*;

    fn client() -> (OnlineClient, Arc<MockTransport>) {
        let mut config = Config::default();
        config.online.server = "example.net".to_string();
        config.paths.data_dir = std::env::temp_dir();
        let mock = Arc::new(MockTransport::new());
        let client = OnlineClient::new(ConfigHandle::in_memory(config), Collaborators::default(), mock.clone());
        (client, mock)
    }

    #[test]
    fn test_pasted_code_is_exchanged() {
        let (mut client, mock) = client();
        browser_login(&mut client, Cursor::new("\n  abc123  \n")).unwrap();

        assert_eq!(client.login_state(), LoginState::LoggingIn);
        let url = mock.next_url().unwrap();
        assert!(url.starts_with("https://example.net/connect/finish?code=abc123&proof="));

        assert!(mock.complete_next(HttpResponse::ok("long-lived")));
        client.tick();
        assert_eq!(client.config().read(|c| c.online.oauth_token.clone()), "long-lived");
    }

    #[test]
    fn test_pasted_login_uri_is_accepted() {
        let (mut client, mock) = client();
        browser_login(&mut client, Cursor::new("cadence://login/example.net/xyz\n")).unwrap();
        let url = mock.next_url().unwrap();
        assert!(url.starts_with("https://example.net/connect/finish?code=xyz&proof="));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let (mut client, mock) = client();
        let result = browser_login(&mut client, Cursor::new(""));
        assert!(matches!(result, Err(BrowserLoginError::NoCode)));
        assert_eq!(mock.pending_count(), 0);
    }
}
