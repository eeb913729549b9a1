//! Browser login with a PKCE code exchange.
//!
//! The client opens `https://<server>/connect/start` with the challenge, the
//! browser comes back through `<scheme>://login/<server>/<code>`, and the code
//! plus the verifier are traded for a long-lived token.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cadence_net::HttpRequest;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::api::percent_encode;
use crate::client::OnlineClient;
use crate::collab::{LoginState, ToastKind};
use crate::transport::USER_AGENT;

/// Timeout of the code exchange.
pub const FINISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OAuthError {
    #[error("uri does not use the {0}:// scheme")]
    WrongScheme(String),

    #[error("expected 5 login parameters, got {0}")]
    MalformedLogin(usize),

    #[error("no browser login in progress")]
    NoVerifier,
}

/// What a custom-scheme uri asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriAction {
    Login { endpoint: String, code: String },
    /// Bring the running client to the front.
    Run,
    /// Recognized scheme, nothing to do.
    Ignored,
}

pub fn generate_verifier() -> [u8; 32] {
    let mut verifier = [0u8; 32];
    rand::rng().fill(&mut verifier);
    verifier
}

/// URL-safe base64 of the SHA-256 of `verifier`.
pub fn challenge(verifier: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier))
}

pub fn start_url(endpoint: &str, verifier: &[u8; 32]) -> String {
    format!(
        "https://{endpoint}/connect/start?challenge={}",
        percent_encode(&challenge(verifier))
    )
}

pub fn finish_url(endpoint: &str, code: &str, verifier: &[u8; 32]) -> String {
    format!(
        "https://{endpoint}/connect/finish?code={}&proof={}",
        percent_encode(code),
        percent_encode(&URL_SAFE_NO_PAD.encode(verifier))
    )
}

/// Parse a `<scheme>://...` uri.
pub fn parse_uri(scheme: &str, uri: &str) -> Result<UriAction, OAuthError> {
    let Some(rest) = uri
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix("://"))
    else {
        return Err(OAuthError::WrongScheme(scheme.to_string()));
    };

    if rest.starts_with("login/") {
        // scheme: / "" / login / endpoint / code
        let params: Vec<&str> = uri.split('/').collect();
        if params.len() != 5 {
            return Err(OAuthError::MalformedLogin(params.len()));
        }
        return Ok(UriAction::Login {
            endpoint: params[3].to_string(),
            code: params[4].to_string(),
        });
    }
    if rest == "run" {
        return Ok(UriAction::Run);
    }
    Ok(UriAction::Ignored)
}

impl OnlineClient {
    /// Open the browser on the server's login page.
    pub fn start_oauth_login(&mut self) {
        let server = self.config.read(|c| c.online.server.clone());
        let verifier = generate_verifier();
        self.session.endpoint = server.clone();
        self.session.oauth_verifier = Some(verifier);
        info!(%server, "starting browser login");
        self.collab.browser.open_url(&start_url(&server, &verifier));
    }

    /// Handle a `<scheme>://` uri passed to the client.
    pub fn handle_uri(&mut self, uri: &str) -> Result<(), OAuthError> {
        let scheme = self.config.read(|c| c.online.uri_scheme.clone());
        match parse_uri(&scheme, uri) {
            Ok(UriAction::Login { endpoint, code }) => self.finish_oauth_login(&endpoint, &code),
            Ok(UriAction::Run) => Ok(()),
            Ok(UriAction::Ignored) => {
                debug!(uri, "ignoring uri");
                Ok(())
            }
            Err(err) => {
                // Re-enabled by the next successful login.
                if matches!(err, OAuthError::MalformedLogin(_)) {
                    self.config.update(|c| c.online.autologin = false);
                }
                debug!(uri, error = %err, "rejected uri");
                Err(err)
            }
        }
    }

    /// Finish a browser login with a code pasted by the user.
    pub fn complete_oauth(&mut self, code: &str) -> Result<(), OAuthError> {
        let server = self.config.read(|c| c.online.server.clone());
        self.finish_oauth_login(&server, code)
    }

    fn finish_oauth_login(&mut self, endpoint: &str, code: &str) -> Result<(), OAuthError> {
        self.config.update(|c| c.online.autologin = false);
        let verifier = self.session.oauth_verifier.ok_or(OAuthError::NoVerifier)?;
        self.set_login_state(LoginState::LoggingIn);

        let request = HttpRequest::get(finish_url(endpoint, code, &verifier))
            .header("user-agent", USER_AGENT)
            .timeout(FINISH_TIMEOUT)
            .follow_redirects(true);
        let shared = self.shared.clone();
        self.transport.http().request_async(
            request,
            Box::new(move |response| {
                let result = if response.is_success() {
                    Ok(String::from_utf8_lossy(&response.body).into_owned())
                } else {
                    Err(response.status)
                };
                shared.set_oauth_result(result);
            }),
        );
        Ok(())
    }

    /// Act on a finished code exchange. Runs on the tick thread.
    pub(crate) fn process_oauth_result(&mut self) {
        match self.shared.take_oauth_result() {
            None => {}
            Some(Ok(token)) => {
                info!("browser login succeeded");
                self.config.update(|c| c.online.oauth_token = token);
                self.persist_config();
                self.reconnect();
            }
            Some(Err(status)) => {
                debug!(status, "browser login failed");
                self.set_login_state(LoginState::LoggedOut);
                self.collab.notifier.toast("Login failed.", ToastKind::Error);
            }
        }
    }
}
