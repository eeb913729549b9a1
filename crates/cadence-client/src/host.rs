//! Headless collaborators: everything the online client shows goes to the log.

use std::sync::Arc;

use cadence_online::{
    ChatMessage, ChatView, Collaborators, LoginState, Notifier, ToastKind, UrlOpener, UserCardView,
    UserInfo,
};
use tracing::{debug, error, info};

#[derive(Debug, Default)]
pub struct LogHost;

impl Notifier for LogHost {
    fn toast(&self, text: &str, kind: ToastKind) {
        match kind {
            ToastKind::Error => error!(target: "toast", "{text}"),
            _ => info!(target: "toast", ?kind, "{text}"),
        }
    }
}

impl UrlOpener for LogHost {
    fn open_url(&self, url: &str) {
        // No browser to hand it to.
        println!("Open this URL to continue: {url}");
    }
}

impl ChatView for LogHost {
    fn add_message(&self, channel: &str, message: &ChatMessage, _mark_unread: bool) {
        info!(target: "chat", %channel, author = %message.author_name, "{}", message.text);
    }

    fn add_channel(&self, name: &str, _switch_to: bool) {
        info!(target: "chat", %name, "joined channel");
    }

    fn remove_channel(&self, name: &str) {
        info!(target: "chat", %name, "left channel");
    }
}

impl UserCardView for LogHost {
    fn on_login_state(&self, state: LoginState) {
        info!(?state, "login state changed");
    }

    fn on_user_changed(&self, username: &str) {
        info!(%username, "playing as");
    }

    fn on_stats_updated(&self, user: &UserInfo) {
        debug!(name = %user.name, pp = user.pp, rank = user.global_rank, "stats updated");
    }
}

/// Collaborators backed by [`LogHost`]; views this binary has no use for stay no-ops.
pub fn log_collaborators() -> Collaborators {
    let host = Arc::new(LogHost);
    Collaborators {
        notifier: host.clone(),
        browser: host.clone(),
        chat: host.clone(),
        user_card: host,
        ..Collaborators::default()
    }
}
