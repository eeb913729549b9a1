//! Login request body and login reply interpretation.

use cadence_proto::Md5Hash;

use crate::platform::HardwareId;

/// Client version reported at login.
pub const CLIENT_VERSION: &str = "b20250815";

/// Adapter string reported in place of MAC addresses.
const ADAPTERS: &str = "runningunderwine";

/// How the client authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { username: String, pw_md5: Md5Hash },
    OAuth { token: String },
}

/// `md5(exe):adapters:md5(adapters):md5(install id):md5(disk uuid):`
pub fn client_hashes(hardware: &dyn HardwareId) -> String {
    format!(
        "{}:{}:{}:{}:{}:",
        Md5Hash::digest(hardware.exe_path()),
        ADAPTERS,
        Md5Hash::digest(ADAPTERS),
        Md5Hash::digest(hardware.install_id()),
        Md5Hash::digest(hardware.disk_uuid()),
    )
}

/// Whole-hour offset of local time from UTC.
pub fn local_utc_offset_hours() -> i32 {
    chrono::Local::now().offset().local_minus_utc() / 3600
}

/// Build the plaintext login body.
///
/// ```text
/// username\npassword_md5\nversion|utc_offset|0|client_hashes|0\n
/// $oauth\ntoken\nversion|utc_offset|0|client_hashes|0\n
/// ```
///
/// The third field hides the city; the last one blocks DMs from strangers off.
pub fn build_login_body(credentials: &Credentials, utc_offset: i32, hashes: &str) -> String {
    let (first, second) = match credentials {
        Credentials::Password { username, pw_md5 } => (username.as_str(), pw_md5.as_str()),
        Credentials::OAuth { token } => ("$oauth", token.as_str()),
    };
    format!("{first}\n{second}\n{CLIENT_VERSION}|{utc_offset}|0|{hashes}|0\n")
}

/// Message shown for a failed login.
///
/// `code` is the user id the server replied with; `token` is the textual
/// reason some servers put in the session token header instead.
pub fn login_failure_message(code: i32, is_oauth: bool, token: &str, username: &str) -> String {
    match code {
        -1 => "Incorrect username/password.".to_string(),
        -2 => "Client version is too old to connect to this server.".to_string(),
        -3 | -4 => "You are banned from this server.".to_string(),
        -5 => "Server had an error while trying to log you in.".to_string(),
        -6 => "You need to buy supporter to connect to this server.".to_string(),
        -7 => "You need to reset your password to connect to this server.".to_string(),
        -8 if is_oauth => "Session expired, please log in again.".to_string(),
        -8 => "Open the verification link sent to your email, then log in again.".to_string(),
        _ => match token {
            "user-already-logged-in" => "Already logged in on another client.".to_string(),
            "unknown-username" => format!("No account by the username '{username}' exists."),
            "incorrect-credentials" => "Incorrect username/password.".to_string(),
            "incorrect-password" => "Incorrect password.".to_string(),
            "contact-staff" => "Please contact an administrator of the server.".to_string(),
            _ => format!("Failed to log in: {token} (code {code})"),
        },
    }
}
