//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use velour_auth::{AuthState, AuthStateChangedPayload};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Machine-readable session summary: the state-change payload plus the
/// fields only `status` shows. Never carries tokens.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub session: AuthStateChangedPayload,
    pub signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl From<&AuthState> for StatusReport {
    fn from(state: &AuthState) -> Self {
        Self {
            session: state.payload(),
            signed_in: state.is_authenticated(),
            name: state.user().and_then(|u| u.display_name.clone()),
            expires_at: state.expires_at().map(|t| t.to_rfc3339()),
        }
    }
}

/// Print the final session state.
pub fn print_state(state: &AuthState, format: &OutputFormat) {
    let report = StatusReport::from(state);
    match format {
        OutputFormat::Text => {
            let session = &report.session;
            print_row("Phase", &session.phase.to_string());
            match (&session.user_id, report.signed_in) {
                (Some(user_id), true) => {
                    print_row("Auth", "signed in");
                    print_row("User ID", user_id);
                    if let Some(email) = &session.email {
                        print_row("Email", email);
                    }
                    if let Some(name) = &report.name {
                        print_row("Name", name);
                    }
                    print_row(
                        "Expires",
                        report.expires_at.as_deref().unwrap_or("unknown"),
                    );
                }
                _ => print_row("Auth", "signed out"),
            }
            if let Some(error) = &session.error {
                print_row("Last error", error);
            }
        }
        OutputFormat::Json => print_json(&report),
    }
}

/// Print a phase change as it happens, on stderr. JSON mode emits one
/// payload per line.
pub fn print_transition(state: &AuthState, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("  -> {}", state.phase()),
        OutputFormat::Json => match serde_json::to_string(&state.payload()) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => eprintln!("Error: failed to encode transition: {}", e),
        },
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "success",
            "message": message,
        })),
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => eprintln!(
            "{}",
            serde_json::json!({ "status": "error", "message": message })
        ),
    }
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<12} {}", format!("{}:", label), value);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_extends_state_payload() {
        let state = AuthState::default();

        let report = serde_json::to_value(StatusReport::from(&state)).unwrap();
        let payload = serde_json::to_value(state.payload()).unwrap();

        for (key, value) in payload.as_object().unwrap() {
            assert_eq!(report.get(key), Some(value), "field {key} differs");
        }
        assert_eq!(report["phase"], "uninitialized");
        assert_eq!(report["signed_in"], false);
        assert!(report.get("user_id").is_none());
        assert!(report.get("access_token").is_none());
    }
}
