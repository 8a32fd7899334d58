//! Record states and the user-facing status summary.

use std::fmt;

/// Connection/setup state of one record.
///
/// `Uninitialized -> Initializing -> Online`; any non-terminal state can drop
/// to `Offline` (connect failed or lost) or `Cancelled` (aborted), both of
/// which are retried by running `init` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Uninitialized,
    Initializing,
    Online,
    Offline,
    Cancelled,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerState::Uninitialized => "uninitialized",
            ServerState::Initializing => "initializing",
            ServerState::Online => "online",
            ServerState::Offline => "offline",
            ServerState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Summary of a record's (state, reason, problems) triple for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn summarize(
        name: &str,
        state: ServerState,
        reason: Option<&str>,
        problems: Option<&str>,
    ) -> Self {
        match (state, problems) {
            (ServerState::Online, None) => Self::info(format!("Connected to {name}.")),
            (ServerState::Online, Some(problems)) => Self::warning(format!(
                "Connected to {name}, but setup reported a problem: {problems}"
            )),
            (ServerState::Offline, _) => Self::error(format!(
                "Cannot connect to {name}: {}",
                reason.unwrap_or("the host is unreachable")
            )),
            (ServerState::Cancelled, _) => {
                Self::warning(format!("Connecting to {name} was cancelled."))
            }
            (ServerState::Initializing, _) => {
                Self::info(format!("{name} is still being set up."))
            }
            (ServerState::Uninitialized, _) => {
                Self::info(format!("{name} has not been connected yet."))
            }
        }
    }

    fn info(text: String) -> Self {
        Self {
            level: StatusLevel::Info,
            text,
        }
    }

    fn warning(text: String) -> Self {
        Self {
            level: StatusLevel::Warning,
            text,
        }
    }

    fn error(text: String) -> Self {
        Self {
            level: StatusLevel::Error,
            text,
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_levels() {
        let ok = StatusMessage::summarize("box", ServerState::Online, None, None);
        assert_eq!(ok.level, StatusLevel::Info);

        let degraded =
            StatusMessage::summarize("box", ServerState::Online, None, Some("disk full"));
        assert_eq!(degraded.level, StatusLevel::Warning);
        assert!(degraded.text.contains("disk full"));

        let offline =
            StatusMessage::summarize("box", ServerState::Offline, Some("refused"), None);
        assert_eq!(offline.level, StatusLevel::Error);
        assert_eq!(offline.text, "Cannot connect to box: refused");
    }
}
