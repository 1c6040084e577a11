//! Session configuration and match id extraction

use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_SOCKET_URI: &str = "https://scorebot-lb.hltv.org";

/// How long a kill waits for its assist before being published without one.
pub const DEFAULT_ASSIST_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub struct LivescoreConfig {
    /// Numeric match (list) id sent in the ready handshake
    pub list_id: Option<u64>,
    pub socket_uri: String,
    pub assist_window: Duration,
}

impl Default for LivescoreConfig {
    fn default() -> Self {
        Self {
            list_id: None,
            socket_uri: DEFAULT_SOCKET_URI.to_string(),
            assist_window: DEFAULT_ASSIST_WINDOW,
        }
    }
}

impl LivescoreConfig {
    pub fn new(list_id: u64) -> Self {
        Self::default().with_list_id(list_id)
    }

    /// Builds a config for the match page at `url`, e.g.
    /// `https://www.hltv.org/matches/2340838/fnatic-vs-heretics`.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(list_id_from_url(url)?))
    }

    pub fn with_list_id(mut self, list_id: u64) -> Self {
        self.list_id = Some(list_id);
        self
    }

    pub fn with_socket_uri(mut self, socket_uri: impl Into<String>) -> Self {
        self.socket_uri = socket_uri.into();
        self
    }

    pub fn with_assist_window(mut self, assist_window: Duration) -> Self {
        self.assist_window = assist_window;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list_id.is_none() {
            return Err(ConfigError::MissingListId);
        }
        if self.assist_window.is_zero() {
            return Err(ConfigError::ZeroAssistWindow);
        }
        Ok(())
    }
}

/// Returns the first purely numeric path segment of `url`.
pub fn list_id_from_url(url: &str) -> Result<u64, ConfigError> {
    let without_scheme = match url.find("://") {
        Some(index) => &url[index + 3..],
        None => url,
    };

    // Everything before the first '/' is the authority
    let path = match without_scheme.find('/') {
        Some(index) => &without_scheme[index..],
        None => "",
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();

    path.split('/')
        .filter(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .find_map(|segment| segment.parse::<u64>().ok())
        .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))
}
