use thiserror::Error;

/// Failures raised by the source-resolution pipeline (detail fetch, stream
/// resolution, option selection). Network and parse failures keep the URL
/// they happened on; nothing in here retries.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no source selected; pass --provider or set `provider` in config.toml")]
    NoSourceSelected,

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("unexpected {what} at {url}")]
    Parse { url: String, what: String },

    #[error("no playable stream found for episode {episode}")]
    NoCandidates { episode: String },

    #[error("selection cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn parse(url: impl Into<String>, what: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            what: what.into(),
        }
    }
}

/// Tracking-service failures. Always non-fatal to playback: callers log and
/// move on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("tracker request failed")]
    Network(#[from] reqwest::Error),

    #[error("tracker returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("tracker response did not match the expected shape: {0}")]
    Shape(String),

    #[error("no tracker entry found for \"{0}\"")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player '{0}' not found; install mpv or set ANZU_PLAYER to a valid command")]
    NotFound(String),

    #[error("player IPC failed")]
    Ipc(#[from] std::io::Error),

    #[error("player returned malformed IPC payload: {0}")]
    Protocol(String),

    #[error("player exited with status {0}")]
    Exited(std::process::ExitStatus),
}
