/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
///
/// Every variant is recoverable at the [`crate::Interpreter::process`]
/// boundary: a host reports it and may keep issuing further calls.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// A referenced name is neither a defined frequency nor a defined note.
    #[error("no note or frequency named `{name}`")]
    UnknownEntity { name: String },
    /// A new note was defined without a resolvable parent.
    #[error("cannot define note `{note}`: {}", describe_parent(.parent))]
    MissingParent {
        note: String,
        parent: Option<String>,
    },
    /// Every output channel is already allocated.
    #[error("cannot sound note `{note}`: all {capacity} channels are in use")]
    ChannelsExhausted { note: String, capacity: usize },
    /// The command is well-formed but cannot be applied to the current state.
    #[error("{0}")]
    InvalidOperation(String),
    /// Wraps the failure of a single command together with its location.
    #[error("command #{position} `{command}` failed: {source}")]
    Command {
        position: usize,
        command: String,
        #[source]
        source: Box<PlayerError>,
    },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration or command tree JSON.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

fn describe_parent(parent: &Option<String>) -> String {
    match parent {
        Some(parent) => format!("parent `{parent}` is not defined"),
        None => "a new note needs a parent".to_string(),
    }
}

impl PlayerError {
    /// Creates an [`PlayerError::InvalidOperation`] from any message.
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Strips any [`PlayerError::Command`] wrappers and returns the
    /// underlying failure.
    pub fn root(&self) -> &PlayerError {
        match self {
            Self::Command { source, .. } => source.root(),
            other => other,
        }
    }
}
