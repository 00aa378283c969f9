//! Errors raised by the protocol graph.

/// Result type for protocol graph operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol graph errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A value or graph attachment violates a declared constraint.
    /// The mutation did not take effect.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The graph or the catalog is structurally inconsistent for one item.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The mapping catalog could not be parsed into its expected shape.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A configuration or state collaborator failed.
    #[error("Repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

impl ProtocolError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Whether this error only concerns the item being built.
    ///
    /// A mapping failure invalidates the whole catalog and therefore every
    /// device, everything else can be skipped per device.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::InvalidState(_) | Self::Repository(_)
        )
    }
}
