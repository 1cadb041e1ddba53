use thiserror::Error;

/// Failures raised while building or running a network.
///
/// They travel inside [anyhow::Error], so callers recover the kind with
/// `error.downcast_ref::<ModelError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("shape mismatch: {0}")]
    Shape(String),
}

impl ModelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape(_))
    }
}
