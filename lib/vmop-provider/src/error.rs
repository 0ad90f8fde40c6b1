use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("virtual machine {0} not found on provider")]
    NotFound(String),

    #[error("provider {op} failed for {target}: {message}")]
    Operation {
        op: &'static str,
        target: String,
        message: String,
    },
}

impl ProviderError {
    pub fn operation(op: &'static str, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            op,
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
