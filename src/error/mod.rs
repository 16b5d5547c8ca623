use thiserror::Error;

pub mod context;

pub type Result<T> = std::result::Result<T, Error>;

// Re-export context helpers
pub use context::{ErrorChain, ErrorContext, OptionExt};

/// Main error type for weft
#[derive(Error, Debug)]
pub enum Error {
    /// Structural misuse caught at registration time (bad filter name, bad settings)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A named template could not be located when mounting
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Directive error: {0}")]
    Directive(String),

    #[error("Document error: {0}")]
    Dom(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "config")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl From<indextree::NodeError> for Error {
    fn from(err: indextree::NodeError) -> Self {
        Self::Dom(err.to_string())
    }
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound(name.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn directive(msg: impl Into<String>) -> Self {
        Self::Directive(msg.into())
    }

    pub fn dom(msg: impl Into<String>) -> Self {
        Self::Dom(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Errors of this kind abort the operation that raised them; everything
    /// else is degraded locally by the renderer or the binder.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidArgument(_) | Error::TemplateNotFound(_) | Error::Config(_) => true,
            Error::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Short stable code for the error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "E_INVALID_ARGUMENT",
            Error::TemplateNotFound(_) => "E_TEMPLATE_NOT_FOUND",
            Error::Template(_) => "E_TEMPLATE",
            Error::Directive(_) => "E_DIRECTIVE",
            Error::Dom(_) => "E_DOM",
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Json(_) => "E_JSON",
            #[cfg(feature = "config")]
            Error::Toml(_) => "E_TOML",
            Error::Regex(_) => "E_PATTERN",
            Error::Internal(_) => "E_INTERNAL",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }
}
