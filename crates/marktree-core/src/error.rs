use thiserror::Error;

/// Failure reported by a code-block resolver or an async loader.
///
/// None of these reach the caller of `compile`: the fence rule logs them and
/// renders the default code block instead.
#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("code block resolver failed for `{lang}`: {message}")]
    Resolver { lang: String, message: String },

    #[error("rich block loader failed: {0}")]
    Load(String),

    #[error("rich block override panicked: {0}")]
    Panicked(String),

    #[error("component descriptor is missing a name")]
    UnnamedDescriptor,
}

impl OverrideError {
    pub fn resolver(lang: impl Into<String>, message: impl Into<String>) -> Self {
        OverrideError::Resolver {
            lang: lang.into(),
            message: message.into(),
        }
    }
}

/// Failure raised by a component while producing its node.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("component `{component}` failed: {message}")]
    Component { component: String, message: String },

    #[error("component panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("nesting must be -1, 0 or 1, got {0}")]
    InvalidNesting(i8),

    #[error("invalid token stream: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
