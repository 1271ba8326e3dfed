use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataApiError {
    #[error("data api request {url} failed with status {status}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("data api transport error: {0}")]
    Transport(String),
    #[error("data api returned an unexpected body: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl DataApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Status { status: 404, .. }
        )
    }
}

/// Conditions that stop a run before any document is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no active notebook: select a target notebook (--notebook or report.target_notebook)")]
    NoActiveNotebook,
    #[error("target notebook not found: {0}")]
    NotebookNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_counts_as_not_found() {
        let err = DataApiError::Status {
            status: 404,
            url: "/folders/x".to_string(),
            body: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!DataApiError::Transport("refused".to_string()).is_not_found());
    }

    #[test]
    fn precondition_survives_anyhow_downcast() {
        let err: anyhow::Error = PreconditionError::NoActiveNotebook.into();
        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::NoActiveNotebook)
        );
    }
}
