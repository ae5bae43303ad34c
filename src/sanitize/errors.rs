use thiserror::Error;

#[derive(Error, Debug)]
pub enum SanitizeError {
    #[error("sanitized output is empty")]
    EmptyOutput,

    #[error("parse failure: {0}")]
    Parse(String),
}
