use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("invalid image url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("download failed with http {status}")]
    Http {
        status: reqwest::StatusCode,
        retriable: bool,
    },

    #[error("download timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("image too large ({0} bytes)")]
    TooLarge(u64),

    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("format '{0}' not in allowed formats")]
    FormatRejected(String),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ImageError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Http { retriable, .. } => *retriable,
            Self::InvalidUrl(_)
            | Self::TooLarge(_)
            | Self::UnknownFormat
            | Self::FormatRejected(_)
            | Self::Transcode(_)
            | Self::Io(_) => false,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Http {
                status,
                retriable: status.is_server_error(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ImageError::Timeout.should_retry());
        assert!(ImageError::Network("reset".into()).should_retry());
        assert!(
            ImageError::Http {
                status: reqwest::StatusCode::BAD_GATEWAY,
                retriable: true
            }
            .should_retry()
        );
        assert!(
            !ImageError::Http {
                status: reqwest::StatusCode::NOT_FOUND,
                retriable: false
            }
            .should_retry()
        );
        assert!(!ImageError::FormatRejected("bmp".into()).should_retry());
        assert!(!ImageError::Transcode("no codec".into()).should_retry());
    }
}
