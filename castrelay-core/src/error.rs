use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_joins_messages() {
        let err = Error::Validation(vec![
            "relay.rtsp_address is empty".to_string(),
            "recording.format is empty".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: relay.rtsp_address is empty; recording.format is empty"
        );
    }
}
