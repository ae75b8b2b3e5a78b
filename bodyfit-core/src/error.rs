use thiserror::Error;

/// Request-level failures that abort calibration before any photo is analyzed.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("height is required (cm or m)")]
    HeightMissing,
    #[error("unrealistic height: {0:.2} m")]
    HeightUnrealistic(f64),
    #[error("photos must be an object with 'front', 'side', 'back' keys or an 'unordered' list")]
    MalformedPhotos,
    #[error("too many photos: {count} received, at most {max} allowed")]
    TooManyPhotos { count: usize, max: usize },
    #[error("malformed calibration request: {0}")]
    MalformedRequest(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            CalibrationError::HeightUnrealistic(-0.05).to_string(),
            "unrealistic height: -0.05 m"
        );
        assert!(
            CalibrationError::TooManyPhotos { count: 12, max: 10 }
                .to_string()
                .contains("12")
        );
    }
}
