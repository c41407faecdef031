// Error module
// User-facing failure taxonomy; every variant ends the run with exit status 1

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    /// No image path was given on the command line
    #[error("Usage: {program} <IMAGE>")]
    Usage { program: String },

    /// The given path does not exist
    #[error("Image file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists but could not be read or decoded
    #[error("Failed to load image: {}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Compositor, GPU or key grab setup failed
    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn not_found_message_names_the_path() {
        let err = OverlayError::FileNotFound(PathBuf::from("missing.png"));
        assert!(err.to_string() == "Image file does not exist: missing.png");
    }

    #[test]
    fn usage_message_names_the_program() {
        let err = OverlayError::Usage {
            program: "pinlay".to_string(),
        };
        assert!(err.to_string() == "Usage: pinlay <IMAGE>");
    }

    #[test]
    fn platform_errors_keep_their_context_chain() {
        let inner = anyhow::anyhow!("no layer shell").context("Failed to bind layer shell");
        let err = OverlayError::from(inner);
        assert!(format!("{err:#}") == "Failed to bind layer shell: no layer shell");
    }
}
