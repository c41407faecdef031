// Command line interface module
// Handles parsing and validation of the single image path argument

use crate::error::OverlayError;
use clap::error::ErrorKind;
use clap::Parser;
use log::debug;
use std::ffi::OsString;
use std::path::PathBuf;

/// pinlay - Pin an image as a click-through overlay, press Escape to dismiss
#[derive(Parser, Debug)]
#[command(name = "pinlay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the image file
    // Optional: a missing path must exit with status 1, not clap's 2
    #[arg(value_name = "IMAGE", allow_hyphen_values = true)]
    pub image_path: Option<PathBuf>,

    /// Anything after the image path is accepted and ignored
    #[arg(hide = true, allow_hyphen_values = true)]
    pub ignored: Vec<OsString>,
}

/// Parse command line arguments and return a path to an existing image
pub fn parse_args() -> Result<PathBuf, OverlayError> {
    let args = parse_from(std::env::args_os())?;
    resolve_image_path(args.image_path)
}

/// Parse `argv` without letting clap pick the exit status.
///
/// Help and version still print and exit 0; every other parse error becomes
/// the usage error, which exits 1.
pub fn parse_from<I, T>(argv: I) -> Result<Args, OverlayError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(argv).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        kind => {
            debug!("Rejected arguments ({:?}): {}", kind, e);
            OverlayError::Usage {
                program: program_name(),
            }
        }
    })
}

/// Check that a path was given and that it exists on disk
pub fn resolve_image_path(image_path: Option<PathBuf>) -> Result<PathBuf, OverlayError> {
    let Some(path) = image_path else {
        return Err(OverlayError::Usage {
            program: program_name(),
        });
    };

    if !path.exists() {
        return Err(OverlayError::FileNotFound(path));
    }

    Ok(path)
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(std::path::Path::new)
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pinlay".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    #[test]
    fn missing_argument_is_a_usage_error() {
        let_assert!(Err(OverlayError::Usage { .. }) = resolve_image_path(None));
    }

    #[test]
    fn nonexistent_path_is_reported_with_the_path() {
        let path = PathBuf::from("definitely/not/here/missing.png");
        let_assert!(Err(err) = resolve_image_path(Some(path.clone())));
        let_assert!(OverlayError::FileNotFound(reported) = &err);
        assert!(reported == &path);
        assert!(err.to_string().contains("missing.png"));
    }

    #[test]
    fn existing_path_is_returned_unchanged() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let_assert!(Ok(resolved) = resolve_image_path(Some(path.clone())));
        assert!(resolved == path);
    }

    #[test]
    fn clap_accepts_a_single_positional_path() {
        let_assert!(Ok(args) = parse_from(["pinlay", "photo.png"]));
        assert!(args.image_path == Some(PathBuf::from("photo.png")));
    }

    #[test]
    fn clap_allows_the_path_to_be_omitted() {
        let_assert!(Ok(args) = parse_from(["pinlay"]));
        assert!(args.image_path.is_none());
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let_assert!(Ok(args) = parse_from(["pinlay", "a.png", "b.png"]));
        assert!(args.image_path == Some(PathBuf::from("a.png")));
        assert!(args.ignored == vec![OsString::from("b.png")]);
    }

    #[test]
    fn paths_starting_with_a_hyphen_are_accepted() {
        let_assert!(Ok(args) = parse_from(["pinlay", "-shot.png"]));
        assert!(args.image_path == Some(PathBuf::from("-shot.png")));
    }

    #[test]
    fn hyphen_arguments_after_the_path_are_ignored() {
        let_assert!(Ok(args) = parse_from(["pinlay", "shot.png", "--bogus"]));
        assert!(args.image_path == Some(PathBuf::from("shot.png")));
    }
}
