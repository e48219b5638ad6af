//! Resolution and validation of the Bedrock dedicated server directory.

use std::path::{Path, PathBuf};

pub const SERVER_BINARY: &str = "bedrock_server";

/// The directory containing the externally supplied server binary.
/// `BEDROCK_BDS_DIR` overrides the `./bds` default.
pub fn bds_dir() -> PathBuf {
    std::env::var("BEDROCK_BDS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./bds"))
}

#[derive(Debug, Clone)]
pub struct DirCheck {
    pub valid: bool,
    pub message: String,
}

pub fn validate_bds_dir(dir: &Path) -> DirCheck {
    if dir.is_dir() && dir.join(SERVER_BINARY).is_file() {
        return DirCheck {
            valid: true,
            message: "Valid".to_string(),
        };
    }

    DirCheck {
        valid: false,
        message: format!(
            "Bedrock server directory \"{}\" is not valid. \
             Set BEDROCK_BDS_DIR to the folder that contains the {} binary.",
            dir.display(),
            SERVER_BINARY
        ),
    }
}
