use thiserror::Error;

pub mod declaration;
pub mod dep;
pub mod import_path;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading declaration toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing TOML key `{key}` in declaration `{declaration}`")]
    MissingKey { declaration: String, key: String },
    #[error("Declaration `{declaration}` ({import}): only one of branch/commit/tag may be specified")]
    AmbiguousCheckout { declaration: String, import: String },
    #[error("Declaration `{declaration}`: import `{import}` must be a relative path of plain segments")]
    InvalidImport { declaration: String, import: String },
    #[error("Unknown scm `{0}`, expected one of git, hg, svn, bzr")]
    InvalidScm(String),
}
