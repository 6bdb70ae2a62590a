use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("template is missing the closing braces for placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),
    #[error("template references undeclared key {0:?}")]
    UndeclaredKey(String),
    #[error("patch find text {0:?} was not found in the target file")]
    FindNotFound(String),
    #[error("io error: {0}")]
    Io(String),
}
