use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("path escapes sandbox root: {0}")]
    PathOutsideRoot(String),
    #[error("path contains a null byte or disallowed control character")]
    PathControlCharacter,
    #[error("path targets a blocked name: {0}")]
    BlockedName(String),
    #[error("path uses a reserved device name: {0}")]
    ReservedDeviceName(String),
    #[error("write target uses a blocked extension: {0}")]
    BlockedExtension(String),
    #[error("write target uses a blocked filename: {0}")]
    BlockedFilename(String),
    #[error("write target traverses a .git directory")]
    GitDirectoryTraversal,
    #[error("url scheme must be https: {0}")]
    DisallowedScheme(String),
    #[error("url port must be 80 or 443: {0}")]
    DisallowedPort(u16),
    #[error("url must not embed credentials")]
    EmbeddedCredentials,
    #[error("hostname is not a valid RFC-compliant host: {0}")]
    InvalidHostname(String),
    #[error("url resolves to a private, loopback, or reserved address: {0}")]
    PrivateOrReservedAddress(String),
    #[error("url could not be parsed: {0}")]
    Unparseable(String),
    #[error("binary {0} is globally blocked")]
    BlockedBinary(String),
    #[error("no whitelisted command template matches this invocation")]
    NoMatchingTemplate,
    #[error("argument at position {0} does not match the expected slot kind")]
    SlotMismatch(usize),
    #[error("gigablacklist match: argument contains blocked term {0:?}")]
    GigaBlacklistMatch(String),
}
