use std::borrow::Cow;

/// A specialized [`ConfigError`] enum of this crate.
#[lithium_derive::lithium_error]
pub enum ConfigError {
    /// The key path is malformed (empty segment, stray separator).
    #[error("Invalid config path{}: {message}", format_context(.context))]
    InvalidPath { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The path runs through a value that cannot hold children.
    #[error("Config type conflict{}: {message}", format_context(.context))]
    TypeConflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Config key not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Array index out of range{}: {message}", format_context(.context))]
    IndexOutOfRange { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Config I/O error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Config JSON error{}: {source}", format_context(.context))]
    Json { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Config directory walk failed{}: {source}", format_context(.context))]
    Walk { source: walkdir::Error, context: Option<Cow<'static, str>> },

    /// A file path from a request points outside the store directory.
    #[error("Config path rejected{}: {source}", format_context(.context))]
    Sandbox { source: lithium_kernel::sandbox::SandboxError, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal config error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
