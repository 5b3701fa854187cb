use std::borrow::Cow;

/// A specialized [`PreloadError`] enum of this crate.
#[lithium_derive::lithium_error]
pub enum PreloadError {
    /// The manifest parsed but describes something unusable.
    #[error("Invalid manifest{}: {message}", format_context(.context))]
    Manifest { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Manifest TOML error{}: {source}", format_context(.context))]
    Toml { source: toml::de::Error, context: Option<Cow<'static, str>> },

    #[error("Manifest JSON error{}: {source}", format_context(.context))]
    Json { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Preload I/O error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Download failed{}: {source}", format_context(.context))]
    Http { source: reqwest::Error, context: Option<Cow<'static, str>> },

    /// The downloaded bytes do not match the manifest.
    #[error("Checksum mismatch{}: {message}", format_context(.context))]
    Checksum { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A resource path points outside the resource root.
    #[error("Resource path rejected{}: {source}", format_context(.context))]
    PathTraversal { source: lithium_kernel::sandbox::SandboxError, context: Option<Cow<'static, str>> },

    #[error("Hashing job failed{}: {source}", format_context(.context))]
    Pool { source: lithium_runtime::PoolError, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal preload error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
