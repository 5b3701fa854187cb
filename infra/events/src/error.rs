use std::borrow::Cow;

/// Errors returned by [`MessageBus`](crate::MessageBus) operations.
#[lithium_derive::lithium_error]
pub enum MessageBusError {
    /// A stored channel could not be downcast to the requested payload type.
    #[error("Type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No channel exists for the requested topic and payload type.
    #[error("Channel not found{}: {message}", format_context(.context))]
    ChannelNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The topic already has a channel of another kind (broadcast/mpsc/watch).
    #[error("Channel kind mismatch{}: {message}", format_context(.context))]
    ChannelKindMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Channel full{}: {message}", format_context(.context))]
    ChannelFull { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Bounded channels need a capacity of at least one.
    #[error("Invalid capacity{}: {message}", format_context(.context))]
    InvalidCapacity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Topics must be non-empty and free of whitespace.
    #[error("Invalid topic{}: {message}", format_context(.context))]
    InvalidTopic { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Payload could not be captured as JSON for the topic history.
    #[error("Serialization failed{}: {source}", format_context(.context))]
    Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Internal message bus error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
