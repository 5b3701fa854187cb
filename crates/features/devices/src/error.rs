use std::borrow::Cow;

/// A specialized [`DeviceError`] enum of this crate.
#[lithium_derive::lithium_error]
pub enum DeviceError {
    /// A device with the same type and name is already registered.
    #[error("Device already exists{}: {message}", format_context(.context))]
    AlreadyExists { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Device not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No driver with this name exists for the requested device type.
    #[error("Unknown driver{}: {message}", format_context(.context))]
    UnknownDriver { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Device names become bus topic segments: no whitespace, dots or slashes.
    #[error("Invalid device name{}: {message}", format_context(.context))]
    InvalidName { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unknown property{}: {message}", format_context(.context))]
    UnknownProperty { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Property is read-only{}: {message}", format_context(.context))]
    ReadOnly { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A property value or task parameter failed validation.
    #[error("Invalid value{}: {message}", format_context(.context))]
    InvalidValue { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unknown task{}: {message}", format_context(.context))]
    UnknownTask { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Device not connected{}: {message}", format_context(.context))]
    NotConnected { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The device cannot perform the request in its current state (parked, busy, ...).
    #[error("Invalid device state{}: {message}", format_context(.context))]
    InvalidState { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal device error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl DeviceError {
    pub(crate) fn invalid_value(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidValue { message: message.into(), context: None }
    }

    pub(crate) fn invalid_state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidState { message: message.into(), context: None }
    }
}
