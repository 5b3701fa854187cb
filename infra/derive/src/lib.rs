#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the Lithium workspace.
//!
//! * [`macro@lithium_error`] turns an enum into a `thiserror` error with context support.
//! * [`macro@main`] boots the async runtime with one of the `lithium-runtime` profiles.
//! * [`macro@api_model`] and [`macro@api_handler`] keep DTOs and Axum handlers uniform.
//! * [`macro@lithium_slice`] wraps feature state into a cheaply clonable slice handle.
//!
//! Examples are `ignore`d here because a proc-macro crate cannot use its own macros;
//! the consuming crates exercise them in their tests.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemFn, ItemStruct, parse_macro_input};

/// Attribute macro to bootstrap the Tokio runtime.
///
/// Rewrites an `async fn main` returning `Result` into a plain `fn main` that builds a
/// runtime from a `lithium_runtime::RuntimeConfig` preset and blocks on the body.
///
/// # Arguments
///
/// * `high_performance` - Server-side preset (full worker count, larger stacks).
/// * `memory_efficient` - Half the workers and smaller stacks.
/// * `default` - Auto-detected worker count.
///
/// # Examples
///
/// ```rust,ignore
/// #[lithium_runtime::main(high_performance)]
/// async fn main() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::runtime::expand_main(args.into(), input).into()
}

/// Attribute macro for request/response models of the HTTP API.
///
/// * Adds `Debug`, `Serialize` and `Deserialize` derives when missing.
/// * Adds `utoipa::ToSchema` when the consuming crate enables its `server` feature.
/// * Applies `#[serde(rename_all = "camelCase")]` unless `rename_all = "..."` is given.
/// * Applies `#[serde(deny_unknown_fields)]` unless `deny_unknown_fields = false`.
///
/// # Example
///
/// ```rust,ignore
/// use lithium_derive::api_model;
///
/// #[api_model(deny_unknown_fields = false)]
/// pub struct AddDeviceRequest {
///     pub kind: String,
///     pub name: String,
/// }
/// ```
#[proc_macro_attribute]
pub fn api_model(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemStruct);
    macros::api::expand_api_model(attr.into(), input).into()
}

/// Attribute macro that registers an Axum handler with `utoipa::path`.
///
/// The `utoipa::path` attribute is only emitted when the consuming crate enables its
/// `server` feature, so handler modules stay compilable without `OpenAPI` support.
///
/// # Example
///
/// ```rust,ignore
/// #[api_handler(get, path = "/health", responses((status = OK, body = HealthResponse)), tag = "System")]
/// pub async fn health_handler() -> impl IntoResponse { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn api_handler(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::api::expand_api_handler(args.into(), input).into()
}

/// Attribute macro for domain error enums.
///
/// # Generated items
///
/// * `#[derive(Debug, thiserror::Error)]` (skipped for derives already present).
/// * `<Name>Ext<T>` trait with `.context(...)`, implemented for `Result<T, Name>` and for
///   `Result<T, Source>` of every variant that wraps a `source` error.
/// * `From<Source>` for every variant with a `source` field (enables `?`).
/// * `From<&'static str>` and `From<String>` when an `Internal { message, context }`
///   variant exists.
/// * A private `format_context` helper used by the `#[error(...)]` strings.
///
/// # Requirements
///
/// Variants must use named fields. Variants with a `source` field (or a field marked
/// `#[source]`/`#[from]`) must also carry `context: Option<Cow<'static, str>>`.
///
/// # Example
///
/// ```rust,ignore
/// use std::borrow::Cow;
///
/// #[lithium_derive::lithium_error]
/// pub enum StoreError {
///     #[error("I/O failure{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal store error{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn read(path: &str) -> Result<Vec<u8>, StoreError> {
///     std::fs::read(path).context("Reading store file")
/// }
/// ```
#[proc_macro_attribute]
pub fn lithium_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}

/// Attribute macro to define a feature slice handle.
///
/// Given `struct Devices { .. }` it emits `DevicesInner` with the original fields, a
/// `Devices` wrapper around `Arc<DevicesInner>` with `new`/`Deref`, and an
/// implementation of `lithium_kernel::domain::registry::FeatureSlice`.
///
/// # Example
/// ```rust,ignore
/// #[lithium_derive::lithium_slice]
/// pub struct Devices {
///     pub manager: DeviceManager,
/// }
///
/// let slice = Devices::new(DevicesInner { manager });
/// ```
#[proc_macro_attribute]
pub fn lithium_slice(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemStruct);
    macros::slice::expand_slice(input).into()
}
