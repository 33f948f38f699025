//! Procedural macros for Courier.
//!
//! - `#[derive(Command)]`, `#[derive(Query)]`: implement `Request` and declare
//!   the type so `validate()` insists on a handler for it.
//! - `#[derive(Event)]`: implement `Event`.
//! - `#[handler]`: self-register a `Handler` or `EventHandler` impl.

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemImpl, parse_macro_input};

mod handler;
mod request;

/// Derive `Request` with `Kind = kind::Command`.
///
/// The response type defaults to `()`:
///
/// ```rust,ignore
/// #[derive(Command)]
/// #[command(response = WidgetId)]
/// struct CreateWidget {
///     name: String,
/// }
/// ```
#[proc_macro_derive(Command, attributes(command))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    request::expand(&input, request::Intent::Command)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive `Request` with `Kind = kind::Query`.
///
/// ```rust,ignore
/// #[derive(Query)]
/// #[query(response = Option<Widget>)]
/// struct FindWidget(WidgetId);
/// ```
#[proc_macro_derive(Query, attributes(query))]
pub fn derive_query(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    request::expand(&input, request::Intent::Query)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive `Event`.
#[proc_macro_derive(Event)]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    request::expand_event(&input).into()
}

/// Register a handler impl with the discovery collection.
///
/// Place it on an `impl Handler<R> for H` or `impl EventHandler<E> for H`
/// block. `H` must implement `Default`; dispatcher builders instantiate it
/// from `discover()`.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct CreateWidgetHandler;
///
/// #[handler]
/// impl Handler<CreateWidget> for CreateWidgetHandler {
///     type Error = WidgetError;
///
///     async fn handle(&self, cmd: CreateWidget, ctx: &Context) -> Result<WidgetId, WidgetError> {
///         // ...
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn handler(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let attr = proc_macro2::TokenStream::from(attr);
        return syn::Error::new_spanned(attr, "#[handler] takes no arguments")
            .into_compile_error()
            .into();
    }
    let input = parse_macro_input!(item as ItemImpl);
    handler::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
