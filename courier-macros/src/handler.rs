//! `#[handler]` self-registration.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{GenericArgument, ItemImpl, PathArguments, Type};

enum HandlerTrait {
    Request(Type),
    Event(Type),
}

/// Find `Handler<R>` or `EventHandler<E>` in the impl header.
fn handler_trait(input: &ItemImpl) -> syn::Result<HandlerTrait> {
    let Some((_, path, _)) = &input.trait_ else {
        return Err(syn::Error::new_spanned(
            &input.self_ty,
            "#[handler] must be placed on an `impl Handler<R> for H` or `impl EventHandler<E> for H` block",
        ));
    };
    let Some(segment) = path.segments.last() else {
        return Err(syn::Error::new_spanned(path, "expected a trait path"));
    };

    let message = match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(ty)) if args.args.len() == 1 => ty.clone(),
            _ => {
                return Err(syn::Error::new_spanned(
                    args,
                    "expected exactly one message type argument",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                segment,
                "expected the message type, as in `Handler<CreateWidget>`",
            ));
        }
    };

    match segment.ident.to_string().as_str() {
        "Handler" => Ok(HandlerTrait::Request(message)),
        "EventHandler" => Ok(HandlerTrait::Event(message)),
        _ => Err(syn::Error::new_spanned(
            &segment.ident,
            "#[handler] supports `Handler` and `EventHandler` impls only",
        )),
    }
}

pub(crate) fn expand(input: ItemImpl) -> syn::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[handler] cannot register a generic impl; register each instantiation by hand",
        ));
    }

    let handler = &input.self_ty;
    let registration = match handler_trait(&input)? {
        HandlerTrait::Request(request) => quote! {
            ::courier::inventory::submit! {
                ::courier::discovery::RequestRegistration::of::<#request, #handler>()
            }
        },
        HandlerTrait::Event(event) => quote! {
            ::courier::inventory::submit! {
                ::courier::discovery::EventRegistration::of::<#event, #handler>()
            }
        },
    };

    Ok(quote! {
        #input
        #registration
    })
}
