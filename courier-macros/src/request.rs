//! `Command`, `Query` and `Event` derives.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Ident, Token, Type, parse::Parse, parse::ParseStream};

#[derive(Clone, Copy)]
pub(crate) enum Intent {
    Command,
    Query,
}

impl Intent {
    fn attribute(self) -> &'static str {
        match self {
            Intent::Command => "command",
            Intent::Query => "query",
        }
    }

    fn kind(self) -> TokenStream {
        match self {
            Intent::Command => quote! { ::courier::kind::Command },
            Intent::Query => quote! { ::courier::kind::Query },
        }
    }
}

/// `response = Type`
struct RequestArgs {
    response: Option<Type>,
}

impl Parse for RequestArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut response = None;

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            match ident.to_string().as_str() {
                "response" => {
                    if response.is_some() {
                        return Err(syn::Error::new(ident.span(), "duplicate `response`"));
                    }
                    response = Some(input.parse()?);
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {}", other),
                    ));
                }
            }

            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }

        Ok(RequestArgs { response })
    }
}

pub(crate) fn expand(input: &DeriveInput, intent: Intent) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut response = None;
    for attr in &input.attrs {
        if !attr.path().is_ident(intent.attribute()) {
            continue;
        }
        if response.is_some() {
            return Err(syn::Error::new_spanned(
                attr,
                format!("duplicate #[{}] attribute", intent.attribute()),
            ));
        }
        let args: RequestArgs = attr.parse_args()?;
        response = Some(args.response);
    }
    let response = match response.flatten() {
        Some(ty) => quote! { #ty },
        None => quote! { () },
    };
    let kind = intent.kind();

    // Generic requests cannot be declared: the record names one concrete type.
    let declaration = if input.generics.params.is_empty() {
        quote! {
            ::courier::inventory::submit! {
                ::courier::discovery::DeclaredRequest::of::<#name>()
            }
        }
    } else {
        TokenStream::new()
    };

    Ok(quote! {
        impl #impl_generics ::courier::Request for #name #ty_generics #where_clause {
            type Response = #response;
            type Kind = #kind;
        }

        #declaration
    })
}

pub(crate) fn expand_event(input: &DeriveInput) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::courier::Event for #name #ty_generics #where_clause {}
    }
}
