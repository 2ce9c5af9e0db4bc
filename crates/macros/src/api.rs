use proc_macro2::{Span, TokenStream};
use syn::{Attribute, Ident, Lit, Meta, NestedMeta, spanned::Spanned};
use synstructure::{BindingInfo, Structure, VariantInfo};

/// A compile error to be emitted in place of generated code.
struct Error(TokenStream);

impl Error {
    fn new(span: Span, message: &str) -> Error {
        Error(quote_spanned! { span =>
            compile_error!(#message);
        })
    }
}

/// Parsed contents of an `#[api(...)]` attribute.
#[derive(Default)]
struct Api {
    internal: Option<Span>,
    status: Option<Ident>,
    code: Option<Lit>,
}

pub fn derive_error(s: Structure) -> TokenStream {
    let statuses = s.each_variant(|v| match variant_api(v) {
        Ok(Some(api)) => match api.status {
            Some(status) => quote!(actix_web::http::StatusCode::#status),
            None => quote!(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        },
        Ok(None) => delegate(v, quote!(status)),
        Err(err) => err.0,
    });

    let codes = s.each_variant(|v| match variant_api(v) {
        Ok(Some(api)) => match api.code {
            Some(code) => quote!(Some(Cow::Borrowed(#code))),
            None => quote!(None),
        },
        Ok(None) => delegate(v, quote!(code)),
        Err(err) => err.0,
    });

    s.gen_impl(quote! {
        extern crate actix_web;
        use std::borrow::Cow;

        gen impl ApiError for @Self {
            fn status(&self) -> actix_web::http::StatusCode {
                match *self { #statuses }
            }

            fn code(&self) -> Option<Cow<str>> {
                match *self { #codes }
            }
        }
    })
}

/// Forward a method call to the variant's `#[cause]` field.
fn delegate(v: &VariantInfo, method: TokenStream) -> TokenStream {
    match v.bindings().iter().find(is_cause) {
        Some(cause) => quote!(#cause.#method()),
        None => Error::new(
            v.ast().ident.span(),
            "each variant must be #[api]-annotated or have a #[cause]",
        ).0,
    }
}

/// Parse the single `#[api(...)]` attribute of a variant, if there is one.
fn variant_api(v: &VariantInfo) -> Result<Option<Api>, Error> {
    let mut metas = v.ast().attrs.iter()
        .filter_map(|attr: &Attribute| attr.parse_meta().ok())
        .filter(|meta| meta.path().is_ident("api"));

    let list = match metas.next() {
        None => return Ok(None),
        Some(Meta::List(list)) => list,
        Some(meta) => return Err(Error::new(
            meta.span(),
            "api attribute must take a list in parentheses",
        )),
    };

    if let Some(extra) = metas.next() {
        return Err(Error::new(extra.span(), "api attribute must be used exactly once"));
    }

    if list.nested.is_empty() {
        return Err(Error::new(
            list.span(),
            "api attribute requires at least one argument",
        ));
    }

    let mut api = Api::default();

    for item in list.nested.iter() {
        match item {
            NestedMeta::Meta(Meta::Path(path)) if path.is_ident("internal") =>
                api.internal = Some(item.span()),
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("code") =>
                api.code = Some(nv.lit.clone()),
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("status") =>
                match nv.lit {
                    Lit::Str(ref s) => api.status = Some(Ident::new(&s.value(), s.span())),
                    _ => return Err(Error::new(nv.lit.span(), "expected a string")),
                },
            _ => return Err(Error::new(
                item.span(),
                "expected one of: internal, code, status",
            )),
        }
    }

    if let Some(span) = api.internal {
        if api.status.is_some() {
            return Err(Error::new(span, "internal errors can't have statuses"));
        }
        if api.code.is_some() {
            return Err(Error::new(span, "internal errors can't have codes"));
        }
    }

    Ok(Some(api))
}

fn is_cause(bi: &&BindingInfo) -> bool {
    bi.ast()
        .attrs
        .iter()
        .filter_map(|attr| attr.parse_meta().ok())
        .any(|meta| meta.path().is_ident("cause"))
}
