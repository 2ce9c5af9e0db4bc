use proc_macro2::TokenStream;
use synstructure::{BindingInfo, Structure};

/// Derive `From<T>` for every variant with a field marked `#[from]`.
pub fn derive_from(s: Structure) -> TokenStream {
    let mut impls = TokenStream::new();

    for variant in s.variants() {
        let field = match variant.bindings().iter().find(is_from) {
            Some(field) => field,
            None => continue,
        };

        if variant.bindings().len() != 1 {
            impls.extend(quote_spanned! { variant.ast().ident.span() =>
                compile_error!(
                    "From can only be derived for variants with a single field");
            });
            continue;
        }

        let ty = &field.ast().ty;
        let constructor = variant.construct(|_, _| quote!(from));

        impls.extend(s.gen_impl(quote! {
            gen impl From<#ty> for @Self {
                fn from(from: #ty) -> Self {
                    #constructor
                }
            }
        }));
    }

    impls
}

fn is_from(bi: &&BindingInfo) -> bool {
    bi.ast()
        .attrs
        .iter()
        .filter_map(|attr| attr.parse_meta().ok())
        .any(|meta| meta.path().is_ident("from"))
}
