use proc_macro::TokenStream;
use proc_macro_error::abort;
use quote::{quote, ToTokens};
use syn::parse_macro_input;
use syn::parse_quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;

/// Which wire strategy the generated `Message` impl selects
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum MsgKind {
    Raw,
    Reflective,
    Parserdes,
}

impl MsgKind {
    fn macro_name(&self) -> &'static str {
        match self {
            MsgKind::Raw => "AmRaw",
            MsgKind::Reflective => "AmData",
            MsgKind::Parserdes => "AmParserdes",
        }
    }

    fn strategy(&self, am: &proc_macro2::TokenStream) -> proc_macro2::TokenStream {
        match self {
            MsgKind::Raw => quote! {#am::active_messaging::RawBytesStrategy},
            MsgKind::Reflective => quote! {#am::active_messaging::ReflectiveStrategy},
            MsgKind::Parserdes => quote! {#am::active_messaging::ParserdesStrategy},
        }
    }
}

fn process_args(
    args: Punctuated<syn::Meta, syn::Token![,]>,
    kind: MsgKind,
) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    let mut traits: Vec<(String, proc_macro2::TokenStream)> = Vec::new();
    match kind {
        MsgKind::Raw => {
            traits.push((String::from("Clone"), quote! {Clone}));
            traits.push((String::from("Copy"), quote! {Copy}));
        }
        MsgKind::Reflective => {
            traits.push((
                String::from("Serialize"),
                quote! {active_messenger::serde::Serialize},
            ));
            traits.push((
                String::from("Deserialize"),
                quote! {active_messenger::serde::Deserialize},
            ));
        }
        MsgKind::Parserdes => {}
    }

    for a in args {
        let t = a.to_token_stream().to_string();
        let t = t.trim();
        if t.is_empty() || t.contains("serde::Serialize") || t.contains("serde::Deserialize") {
            continue;
        }
        if !traits.iter().any(|(name, _)| name == t) {
            traits.push((t.to_owned(), a.to_token_stream()));
        }
    }

    let impls = traits.iter().map(|(_, t)| t);
    let derive = quote! { #[derive( #(#impls),* )] };
    let attrs = if kind == MsgKind::Reflective {
        quote! {#[serde(crate = "active_messenger::serde")]}
    } else {
        quote! {}
    };
    (derive, attrs)
}

fn field_types(fields: &syn::Fields) -> Vec<syn::Type> {
    fields.iter().map(|f| f.ty.clone()).collect()
}

pub(crate) fn derive_am_data(
    input: TokenStream,
    args: Punctuated<syn::Meta, syn::Token![,]>,
    am: proc_macro2::TokenStream,
    kind: MsgKind,
) -> TokenStream {
    let input: syn::Item = parse_macro_input!(input);
    let (derive, serde_attrs) = process_args(args, kind);

    let (item, name, mut generics, tys, has_repr) = match input {
        syn::Item::Struct(data) => {
            let tys = field_types(&data.fields);
            let has_repr = data.attrs.iter().any(|a| a.path().is_ident("repr"));
            let name = data.ident.clone();
            let generics = data.generics.clone();
            (data.into_token_stream(), name, generics, tys, has_repr)
        }
        syn::Item::Enum(data) if kind != MsgKind::Raw => {
            let name = data.ident.clone();
            let generics = data.generics.clone();
            (data.into_token_stream(), name, generics, vec![], true)
        }
        other => abort!(
            other.span(),
            "#[{}] is only valid on structs{}",
            kind.macro_name(),
            if kind == MsgKind::Raw { "" } else { " and enums" }
        ),
    };

    let repr = if kind == MsgKind::Raw && !has_repr {
        quote! {#[repr(C)]}
    } else {
        quote! {}
    };

    let strategy = kind.strategy(&am);
    let mut trait_impls = quote! {};
    match kind {
        MsgKind::Raw => {
            // every field must be plain data itself
            let where_clause = generics.make_where_clause();
            for ty in &tys {
                where_clause
                    .predicates
                    .push(parse_quote! {#ty: #am::active_messaging::RawMessage});
            }
            let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
            trait_impls.extend(quote! {
                unsafe impl #impl_generics #am::active_messaging::RawMessage for #name #ty_generics #where_clause {}
                impl #impl_generics #am::active_messaging::Message for #name #ty_generics #where_clause {
                    type Strategy = #strategy;
                }
            });
        }
        MsgKind::Reflective => {
            if !generics.params.is_empty() {
                let self_ty = self_type(&name, &generics);
                generics.make_where_clause().predicates.push(parse_quote! {
                    #self_ty: #am::serde::Serialize + #am::serde::de::DeserializeOwned + Send + 'static
                });
            }
            let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
            trait_impls.extend(quote! {
                impl #impl_generics #am::active_messaging::Message for #name #ty_generics #where_clause {
                    type Strategy = #strategy;
                }
            });
        }
        MsgKind::Parserdes => {
            if !generics.params.is_empty() {
                let self_ty = self_type(&name, &generics);
                generics
                    .make_where_clause()
                    .predicates
                    .push(parse_quote! {#self_ty: #am::active_messaging::Parserdes});
            }
            let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
            trait_impls.extend(quote! {
                impl #impl_generics #am::active_messaging::Message for #name #ty_generics #where_clause {
                    type Strategy = #strategy;
                }
            });
        }
    }

    let output = quote! {
        #derive
        #serde_attrs
        #repr
        #item

        const _: () = {
            extern crate active_messenger as __am;
            #trait_impls
        };
    };
    TokenStream::from(output)
}

fn self_type(name: &syn::Ident, generics: &syn::Generics) -> proc_macro2::TokenStream {
    let (_, ty_generics, _) = generics.split_for_impl();
    quote! {#name #ty_generics}
}
