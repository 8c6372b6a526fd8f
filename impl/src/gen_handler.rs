use proc_macro::TokenStream;
use proc_macro_error::abort;
use quote::quote;
use syn::spanned::Spanned;

fn typed_arg(arg: &syn::FnArg) -> &syn::PatType {
    match arg {
        syn::FnArg::Typed(pat) => pat,
        syn::FnArg::Receiver(recv) => abort!(
            recv.span(),
            "#[active_fn] handlers are free functions, they cannot take self"
        ),
    }
}

fn msg_type(arg: &syn::PatType) -> syn::Type {
    match &*arg.ty {
        syn::Type::Reference(ty) => abort!(
            ty.span(),
            "active messages are passed by value, remove the reference";
            help = "a handler has the form `fn name(msg: M)` or `fn name(am: &ActiveMessenger, msg: M)`"
        ),
        ty => ty.clone(),
    }
}

pub(crate) fn generate_active_fn(input: syn::ItemFn, am: &proc_macro2::TokenStream) -> TokenStream {
    let sig = &input.sig;
    let name = &sig.ident;
    let vis = &input.vis;

    if sig.asyncness.is_some() {
        abort!(sig.asyncness.span(), "#[active_fn] handlers run to completion and cannot be async");
    }
    if !sig.generics.params.is_empty() {
        abort!(
            sig.generics.span(),
            "#[active_fn] handlers cannot be generic, every node must resolve them to the same id"
        );
    }
    if let syn::ReturnType::Type(_, ty) = &sig.output {
        abort!(
            ty.span(),
            "#[active_fn] handlers do not return a value, reply with another active message instead"
        );
    }

    let args = sig.inputs.iter().map(typed_arg).collect::<Vec<_>>();
    let (msg_ty, call) = match args.as_slice() {
        [msg] => (msg_type(msg), quote! {#name(msg)}),
        [_am, msg] => (msg_type(msg), quote! {#name(am, msg)}),
        _ => abort!(
            sig.inputs.span(),
            "expected `fn {}(msg: M)` or `fn {}(am: &ActiveMessenger, msg: M)`",
            name,
            name
        ),
    };

    let handler_name = quote! {concat!(module_path!(), "::", stringify!(#name))};

    let expanded = quote! {
        impl #am::active_messaging::ActiveFn<#msg_ty> for #name {
            const NAME: &'static str = #handler_name;
            fn call(am: &#am::ActiveMessenger, msg: #msg_ty) {
                #call
            }
        }

        fn __exec(am: &#am::ActiveMessenger, msg: #am::ActiveMsg) {
            <#name as #am::active_messaging::ActiveFn<#msg_ty>>::call(am, msg.take::<#msg_ty>())
        }

        #am::inventory::submit! {
            #am::active_messaging::RegisteredHandler {
                exec: __exec,
                name: #handler_name,
                functor: false,
            }
        }
    };

    let output = quote! {
        #[allow(non_camel_case_types, dead_code)]
        #[doc(hidden)]
        #vis struct #name {}

        #input

        const _: () = {
            extern crate active_messenger as __am;
            #expanded
        };
    };
    TokenStream::from(output)
}

fn functor_msg_type(path: &syn::Path) -> syn::Type {
    let seg = match path.segments.last() {
        Some(seg) if seg.ident == "ActiveFunctor" => seg,
        _ => abort!(
            path.span(),
            "#[am_functor] expects an `impl ActiveFunctor<M> for T` block"
        ),
    };
    match &seg.arguments {
        syn::PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(syn::GenericArgument::Type(ty)) if args.args.len() == 1 => ty.clone(),
            _ => abort!(args.span(), "ActiveFunctor takes exactly one message type"),
        },
        _ => abort!(seg.span(), "missing message type, expected `ActiveFunctor<M>`"),
    }
}

pub(crate) fn generate_am_functor(
    input: syn::ItemImpl,
    am: &proc_macro2::TokenStream,
) -> TokenStream {
    let path = match &input.trait_ {
        Some((None, path, _)) => path.clone(),
        _ => abort!(
            input.self_ty.span(),
            "#[am_functor] expects an `impl ActiveFunctor<M> for T` block"
        ),
    };
    if !input.generics.params.is_empty() {
        abort!(
            input.generics.span(),
            "#[am_functor] implementations cannot be generic, register each concrete type separately"
        );
    }
    let msg_ty = functor_msg_type(&path);
    let self_ty = &input.self_ty;

    let handler_name = quote! {
        concat!(module_path!(), "::", stringify!(#self_ty), "<", stringify!(#msg_ty), ">")
    };

    let output = quote! {
        #input

        const _: () = {
            extern crate active_messenger as __am;
            impl #am::active_messaging::RegisteredFunctor<#msg_ty> for #self_ty {
                const NAME: &'static str = #handler_name;
            }

            #am::inventory::submit! {
                #am::active_messaging::RegisteredHandler {
                    exec: #am::active_messaging::exec_functor::<#msg_ty, #self_ty>,
                    name: #handler_name,
                    functor: true,
                }
            }
        };
    };
    TokenStream::from(output)
}
