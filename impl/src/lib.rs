extern crate proc_macro;

mod am_data;
mod gen_handler;

use am_data::{derive_am_data, MsgKind};

use proc_macro::TokenStream;
use proc_macro_error::{abort_call_site, proc_macro_error};
use quote::quote;
use syn::parse_macro_input;
use syn::punctuated::Punctuated;

/// # Examples
///
///```
/// use active_messenger::active_messaging::prelude::*;
///
/// #[AmData(Debug,Clone)]
/// struct HelloWorld {
///    original_pe: usize,
///    greeting: String,
/// }
///```
#[allow(non_snake_case)]
#[proc_macro_error]
#[proc_macro_attribute]
pub fn AmData(args: TokenStream, input: TokenStream) -> TokenStream {
    let args =
        parse_macro_input!(args with Punctuated<syn::Meta, syn::Token![,]>::parse_terminated);
    derive_am_data(input, args, quote! {__am}, MsgKind::Reflective)
}

/// # Examples
///
///```
/// use active_messenger::active_messaging::prelude::*;
///
/// #[AmRaw(Debug,PartialEq)]
/// struct Coord {
///    x: f64,
///    y: f64,
/// }
///```
#[allow(non_snake_case)]
#[proc_macro_error]
#[proc_macro_attribute]
pub fn AmRaw(args: TokenStream, input: TokenStream) -> TokenStream {
    let args =
        parse_macro_input!(args with Punctuated<syn::Meta, syn::Token![,]>::parse_terminated);
    derive_am_data(input, args, quote! {__am}, MsgKind::Raw)
}

/// # Examples
///
///```
/// use active_messenger::active_messaging::prelude::*;
///
/// #[AmRaw(Debug)]
/// struct Shape {
///    rows: u32,
///    cols: u32,
/// }
///
/// #[AmParserdes(Debug)]
/// struct Matrix {
///    shape: Shape,
///    values: Vec<f64>,
/// }
///
/// impl Parserdes for Matrix {
///     type Header = Shape;
///     type Body = Vec<f64>;
///     fn split(self) -> (Shape, Vec<f64>) {
///         (self.shape, self.values)
///     }
///     fn join(shape: Shape, values: Vec<f64>) -> Matrix {
///         Matrix { shape, values }
///     }
/// }
///```
#[allow(non_snake_case)]
#[proc_macro_error]
#[proc_macro_attribute]
pub fn AmParserdes(args: TokenStream, input: TokenStream) -> TokenStream {
    let args =
        parse_macro_input!(args with Punctuated<syn::Meta, syn::Token![,]>::parse_terminated);
    derive_am_data(input, args, quote! {__am}, MsgKind::Parserdes)
}

/// # Examples
///
///```
/// use active_messenger::active_messaging::prelude::*;
///
/// #[AmData(Debug,Clone)]
/// struct HelloWorld {
///    original_pe: usize,
/// }
///
/// #[active_fn]
/// fn hello_world(am: &ActiveMessenger, msg: HelloWorld) {
///     println!(
///         "Hello World on PE {:?} of {:?}, received from PE {:?}",
///         am.my_pe(),
///         am.num_pes(),
///         msg.original_pe,
///     );
/// }
///
/// fn main() {
///     let am = MessengerBuilder::new().build();
///     //Send a Hello World Active Message to all other pes
///     am.broadcast_msg::<HelloWorld, hello_world>(HelloWorld {
///         original_pe: am.my_pe(),
///     });
///     am.progress();
/// }
///```
#[proc_macro_error]
#[proc_macro_attribute]
pub fn active_fn(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        abort_call_site!("#[active_fn] does not take any arguments");
    }
    let input: syn::Item = parse_macro_input!(input);
    match input {
        syn::Item::Fn(input) => gen_handler::generate_active_fn(input, &quote! {__am}),
        _ => abort_call_site!("#[active_fn] is only valid on functions"),
    }
}

/// # Examples
///
///```
/// use active_messenger::active_messaging::prelude::*;
///
/// #[derive(Default)]
/// struct Accumulate;
///
/// #[am_functor]
/// impl ActiveFunctor<u64> for Accumulate {
///     fn call(&self, am: &ActiveMessenger, val: u64) {
///         println!("PE {} received {}", am.my_pe(), val);
///     }
/// }
///
/// fn main() {
///     let am = MessengerBuilder::new().build();
///     am.send_msg_functor::<Accumulate, u64>(am.my_pe(), 42);
///     am.progress();
/// }
///```
#[proc_macro_error]
#[proc_macro_attribute]
pub fn am_functor(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        abort_call_site!("#[am_functor] does not take any arguments");
    }
    let input: syn::Item = parse_macro_input!(input);
    match input {
        syn::Item::Impl(input) => gen_handler::generate_am_functor(input, &quote! {__am}),
        _ => abort_call_site!("#[am_functor] is only valid on `impl ActiveFunctor<M> for T` blocks"),
    }
}
