//! Attribute macros for async entry points and tests.
//!
//! `#[core_async::main]` and `#[core_async::test]` turn an `async fn` into a
//! synchronous function that drives the body on a current-thread runtime from
//! `core_async::runtime`. The test macro accepts `start_paused = true` to run
//! the body on a runtime whose clock is paused (requires the `test-util`
//! feature of `core-async`).

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitBool};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = TestOptions::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("start_paused") {
            let value: LitBool = meta.value()?.parse()?;
            options.start_paused = value.value;
            Ok(())
        } else {
            Err(meta.error("unsupported core_async::test option; expected `start_paused`"))
        }
    });
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemFn);
    match expand(input, MacroKind::Test(options)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let tokens = proc_macro2::TokenStream::from(attr);
        return syn::Error::new_spanned(tokens, "core_async::main does not accept arguments")
            .to_compile_error()
            .into();
    }

    let input = parse_macro_input!(item as ItemFn);
    match expand(input, MacroKind::Main) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct TestOptions {
    start_paused: bool,
}

enum MacroKind {
    Test(TestOptions),
    Main,
}

fn expand(input: ItemFn, kind: MacroKind) -> syn::Result<proc_macro2::TokenStream> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        ));
    }

    let mut sig = input.sig;
    sig.asyncness = None;
    let attrs = input.attrs;
    let vis = input.vis;
    let body = input.block;

    let tokens = match kind {
        MacroKind::Test(options) => {
            let runner = if options.start_paused {
                quote!(core_async::runtime::block_on_paused)
            } else {
                quote!(core_async::runtime::block_on)
            };
            quote! {
                #(#attrs)*
                #[test]
                #vis #sig {
                    #runner(async move #body)
                }
            }
        }
        MacroKind::Main => quote! {
            #(#attrs)*
            #vis #sig {
                core_async::runtime::block_on(async move #body)
            }
        },
    };

    Ok(tokens)
}
