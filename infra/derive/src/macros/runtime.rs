use proc_macro2::TokenStream;
use quote::quote;
use syn::{Error, Ident, ItemFn, ReturnType, Type};

/// Expands `#[lithium_runtime::main(profile)]`.
#[must_use]
pub fn expand_main(args: TokenStream, input: ItemFn) -> TokenStream {
    if input.sig.asyncness.is_none() {
        return Error::new_spanned(
            input.sig.fn_token,
            "#[lithium_runtime::main] can only be applied to an async fn",
        )
        .to_compile_error();
    }
    if !returns_result(&input.sig.output) {
        return Error::new_spanned(
            &input.sig.ident,
            "#[lithium_runtime::main] requires the function to return a Result",
        )
        .to_compile_error();
    }

    let preset = match preset(args) {
        Ok(preset) => preset,
        Err(err) => return err.to_compile_error(),
    };

    let ItemFn { attrs, vis, sig, block } = input;
    let ident = &sig.ident;
    let output = &sig.output;

    quote! {
        #(#attrs)*
        #vis fn #ident() #output {
            let config = #preset;
            let runtime = ::lithium_runtime::build_runtime_with_config(&config)?;
            runtime.block_on(async move #block)
        }
    }
}

fn preset(args: TokenStream) -> syn::Result<TokenStream> {
    if args.is_empty() {
        return Ok(quote! { ::lithium_runtime::RuntimeConfig::default() });
    }

    let profile: Ident = syn::parse2(args)?;
    let ctor = match profile.to_string().as_str() {
        "high_performance" => quote! { high_performance() },
        "memory_efficient" => quote! { memory_efficient() },
        "default" => quote! { default() },
        _ => {
            return Err(Error::new_spanned(
                profile,
                "unknown runtime profile, expected one of: high_performance, memory_efficient, default",
            ));
        },
    };
    Ok(quote! { ::lithium_runtime::RuntimeConfig::#ctor })
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Path(path) => path.path.segments.last().is_some_and(|s| s.ident == "Result"),
            _ => false,
        },
        ReturnType::Default => false,
    }
}
