use fxhash::FxHashSet;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{Attribute, Expr, ItemFn, ItemStruct, Lit, LitStr, Meta, MetaNameValue, Token};

#[derive(Default)]
struct ModelArgs {
    rename_all: Option<LitStr>,
    deny_unknown_fields: Option<bool>,
}

#[derive(Default)]
struct ExistingSerde {
    rename_all: Option<LitStr>,
    deny_unknown_fields: bool,
}

/// Expands `#[api_model]`.
pub fn expand_api_model(args: TokenStream, input: ItemStruct) -> TokenStream {
    match model_attrs(args, &input) {
        Ok(attrs) => quote! {
            #attrs
            #input
        },
        Err(err) => err.to_compile_error(),
    }
}

/// Expands `#[api_handler]`.
pub fn expand_api_handler(args: TokenStream, input: ItemFn) -> TokenStream {
    let ItemFn { attrs, vis, sig, block } = input;
    quote! {
        #(#attrs)*
        #[allow(clippy::unused_async)]
        #[cfg_attr(feature = "server", ::utoipa::path(#args))]
        #vis #sig #block
    }
}

fn model_attrs(args: TokenStream, input: &ItemStruct) -> syn::Result<TokenStream> {
    let args = parse_args(args)?;
    let existing = existing_serde(&input.attrs)?;
    let derives = derive_names(&input.attrs);

    let mut missing = Vec::new();
    for (name, path) in [
        ("Debug", quote!(Debug)),
        ("Serialize", quote!(::serde::Serialize)),
        ("Deserialize", quote!(::serde::Deserialize)),
    ] {
        if !derives.contains(name) {
            missing.push(path);
        }
    }
    let derive = if missing.is_empty() { quote!() } else { quote!(#[derive(#(#missing),*)]) };

    let schema = if derives.contains("ToSchema") {
        quote!()
    } else {
        quote!(#[cfg_attr(feature = "server", derive(::utoipa::ToSchema))])
    };

    let wanted = args.rename_all.unwrap_or_else(|| LitStr::new("camelCase", Span::call_site()));
    let rename = match &existing.rename_all {
        Some(current) if current.value() != wanted.value() => {
            return Err(syn::Error::new_spanned(
                current,
                "serde(rename_all) conflicts with api_model; drop one of them",
            ));
        },
        Some(_) => quote!(),
        None => quote!(#[serde(rename_all = #wanted)]),
    };

    let deny = match (args.deny_unknown_fields.unwrap_or(true), existing.deny_unknown_fields) {
        (true, true) => quote!(),
        (true, false) => quote!(#[serde(deny_unknown_fields)]),
        (false, false) => quote!(),
        (false, true) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "serde(deny_unknown_fields) is set explicitly; remove it before disabling",
            ));
        },
    };

    Ok(quote! {
        #derive
        #schema
        #rename
        #deny
    })
}

fn parse_args(args: TokenStream) -> syn::Result<ModelArgs> {
    let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse2(args)?;
    let mut parsed = ModelArgs::default();

    for meta in metas {
        let Meta::NameValue(nv) = meta else {
            return Err(syn::Error::new_spanned(meta, "expected `key = value` arguments"));
        };
        if nv.path.is_ident("rename_all") {
            if parsed.rename_all.is_some() {
                return Err(syn::Error::new_spanned(&nv, "duplicate `rename_all`"));
            }
            parsed.rename_all = Some(string_value(&nv)?);
        } else if nv.path.is_ident("deny_unknown_fields") {
            if parsed.deny_unknown_fields.is_some() {
                return Err(syn::Error::new_spanned(&nv, "duplicate `deny_unknown_fields`"));
            }
            parsed.deny_unknown_fields = Some(bool_value(&nv)?);
        } else {
            return Err(syn::Error::new_spanned(
                &nv.path,
                "unsupported argument, expected `rename_all` or `deny_unknown_fields`",
            ));
        }
    }

    Ok(parsed)
}

fn string_value(nv: &MetaNameValue) -> syn::Result<LitStr> {
    if let Expr::Lit(expr) = &nv.value
        && let Lit::Str(lit) = &expr.lit
    {
        return Ok(lit.clone());
    }
    Err(syn::Error::new_spanned(&nv.value, "expected a string literal"))
}

fn bool_value(nv: &MetaNameValue) -> syn::Result<bool> {
    if let Expr::Lit(expr) = &nv.value
        && let Lit::Bool(lit) = &expr.lit
    {
        return Ok(lit.value);
    }
    Err(syn::Error::new_spanned(&nv.value, "expected a boolean literal"))
}

fn existing_serde(attrs: &[Attribute]) -> syn::Result<ExistingSerde> {
    let mut found = ExistingSerde::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                found.rename_all = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("deny_unknown_fields") {
                found.deny_unknown_fields = true;
            } else if meta.input.peek(Token![=]) {
                // Skip values of serde options we do not care about.
                let _: Expr = meta.value()?.parse()?;
            }
            Ok(())
        })?;
    }
    Ok(found)
}

fn derive_names(attrs: &[Attribute]) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("derive")) {
        let _ = attr.parse_nested_meta(|meta| {
            if let Some(segment) = meta.path.segments.last() {
                names.insert(segment.ident.to_string());
            }
            Ok(())
        });
    }
    names
}
