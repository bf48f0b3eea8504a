use crate::utils::{apply_derives, ensure_leading_fields};
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[aggregate_root] 宏实现
/// - 注入 `root` 字段并置于最前（已存在则沿用）
/// - 实现 `::chronicle_domain::aggregate::AggregateRoot`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as AggregateRootConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[aggregate_root] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let state_ty: Type = syn::parse_quote! { ::chronicle_domain::aggregate::AggregateState };
    ensure_leading_fields(fields_named, &[("root", &state_ty)]);

    let mut required: Vec<syn::Path> = vec![
        syn::parse_quote!(Clone),
        syn::parse_quote!(Default),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    if cfg.derive_debug {
        required.insert(0, syn::parse_quote!(Debug));
    }
    apply_derives(&mut st.attrs, required);

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let expanded = quote! {
        #st

        impl #impl_generics ::chronicle_domain::aggregate::AggregateRoot for #ident #ty_generics #where_clause {
            fn root(&self) -> &::chronicle_domain::aggregate::AggregateState {
                &self.root
            }

            fn root_mut(&mut self) -> &mut ::chronicle_domain::aggregate::AggregateState {
                &mut self.root
            }
        }
    };

    TokenStream::from(expanded)
}

struct AggregateRootConfig {
    derive_debug: bool,
}

impl Parse for AggregateRootConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut derive_debug: Option<bool> = None;

        let pairs = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated(input)?;
        for pair in pairs {
            if !pair.path.is_ident("debug") {
                return Err(syn::Error::new(pair.path.span(), "unknown key; expected 'debug'"));
            }
            if derive_debug.is_some() {
                return Err(syn::Error::new(pair.path.span(), "duplicate key 'debug' in attribute"));
            }
            derive_debug = Some(parse_bool(&pair.value)?);
        }

        Ok(Self {
            derive_debug: derive_debug.unwrap_or(true),
        })
    }
}

pub(crate) fn parse_bool(expr: &syn::Expr) -> Result<bool> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Bool(b),
            ..
        }) => Ok(b.value),
        other => Err(syn::Error::new(other.span(), "expected boolean literal")),
    }
}
