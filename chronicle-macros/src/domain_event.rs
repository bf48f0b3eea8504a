use crate::aggregate_root::parse_bool;
use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, LitInt, LitStr, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[domain_event] 宏实现
/// - 支持具名字段结构体与单元结构体
/// - 生成 `::chronicle_domain::domain_event::EventType`
/// - 未声明 `hooks = true` 时生成空的 `EventPayload` 实现
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[domain_event] only on struct")
                .to_compile_error()
                .into();
        }
    };

    if let syn::Fields::Unnamed(fields) = &st.fields {
        return syn::Error::new(fields.span(), "#[domain_event] supports named-field or unit struct")
            .to_compile_error()
            .into();
    }

    let Some(origin) = cfg.origin else {
        return syn::Error::new(proc_macro2::Span::call_site(), "missing key 'origin'")
            .to_compile_error()
            .into();
    };
    let Some(aggregate_type) = cfg.aggregate_type else {
        return syn::Error::new(proc_macro2::Span::call_site(), "missing key 'aggregate_type'")
            .to_compile_error()
            .into();
    };
    let event_type = cfg
        .event_type
        .unwrap_or_else(|| LitStr::new(&st.ident.to_string(), st.ident.span()));
    let version = cfg
        .version
        .unwrap_or_else(|| LitInt::new("1", proc_macro2::Span::call_site()));

    apply_derives(
        &mut st.attrs,
        vec![
            syn::parse_quote!(Debug),
            syn::parse_quote!(Clone),
            syn::parse_quote!(serde::Serialize),
            syn::parse_quote!(serde::Deserialize),
        ],
    );

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let payload_impl = if cfg.hooks {
        quote! {}
    } else {
        quote! {
            impl #impl_generics ::chronicle_domain::domain_event::EventPayload for #ident #ty_generics #where_clause {}
        }
    };

    let expanded = quote! {
        #st

        impl #impl_generics ::chronicle_domain::domain_event::EventType for #ident #ty_generics #where_clause {
            const ORIGIN: &'static str = #origin;
            const AGGREGATE_TYPE: &'static str = #aggregate_type;
            const EVENT_TYPE: &'static str = #event_type;
            const VERSION: u32 = #version;
        }

        #payload_impl
    };

    TokenStream::from(expanded)
}

struct EventAttrConfig {
    origin: Option<LitStr>,
    aggregate_type: Option<LitStr>,
    event_type: Option<LitStr>,
    version: Option<LitInt>,
    hooks: bool,
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            origin: None,
            aggregate_type: None,
            event_type: None,
            version: None,
            hooks: false,
        };
        let mut hooks_seen = false;

        let pairs = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated(input)?;
        for pair in pairs {
            let Some(key) = pair.path.get_ident().map(ToString::to_string) else {
                return Err(syn::Error::new(pair.path.span(), "invalid attribute key"));
            };
            let duplicate = || {
                syn::Error::new(pair.path.span(), format!("duplicate key '{key}' in attribute"))
            };
            match key.as_str() {
                "origin" => set_once(&mut cfg.origin, str_lit(&pair.value)?, duplicate)?,
                "aggregate_type" => {
                    set_once(&mut cfg.aggregate_type, str_lit(&pair.value)?, duplicate)?
                }
                "event_type" => set_once(&mut cfg.event_type, str_lit(&pair.value)?, duplicate)?,
                "version" => set_once(&mut cfg.version, int_lit(&pair.value)?, duplicate)?,
                "hooks" => {
                    if hooks_seen {
                        return Err(duplicate());
                    }
                    hooks_seen = true;
                    cfg.hooks = parse_bool(&pair.value)?;
                }
                _ => {
                    return Err(syn::Error::new(
                        pair.path.span(),
                        "unknown key; expected 'origin' | 'aggregate_type' | 'event_type' | 'version' | 'hooks'",
                    ));
                }
            }
        }

        Ok(cfg)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, duplicate: impl Fn() -> syn::Error) -> Result<()> {
    if slot.is_some() {
        return Err(duplicate());
    }
    *slot = Some(value);
    Ok(())
}

fn str_lit(expr: &syn::Expr) -> Result<LitStr> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Ok(lit.clone()),
        other => Err(syn::Error::new(other.span(), "expected string literal")),
    }
}

fn int_lit(expr: &syn::Expr) -> Result<LitInt> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(lit),
            ..
        }) => {
            lit.base10_parse::<u32>()?;
            Ok(lit.clone())
        }
        other => Err(syn::Error::new(other.span(), "expected integer literal")),
    }
}
