use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{
    Ident, Item, LitStr, Result as SynResult, Token, Type, parse::Parse, parse::ParseStream,
    parse_macro_input, spanned::Spanned,
};

/// 命令宏
/// - 为目标类型实现 `::biz_application::command::Command`
/// - 支持参数：`#[command(name = "Catalog.CreateService", output = Uuid)]`
/// - `name` 默认为类型名，`output` 默认为 `()`
#[proc_macro_attribute]
pub fn command(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as RequestAttrConfig);
    let input = parse_macro_input!(item as Item);

    match expand_request(&input, cfg, RequestMacro::Command) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// 查询宏
/// - 为目标类型实现 `::biz_application::query::Query`
/// - 支持参数：`#[query(name = "Catalog.GetService", dto = ServiceDto)]`
/// - `dto` 必填，`name` 默认为类型名
#[proc_macro_attribute]
pub fn query(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as RequestAttrConfig);
    let input = parse_macro_input!(item as Item);

    match expand_request(&input, cfg, RequestMacro::Query) {
        Ok(out) => out.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Clone, Copy)]
enum RequestMacro {
    Command,
    Query,
}

impl RequestMacro {
    fn attr_name(self) -> &'static str {
        match self {
            RequestMacro::Command => "command",
            RequestMacro::Query => "query",
        }
    }

    // 关联类型对应的键：command 为 output，query 为 dto
    fn type_key(self) -> &'static str {
        match self {
            RequestMacro::Command => "output",
            RequestMacro::Query => "dto",
        }
    }
}

fn expand_request(
    input: &Item,
    cfg: RequestAttrConfig,
    kind: RequestMacro,
) -> SynResult<proc_macro2::TokenStream> {
    let (ident, generics) = match input {
        Item::Struct(s) => (&s.ident, &s.generics),
        Item::Enum(e) => (&e.ident, &e.generics),
        other => {
            return Err(syn::Error::new(
                other.span(),
                format!("#[{}] only on struct or enum", kind.attr_name()),
            ));
        }
    };

    if let Some((key, _)) = &cfg.assoc_ty {
        if key != kind.type_key() {
            return Err(syn::Error::new(
                key.span(),
                format!(
                    "unknown key '{key}' in #[{}]; expected 'name' or '{}'",
                    kind.attr_name(),
                    kind.type_key()
                ),
            ));
        }
    }

    let name = cfg
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let out = match kind {
        RequestMacro::Command => {
            let output: Type = cfg
                .assoc_ty
                .map(|(_, ty)| ty)
                .unwrap_or_else(|| syn::parse_quote! { () });

            quote! {
                #input

                impl #impl_generics ::biz_application::command::Command for #ident #ty_generics #where_clause {
                    const NAME: &'static str = #name;
                    type Output = #output;
                }
            }
        }
        RequestMacro::Query => {
            let Some((_, dto)) = cfg.assoc_ty else {
                return Err(syn::Error::new(
                    ident.span(),
                    "#[query] requires a dto type, e.g. #[query(dto = ServiceDto)]",
                ));
            };

            quote! {
                #input

                impl #impl_generics ::biz_application::query::Query for #ident #ty_generics #where_clause {
                    const NAME: &'static str = #name;
                    type Dto = #dto;
                }
            }
        }
    };

    Ok(out)
}

// 解析请求宏键值参数：name = "<str>"、output/dto = <Type>
struct RequestAttrConfig {
    name: Option<LitStr>,
    assoc_ty: Option<(Ident, Type)>,
}

impl Parse for RequestAttrConfig {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let mut name: Option<LitStr> = None;
        let mut assoc_ty: Option<(Ident, Type)> = None;

        if input.is_empty() {
            return Ok(Self { name, assoc_ty });
        }

        let pairs: Punctuated<RequestAttrKv, Token![,]> =
            Punctuated::<RequestAttrKv, Token![,]>::parse_terminated(input)?;

        for kv in pairs.into_iter() {
            match kv {
                RequestAttrKv::Name(key, lit) => {
                    if name.is_some() {
                        return Err(syn::Error::new(
                            key.span(),
                            "duplicate key 'name' in attribute",
                        ));
                    }
                    if lit.value().trim().is_empty() {
                        return Err(syn::Error::new(lit.span(), "name must not be empty"));
                    }
                    name = Some(lit);
                }
                RequestAttrKv::Type(key, ty) => {
                    if assoc_ty.is_some() {
                        return Err(syn::Error::new(
                            key.span(),
                            format!("duplicate key '{key}' in attribute"),
                        ));
                    }
                    assoc_ty = Some((key, ty));
                }
            }
        }

        Ok(Self { name, assoc_ty })
    }
}

enum RequestAttrKv {
    Name(Ident, LitStr),
    Type(Ident, Type),
}

impl Parse for RequestAttrKv {
    fn parse(input: ParseStream) -> SynResult<Self> {
        let key: Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;

        if key == "name" {
            Ok(RequestAttrKv::Name(key, input.parse()?))
        } else {
            Ok(RequestAttrKv::Type(key, input.parse()?))
        }
    }
}
