use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, ExprUnary, Field, Fields, Lit, Meta, Path, Token,
    Type, UnOp, parse_macro_input,
};

/// Derives `Declared`, `FieldType` and `Record` for a struct with named fields.
///
/// Container attributes, in `#[record(...)]`:
/// - `extends(A, B, ...)`: inherit options from records or option-only bases;
/// - any class option, e.g. `store_type = "name"`, `suppress_defaults = false`, `flatten`.
///
/// Field attributes, in `#[record(...)]`:
/// - `default` (uses `Default::default()`) or `default = expr`;
/// - `skip`: leave the field out of the record entirely; it is rebuilt with `Default`;
/// - any field option, e.g. `alias = "n"`, `suppress`, `args("-n", "--name")`.
///
/// Option names and value kinds are checked when the record's schema is first built.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_record(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.into_compile_error()),
    }
}

/// Derives `FieldType` for an enum whose variants each wrap one record type.
///
/// Decoding picks the variant from the `"type"` key when present, otherwise from the
/// single variant whose fields fit the mapping.
#[proc_macro_derive(Union)]
pub fn derive_union(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_union(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.into_compile_error()),
    }
}

fn resolve_runtime_crate() -> syn::Result<Path> {
    match crate_name("fancy-record") {
        // Inside the fancy-record package `crate` would name the test or example crate,
        // so the library's `extern crate self as fancy_record` alias is used instead.
        Ok(FoundCrate::Itself) => Ok(syn::parse_quote!(::fancy_record)),
        Ok(FoundCrate::Name(name)) => {
            let ident = syn::Ident::new(&name.replace('-', "_"), Span::call_site());
            Ok(syn::parse_quote!(::#ident))
        }
        Err(_) => Err(syn::Error::new(
            Span::call_site(),
            "could not resolve `fancy-record`; add it as a dependency (renamed dependencies are supported)",
        )),
    }
}

const UNSUPPORTED_RECORD_ATTR_HINT: &str = "unsupported #[record(...)] attribute; hint: use `name`, `name = literal` or `name(\"a\", \"b\")`";

#[derive(Default)]
struct ContainerAttrs {
    parents: Vec<Path>,
    options: Vec<(String, TokenStream2)>,
}

enum DefaultValue {
    Trait,
    Expr(Expr),
}

#[derive(Default)]
struct FieldAttrs {
    default: Option<DefaultValue>,
    skip: bool,
    options: Vec<(String, TokenStream2)>,
}

fn expand_record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let krate = resolve_runtime_crate()?;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic types; hint: wrap a concrete instantiation in its own struct",
        ));
    }
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    input,
                    "tuple structs are not supported; hint: use a struct with named fields",
                ));
            }
            Fields::Unit => {
                return Err(syn::Error::new_spanned(
                    input,
                    "unit structs are not supported; hint: use a struct with named fields",
                ));
            }
        },
        Data::Enum(data) => {
            return Err(syn::Error::new(
                data.enum_token.span(),
                "Record is for structs; hint: derive `Union` for an enum of record variants",
            ));
        }
        Data::Union(union) => {
            return Err(syn::Error::new(
                union.union_token.span(),
                "Record does not support `union` items; hint: use a struct instead",
            ));
        }
    };

    let name = &input.ident;
    let name_str = name.unraw().to_string();
    let qual_suffix = format!("::{name_str}");
    let container = parse_container_attrs(&input.attrs, &krate)?;

    let doc = collect_doc(&input.attrs).map(|doc| quote!(.doc(#doc)));
    let class_options = container.options.iter().map(|(option, value)| {
        quote!(.option(#option, #value))
    });
    let parents = container.parents.iter().map(|parent| {
        quote!(.extends(#krate::RecordRef::of::<#parent>()))
    });

    let mut field_decls = Vec::new();
    let mut to_data = Vec::new();
    let mut from_data = Vec::new();
    for field in fields {
        let attrs = parse_field_attrs(field, &krate)?;
        let Some(ident) = &field.ident else {
            continue;
        };
        if attrs.skip {
            if attrs.default.is_some() || !attrs.options.is_empty() {
                return Err(syn::Error::new_spanned(
                    field,
                    "a skipped field takes no other #[record(...)] keys; hint: remove `skip` or the other keys",
                ));
            }
            from_data.push(quote!(#ident: ::core::default::Default::default()));
            continue;
        }

        let ty = &field.ty;
        let field_name = ident.unraw().to_string();
        let default = attrs.default.as_ref().map(|default| {
            let value = default_tokens(default, ty);
            quote! {
                .default_fn(|| {
                    let value: #ty = #value;
                    <#ty as #krate::FieldType>::to_data(&value)
                })
            }
        });
        let doc = collect_doc(&field.attrs).map(|doc| quote!(.doc(#doc)));
        let options = attrs
            .options
            .iter()
            .map(|(option, value)| quote!(.option(#option, #value)));
        field_decls.push(quote! {
            .field(
                #krate::FieldDecl::new(#field_name, <#ty as #krate::FieldType>::type_decl)
                    #default
                    #doc
                    #(#options)*
            )
        });
        to_data.push(quote! {
            .with(#field_name, <#ty as #krate::FieldType>::to_data(&self.#ident))
        });
        from_data.push(quote! {
            #ident: <#ty as #krate::FieldType>::from_data(record.take(#field_name)?)
                .map_err(|err| err.with_path_prefix(#field_name))?
        });
    }

    Ok(quote! {
        impl #krate::Declared for #name {
            fn declaration() -> &'static #krate::Declaration {
                static DECLARATION: ::std::sync::OnceLock<#krate::Declaration> =
                    ::std::sync::OnceLock::new();
                DECLARATION.get_or_init(|| {
                    #krate::Declaration::record(#name_str, concat!(module_path!(), #qual_suffix))
                        #doc
                        #(#parents)*
                        #(#class_options)*
                        #(#field_decls)*
                })
            }
        }

        impl #krate::FieldType for #name {
            fn type_decl() -> #krate::TypeDecl {
                #krate::TypeDecl::Record(#krate::RecordRef::of::<Self>())
            }

            fn to_data(&self) -> #krate::Data {
                #krate::Data::Record(
                    #krate::RecordData::new(#krate::RecordRef::of::<Self>())
                        #(#to_data)*
                )
            }

            fn from_data(data: #krate::Data) -> ::core::result::Result<Self, #krate::ConversionError> {
                #[allow(unused_mut, unused_variables)]
                let mut record = data.into_record(#krate::RecordRef::of::<Self>())?;
                ::core::result::Result::Ok(Self {
                    #(#from_data,)*
                })
            }
        }

        impl #krate::Record for #name {}
    })
}

fn default_tokens(default: &DefaultValue, ty: &Type) -> TokenStream2 {
    match default {
        DefaultValue::Trait => quote!(<#ty as ::core::default::Default>::default()),
        // String literals also initialize `String` fields.
        DefaultValue::Expr(
            expr @ Expr::Lit(ExprLit {
                lit: Lit::Str(_), ..
            }),
        ) => quote!(::core::convert::Into::into(#expr)),
        DefaultValue::Expr(expr) => quote!(#expr),
    }
}

fn expand_union(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let krate = resolve_runtime_crate()?;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Union cannot be derived for generic types",
        ));
    }
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Union is for enums; hint: one newtype variant per record type",
        ));
    };

    let name = &input.ident;
    let name_str = name.unraw().to_string();
    let mut members = Vec::new();
    let mut to_data = Vec::new();
    let mut from_data = Vec::new();
    let mut variant_names = Vec::new();
    for variant in &data.variants {
        let ty = match &variant.fields {
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => &fields.unnamed[0].ty,
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "every Union variant wraps exactly one record; hint: write `Variant(RecordType)`",
                ));
            }
        };
        let ident = &variant.ident;
        variant_names.push(ident.unraw().to_string());
        members.push(quote!(<#ty as #krate::FieldType>::type_decl()));
        to_data.push(quote! {
            Self::#ident(inner) => <#ty as #krate::FieldType>::to_data(inner)
        });
        from_data.push(quote! {
            if let #krate::TypeDecl::Record(member) = <#ty as #krate::FieldType>::type_decl() {
                if member == found {
                    return <#ty as #krate::FieldType>::from_data(data).map(Self::#ident);
                }
            }
        });
    }
    if members.is_empty() {
        return Err(syn::Error::new_spanned(
            input,
            "a Union needs at least one variant",
        ));
    }
    let expected = format!("one of {}", variant_names.join(", "));

    Ok(quote! {
        impl #krate::FieldType for #name {
            fn type_decl() -> #krate::TypeDecl {
                #krate::TypeDecl::Union {
                    name: #name_str,
                    members: ::std::vec![#(#members),*],
                }
            }

            fn to_data(&self) -> #krate::Data {
                match self {
                    #(#to_data,)*
                }
            }

            fn from_data(data: #krate::Data) -> ::core::result::Result<Self, #krate::ConversionError> {
                let found = match &data {
                    #krate::Data::Record(record) => record.record(),
                    other => {
                        return ::core::result::Result::Err(
                            #krate::ConversionError::type_mismatch(#expected, other.kind()),
                        );
                    }
                };
                #(#from_data)*
                ::core::result::Result::Err(#krate::ConversionError::type_mismatch(
                    #expected,
                    ::std::format!("record `{}`", found.name()),
                ))
            }
        }
    })
}

fn parse_container_attrs(attrs: &[Attribute], krate: &Path) -> syn::Result<ContainerAttrs> {
    let mut out = ContainerAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        for meta in parse_meta_list(attr)? {
            match meta {
                Meta::List(list) if list.path.is_ident("extends") => {
                    let parents =
                        list.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)?;
                    out.parents.extend(parents);
                }
                Meta::Path(path) if path.is_ident("default") || path.is_ident("skip") => {
                    return Err(syn::Error::new_spanned(
                        path,
                        "`default` and `skip` are field attributes; hint: move them onto a field",
                    ));
                }
                other => out.options.push(parse_option(&other, krate)?),
            }
        }
    }
    Ok(out)
}

fn parse_field_attrs(field: &Field, krate: &Path) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        for meta in parse_meta_list(attr)? {
            match meta {
                Meta::Path(path) if path.is_ident("default") => {
                    out.default = Some(DefaultValue::Trait);
                }
                Meta::NameValue(meta) if meta.path.is_ident("default") => {
                    out.default = Some(DefaultValue::Expr(meta.value));
                }
                Meta::Path(path) if path.is_ident("skip") => {
                    out.skip = true;
                }
                other => out.options.push(parse_option(&other, krate)?),
            }
        }
    }
    Ok(out)
}

/// One generic option: `name` (true), `name = literal` or `name("a", "b", ...)`.
fn parse_option(meta: &Meta, krate: &Path) -> syn::Result<(String, TokenStream2)> {
    let Some(ident) = meta.path().get_ident() else {
        return Err(syn::Error::new_spanned(meta, UNSUPPORTED_RECORD_ATTR_HINT));
    };
    let name = ident.to_string();
    let value = match meta {
        Meta::Path(_) => quote!(#krate::OptionValue::Bool(true)),
        Meta::NameValue(meta) => parse_option_value(&meta.value, krate)?,
        Meta::List(list) => {
            let items = list.parse_args_with(Punctuated::<Lit, Token![,]>::parse_terminated)?;
            let items = items
                .iter()
                .map(|lit| lit_to_string(lit, lit.span()))
                .collect::<syn::Result<Vec<_>>>()?;
            quote!(#krate::OptionValue::List(::std::vec![#(::std::string::String::from(#items)),*]))
        }
    };
    Ok((name, value))
}

fn parse_option_value(expr: &Expr, krate: &Path) -> syn::Result<TokenStream2> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Bool(value) => {
                let value = value.value;
                Ok(quote!(#krate::OptionValue::Bool(#value)))
            }
            Lit::Int(value) => {
                let value = value.base10_parse::<i64>()?;
                Ok(quote!(#krate::OptionValue::Int(#value)))
            }
            Lit::Str(value) => {
                let value = value.value();
                Ok(quote!(#krate::OptionValue::Str(::std::string::String::from(#value))))
            }
            other => Err(syn::Error::new_spanned(
                other,
                "expected a bool, integer or string literal; hint: wrap the value in quotes",
            )),
        },
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr: inner,
            ..
        }) => match inner.as_ref() {
            Expr::Lit(ExprLit {
                lit: Lit::Int(value),
                ..
            }) => {
                let value = -value.base10_parse::<i64>()?;
                Ok(quote!(#krate::OptionValue::Int(#value)))
            }
            _ => Err(syn::Error::new_spanned(expr, "expected an integer literal")),
        },
        _ => Err(syn::Error::new_spanned(
            expr,
            "expected a literal; hint: option values must be known at compile time",
        )),
    }
}

fn lit_to_string(lit: &Lit, span: Span) -> syn::Result<String> {
    match lit {
        Lit::Str(value) => Ok(value.value()),
        Lit::Int(value) => Ok(value.base10_digits().to_string()),
        Lit::Float(value) => Ok(value.base10_digits().to_string()),
        Lit::Bool(value) => Ok(value.value.to_string()),
        _ => Err(syn::Error::new(
            span,
            "expected string literal; hint: wrap the value in quotes",
        )),
    }
}

fn parse_meta_list(attr: &Attribute) -> syn::Result<Vec<Meta>> {
    let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
    Ok(metas.into_iter().collect())
}

/// Joins `///` lines, dropping the single leading space rustdoc adds.
fn collect_doc(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(meta) => match &meta.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(value),
                    ..
                }) => Some(value.value()),
                _ => None,
            },
            _ => None,
        })
        .map(|line| line.strip_prefix(' ').unwrap_or(&line).trim_end().to_string())
        .collect();
    let doc = lines.join("\n").trim().to_string();
    if doc.is_empty() { None } else { Some(doc) }
}
