#![doc = include_str!("../README.md")]

use proc_macro::TokenStream;
use quote::quote;
use std::collections::HashSet;
use syn::{
    parse_macro_input, Data, DeriveInput, Error, Fields, Ident, Lit, Meta, NestedMeta, Variant,
};

struct ExitAttr {
    code: u8,
    name: String,
    fatal: bool,
}

fn exit_attr(variant: &Variant) -> syn::Result<ExitAttr> {
    if !matches!(variant.fields, Fields::Unit) {
        return Err(Error::new_spanned(variant, "ExitStatus variants must be unit variants"));
    }

    let attr = variant
        .attrs
        .iter()
        .find(|attr| attr.path.is_ident("exit"))
        .ok_or_else(|| {
            Error::new_spanned(variant, "missing #[exit(code = .., name = \"..\")]")
        })?;

    let list = match attr.parse_meta()? {
        Meta::List(list) => list,
        other => return Err(Error::new_spanned(other, "expected #[exit(..)]")),
    };

    let (mut code, mut name, mut fatal) = (None, None, false);
    for nested in list.nested {
        match nested {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("code") => match &nv.lit {
                Lit::Int(lit) => code = Some(lit.base10_parse::<u8>()?),
                lit => return Err(Error::new_spanned(lit, "exit code must be an integer 0..=255")),
            },
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => match &nv.lit {
                Lit::Str(lit) => name = Some(lit.value()),
                lit => return Err(Error::new_spanned(lit, "name must be a string")),
            },
            NestedMeta::Meta(Meta::Path(path)) if path.is_ident("fatal") => fatal = true,
            other => return Err(Error::new_spanned(other, "unknown exit attribute")),
        }
    }

    Ok(ExitAttr {
        code: code.ok_or_else(|| Error::new_spanned(attr, "missing `code = ..`"))?,
        name: name.ok_or_else(|| Error::new_spanned(attr, "missing `name = \"..\"`"))?,
        fatal,
    })
}

fn expand_exit_status(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ty = input.ident;
    let data = match input.data {
        Data::Enum(data) => data,
        _ => return Err(Error::new_spanned(ty, "ExitStatus can only be derived for enums")),
    };

    let mut idents: Vec<Ident> = Vec::new();
    let mut attrs: Vec<ExitAttr> = Vec::new();
    let (mut codes_seen, mut names_seen) = (HashSet::new(), HashSet::new());

    for variant in &data.variants {
        let attr = exit_attr(variant)?;
        if !codes_seen.insert(attr.code) {
            return Err(Error::new_spanned(variant, format!("exit code {} reused", attr.code)));
        }
        if !names_seen.insert(attr.name.clone()) {
            return Err(Error::new_spanned(variant, format!("name {:?} reused", attr.name)));
        }
        idents.push(variant.ident.clone());
        attrs.push(attr);
    }

    let codes: Vec<u8> = attrs.iter().map(|a| a.code).collect();
    let names: Vec<&str> = attrs.iter().map(|a| a.name.as_str()).collect();
    let fatal: Vec<bool> = attrs.iter().map(|a| a.fatal).collect();

    let serialize = if cfg!(feature = "serialize") {
        quote! {
            impl serde::ser::Serialize for #ty {
                fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serializer.serialize_str(self.name())
                }
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #ty {
            /// Every variant, in declaration order
            pub const VARIANTS: &'static [#ty] = &[#(#ty::#idents),*];

            /// Process exit status for this outcome
            pub fn exit_code(&self) -> u8 {
                match self {
                    #(#ty::#idents => #codes,)*
                }
            }

            /// Whether the consuming build should stop
            pub fn is_fatal(&self) -> bool {
                match self {
                    #(#ty::#idents => #fatal,)*
                }
            }

            /// Stable machine-readable name
            pub fn name(&self) -> &'static str {
                match self {
                    #(#ty::#idents => #names,)*
                }
            }

            /// Outcome a process exit status stands for
            pub fn from_exit_code(code: u8) -> ::std::option::Option<Self> {
                match code {
                    #(#codes => ::std::option::Option::Some(#ty::#idents),)*
                    _ => ::std::option::Option::None,
                }
            }
        }

        impl ::std::fmt::Display for #ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }

        #serialize
    })
}

/// Derive the exit-status contract of a probe outcome enum
///
/// Every variant is a unit variant annotated with `#[exit(code = N, name = "..")]`, plus
/// `fatal` when the consuming build must stop on it. Codes and names must be unique.
///
/// Generates `VARIANTS`, `exit_code()`, `is_fatal()`, `name()`, `from_exit_code()` and
/// `Display` (the name). With the `serialize` feature the enum serializes as its name.
#[proc_macro_derive(ExitStatus, attributes(exit))]
pub fn derive_exit_status(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_exit_status(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
