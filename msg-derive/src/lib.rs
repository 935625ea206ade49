use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Error, Fields, Result};

/// Implements `shmxfer::msg::SysvMessage` for a `repr(C)` struct whose first
/// field is the System V `mtype`.
#[proc_macro_derive(SysvMessage)]
pub fn derive_sysv_message(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = input.ident;

    if let Err(err) = check_repr_c(&input.attrs, &name.span(), "SysvMessage") {
        return err.into_compile_error().into();
    }
    if !input.generics.params.is_empty() {
        return Error::new(name.span(), "SysvMessage: generic records are not supported")
            .into_compile_error()
            .into();
    }
    if let Err(err) = check_leading_mtype(&input.data, &name.span()) {
        return err.into_compile_error().into();
    }

    let expanded = quote! {
        const _: () = assert!(::core::mem::offset_of!(#name, mtype) == 0);

        unsafe impl ::shmxfer::msg::SysvMessage for #name {
            const PAYLOAD_LEN: usize = ::core::mem::size_of::<Self>()
                - ::core::mem::size_of::<::shmxfer::msg::MType>();

            fn mtype(&self) -> ::shmxfer::msg::MType {
                self.mtype
            }
        }
    };

    proc_macro::TokenStream::from(expanded)
}

fn check_leading_mtype(data: &Data, span: &Span) -> Result<()> {
    let err_msg = "SysvMessage: first field must be named `mtype`";
    match data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => match fields.named.first().and_then(|f| f.ident.as_ref()) {
                Some(ident) if ident == "mtype" => Ok(()),
                _ => Err(Error::new(*span, err_msg)),
            },
            Fields::Unnamed(_) | Fields::Unit => Err(Error::new(*span, err_msg)),
        },
        Data::Enum(_) | Data::Union(_) => Err(Error::new(
            *span,
            "SysvMessage: only structs can be sent over a message queue",
        )),
    }
}

fn check_repr_c(attrs: &[Attribute], span: &Span, trait_name: &str) -> Result<()> {
    let mut has_repr = false;
    let err_msg = &format!("{}: struct must be repr(C)", trait_name);
    for attr in attrs {
        if attr.path().is_ident("repr") {
            has_repr = true;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    Ok(())
                } else {
                    Err(meta.error(err_msg))
                }
            })?;
        }
    }
    if has_repr {
        Ok(())
    } else {
        Err(Error::new(*span, err_msg))
    }
}
