use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, ReturnType, Token, Type,
    parse::{Parse, ParseStream},
    parse_macro_input,
    spanned::Spanned,
};

/// Generates `::weakref::Object` for the self type of an inherent `impl` block.
///
/// Every `&self` method becomes an operation that can be sent by name.
/// `#[method(name = "...")]` renames an operation, `#[method(skip)]` hides a
/// method. `#[methods(class = "...")]` overrides the class name.
#[proc_macro_attribute]
pub fn methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as MethodsArgs);
    let mut item = parse_macro_input!(item as ItemImpl);

    match expand_methods(args, &mut item) {
        Ok(object_impl) => quote! {
            #item
            #object_impl
        }
        .into(),
        Err(e) => {
            let error = e.into_compile_error();
            quote! {
                #item
                #error
            }
            .into()
        }
    }
}

#[derive(Default)]
struct MethodsArgs {
    class: Option<LitStr>,
}

impl Parse for MethodsArgs {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut args = Self::default();
        while !input.is_empty() {
            let key: syn::Ident = input.parse()?;
            if key != "class" {
                let msg = format!("expected `class = \"...\"`, found {key}");
                return Err(syn::Error::new_spanned(key, msg));
            }
            input.parse::<Token![=]>()?;
            args.class = Some(input.parse()?);
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

enum MethodAttr {
    Rename(LitStr),
    Skip,
}

impl Parse for MethodAttr {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let key: syn::Ident = input.parse()?;
        if key == "skip" {
            return Ok(Self::Skip);
        }
        if key == "name" {
            input.parse::<Token![=]>()?;
            return Ok(Self::Rename(input.parse()?));
        }
        let msg = format!("expected `skip` or `name = \"...\"`, found {key}");
        Err(syn::Error::new_spanned(key, msg))
    }
}

struct Operation {
    name: String,
    arm: proc_macro2::TokenStream,
}

fn expand_methods(args: MethodsArgs, item: &mut ItemImpl) -> syn::Result<proc_macro2::TokenStream> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[methods] goes on an inherent impl block",
        ));
    }

    let class = match args.class {
        Some(class) => class.value(),
        None => type_name(&item.self_ty)?,
    };

    let mut operations = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let attr = take_method_attr(&mut method.attrs)?;
        if matches!(attr, Some(MethodAttr::Skip)) || !has_shared_receiver(method) {
            continue;
        }
        let name = match attr {
            Some(MethodAttr::Rename(name)) => name.value(),
            _ => method.sig.ident.to_string(),
        };
        operations.push(Operation {
            arm: operation_arm(&name, method)?,
            name,
        });
    }

    let names = operations.iter().map(|op| &op.name);
    let arms = operations.iter().map(|op| &op.arm);
    let responds = if operations.is_empty() {
        quote!(false)
    } else {
        quote!(::core::matches!(method, #(#names)|*))
    };

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::weakref::Object for #self_ty #where_clause {
            fn class_name(&self) -> &'static str {
                #class
            }

            #[allow(unused_variables)]
            fn responds_to(&self, method: &str) -> bool {
                #responds
            }

            #[allow(unused_variables)]
            fn send(
                &self,
                method: &str,
                args: &[::weakref::Value],
            ) -> ::core::result::Result<::weakref::Value, ::weakref::Error> {
                match method {
                    #(#arms)*
                    _ => ::core::result::Result::Err(
                        ::weakref::Error::method_not_found(#class, method),
                    ),
                }
            }
        }
    })
}

fn type_name(ty: &Type) -> syn::Result<String> {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .ok_or_else(|| syn::Error::new_spanned(ty, "empty type path")),
        _ => Err(syn::Error::new_spanned(
            ty,
            "cannot derive a class name, use #[methods(class = \"...\")]",
        )),
    }
}

// removes our `#[method(...)]` attribute so the emitted impl compiles
fn take_method_attr(attrs: &mut Vec<Attribute>) -> syn::Result<Option<MethodAttr>> {
    let mut found = None;
    let mut error = None;
    attrs.retain(|attr| {
        if !attr.path().is_ident("method") {
            return true;
        }
        match attr.parse_args::<MethodAttr>() {
            Ok(parsed) => found = Some(parsed),
            Err(e) => error = Some(e),
        }
        false
    });
    match error {
        Some(e) => Err(e),
        None => Ok(found),
    }
}

fn has_shared_receiver(method: &ImplItemFn) -> bool {
    match method.sig.receiver() {
        Some(receiver) => receiver.reference.is_some() && receiver.mutability.is_none(),
        None => false,
    }
}

fn operation_arm(name: &str, method: &ImplItemFn) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &method.sig.ident;
    let mut bindings = Vec::new();
    let mut idents = Vec::new();

    for (i, input) in method.sig.inputs.iter().skip(1).enumerate() {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new(input.span(), "unexpected receiver"));
        };
        let arg = format_ident!("arg{}", i);
        let ty = &pat_type.ty;
        bindings.push(quote! {
            let #arg = <#ty as ::weakref::FromValue>::from_value(&args[#i])?;
        });
        idents.push(arg);
    }
    let arity = idents.len();

    let call = quote!(self.#ident(#(#idents),*));
    let result = match &method.sig.output {
        ReturnType::Default => quote! {
            #call;
            ::core::result::Result::Ok(::weakref::Value::Nil)
        },
        ReturnType::Type(_, ty) if returns_result(ty) => quote! {
            #call.map(::weakref::IntoValue::into_value)
        },
        ReturnType::Type(..) => quote! {
            ::core::result::Result::Ok(::weakref::IntoValue::into_value(#call))
        },
    };

    Ok(quote! {
        #name => {
            ::weakref::check_arity(args, #arity)?;
            #(#bindings)*
            #result
        }
    })
}

// `Result<T, weakref::Error>` results are passed through as they are
fn returns_result(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Result"),
        _ => false,
    }
}
