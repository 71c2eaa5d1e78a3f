//! Speedtest Macros
//!
//! Procedural macros that register functions of a benchmark unit.
//!
//! ## Macros
//!
//! - `#[speedtest::mark]` - Register a benchmark, whatever its name
//! - `#[speedtest::export]` - Register a `speed_*` benchmark
//! - `#[speedtest::fixture]` - Register a zero-argument fixture
//! - `#[speedtest::parametrize("a, b", [(1, 2), (2, 3)])]` - Register a
//!   benchmark expanded over argument sets
//!
//! Every registered function gets a hidden wrapper that decodes its
//! arguments from the bound keyword values and is submitted to the
//! `inventory` registry together with `file!()`. The wrapper returns a
//! closure over the decoded values, so timed calls never decode.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Expr, FnArg, ItemFn, Pat, ReturnType, Token, Type};

// ============================================================================
// Attribute Helpers
// ============================================================================

mod attr {
    use syn::Attribute;

    /// Last path segment of an attribute, e.g. `mark` for `#[speedtest::mark]`
    pub fn last_segment(attr: &Attribute) -> String {
        attr.path()
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default()
    }

    /// Whether any attribute ends in one of `names`
    pub fn has_any(attrs: &[Attribute], names: &[&str]) -> bool {
        attrs
            .iter()
            .any(|a| names.contains(&last_segment(a).as_str()))
    }

    /// Drop attributes ending in one of `names`
    pub fn strip(attrs: &mut Vec<Attribute>, names: &[&str]) {
        attrs.retain(|a| !names.contains(&last_segment(a).as_str()));
    }

    /// Reject any arguments on an argument-less attribute
    pub fn expect_empty(args: &proc_macro2::TokenStream, name: &str) -> syn::Result<()> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(syn::Error::new_spanned(
                args,
                format!("speedtest: `{}` takes no arguments", name),
            ))
        }
    }
}

const REGISTERING: &[&str] = &["mark", "export"];
const PARAMETRIZE: &str = "parametrize";

/// Mark a function as a benchmark entry regardless of its name
///
/// # Example
///
/// ```ignore
/// #[speedtest::mark]
/// fn sort_small() {
///     let mut v = vec![3, 1, 2];
///     v.sort();
/// }
/// ```
#[proc_macro_attribute]
pub fn mark(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    attr::expect_empty(&args, "mark")
        .and_then(|_| register_benchmark(func))
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Register a `speed_*` function so its unit can call it
///
/// The scanner already treats prefixed functions as entries; this only
/// provides the callable.
#[proc_macro_attribute]
pub fn export(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    attr::expect_empty(&args, "export")
        .and_then(|_| register_benchmark(func))
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn register_benchmark(func: ItemFn) -> Result<TokenStream2, syn::Error> {
    // A parametrize attribute further down performs the registration
    if attr::has_any(&func.attrs, &[PARAMETRIZE]) {
        return Ok(quote! { #func });
    }

    validate_signature(&func)?;
    let runner = generate_runner(&func)?;
    let runner_name = runner_ident(&func);
    let fn_name_str = func.sig.ident.to_string();

    Ok(quote! {
        #func

        #runner

        ::speedtest::internal::inventory::submit! {
            ::speedtest::SymbolDef {
                file: file!(),
                module_path: module_path!(),
                name: #fn_name_str,
                kind: ::speedtest::SymbolKind::Benchmark {
                    runner: #runner_name,
                    params: None,
                },
            }
        }
    })
}

// ============================================================================
// Parametrize
// ============================================================================

/// `"a, b", [(1, 2), (2, 3)]`
struct ParametrizeArgs {
    names: syn::LitStr,
    sets: Punctuated<Expr, Token![,]>,
}

impl Parse for ParametrizeArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let names: syn::LitStr = input.parse()?;
        input.parse::<Token![,]>()?;
        let content;
        syn::bracketed!(content in input);
        let sets = Punctuated::parse_terminated(&content)?;
        if !input.is_empty() {
            input.parse::<Token![,]>()?;
        }
        Ok(Self { names, sets })
    }
}

/// Register a benchmark expanded over a list of argument sets
///
/// Each set is either a tuple, zipped with the comma-separated names, or a
/// single value bound to the first name. Values may be any expression whose
/// type implements `serde::Serialize`.
///
/// # Example
///
/// ```ignore
/// #[speedtest::parametrize("n, reverse", [(100, false), (1000, true)])]
/// fn speed_sort(n: usize, reverse: bool) { ... }
/// ```
#[proc_macro_attribute]
pub fn parametrize(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as ParametrizeArgs);
    let func = parse_macro_input!(item as ItemFn);

    parametrize_impl(args, func)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn parametrize_impl(args: ParametrizeArgs, mut func: ItemFn) -> Result<TokenStream2, syn::Error> {
    if attr::has_any(&func.attrs, &[PARAMETRIZE]) {
        return Err(syn::Error::new_spanned(
            &func.sig.ident,
            "speedtest: only one `parametrize` attribute is allowed per function",
        ));
    }
    attr::strip(&mut func.attrs, REGISTERING);
    validate_signature(&func)?;

    let fn_name = &func.sig.ident;
    let fn_name_str = fn_name.to_string();
    let runner = generate_runner(&func)?;
    let runner_name = runner_ident(&func);
    let params_name = format_ident!("__speedtest_params_{}", fn_name);
    let names = &args.names;

    let sets = args.sets.iter().map(|expr| match expr {
        Expr::Tuple(tuple) => {
            let elems = tuple.elems.iter();
            quote! {
                ::speedtest::ArgSet::Tuple(::std::vec![
                    #(::speedtest::internal::to_value(&(#elems))?),*
                ])
            }
        }
        other => quote! {
            ::speedtest::ArgSet::Scalar(::speedtest::internal::to_value(&(#other))?)
        },
    });

    Ok(quote! {
        #func

        #runner

        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #params_name() -> ::core::result::Result<::speedtest::Parametrization, ::speedtest::ExpandError> {
            ::speedtest::Parametrization::new(#names, ::std::vec![#(#sets),*])
        }

        ::speedtest::internal::inventory::submit! {
            ::speedtest::SymbolDef {
                file: file!(),
                module_path: module_path!(),
                name: #fn_name_str,
                kind: ::speedtest::SymbolKind::Benchmark {
                    runner: #runner_name,
                    params: ::core::option::Option::Some(#params_name),
                },
            }
        }
    })
}

// ============================================================================
// Fixture
// ============================================================================

/// Register a zero-argument fixture
///
/// Benchmarks receive the fixture's value by naming a parameter after it.
/// The returned value must implement `serde::Serialize`; it is computed once
/// per benchmark entry.
///
/// # Example
///
/// ```ignore
/// #[speedtest::fixture]
/// fn data() -> Vec<u64> { (0..1000).collect() }
///
/// fn speed_sum(data: &[u64]) -> u64 { data.iter().sum() }
/// ```
#[proc_macro_attribute]
pub fn fixture(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    attr::expect_empty(&args, "fixture")
        .and_then(|_| fixture_impl(func))
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn fixture_impl(func: ItemFn) -> Result<TokenStream2, syn::Error> {
    validate_signature(&func)?;
    if !func.sig.inputs.is_empty() {
        return Err(syn::Error::new_spanned(
            &func.sig.inputs,
            "speedtest: fixtures must take no arguments",
        ));
    }

    let fn_name = &func.sig.ident;
    let fn_name_str = fn_name.to_string();
    let wrapper_name = format_ident!("__speedtest_fixture_{}", fn_name);

    let body = if returns_result(&func.sig.output) {
        quote! {
            match #fn_name() {
                ::core::result::Result::Ok(value) => ::speedtest::internal::to_value(&value)
                    .map_err(::speedtest::CallError::failed),
                ::core::result::Result::Err(err) => ::core::result::Result::Err(::speedtest::CallError::failed(err)),
            }
        }
    } else {
        quote! {
            ::speedtest::internal::to_value(&#fn_name()).map_err(::speedtest::CallError::failed)
        }
    };

    Ok(quote! {
        #func

        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #wrapper_name() -> ::core::result::Result<::speedtest::internal::Value, ::speedtest::CallError> {
            #body
        }

        ::speedtest::internal::inventory::submit! {
            ::speedtest::SymbolDef {
                file: file!(),
                module_path: module_path!(),
                name: #fn_name_str,
                kind: ::speedtest::SymbolKind::Fixture {
                    runner: #wrapper_name,
                },
            }
        }
    })
}

// ============================================================================
// Wrapper Generation
// ============================================================================

fn runner_ident(func: &ItemFn) -> syn::Ident {
    format_ident!("__speedtest_run_{}", func.sig.ident)
}

fn validate_signature(func: &ItemFn) -> syn::Result<()> {
    if func.sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            func.sig.asyncness,
            "speedtest: async functions cannot be benchmarked",
        ));
    }
    if !func.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &func.sig.generics,
            "speedtest: generic functions cannot be registered",
        ));
    }
    Ok(())
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Path(path) => path
                .path
                .segments
                .last()
                .map(|s| s.ident == "Result")
                .unwrap_or(false),
            _ => false,
        },
        ReturnType::Default => false,
    }
}

/// Wrapper decoding every parameter by name and returning the call to time.
///
/// Decoding happens once, when the wrapper runs; the returned closure owns
/// the decoded values. `&T` parameters decode into an owned `T` and are
/// passed by reference; `&str` and `&[T]` decode into `String` and `Vec<T>`.
/// By-value parameters are cloned on every call.
fn generate_runner(func: &ItemFn) -> syn::Result<TokenStream2> {
    let fn_name = &func.sig.ident;
    let runner_name = runner_ident(func);

    let mut bindings = Vec::new();
    let mut call_args = Vec::new();

    for (index, input) in func.sig.inputs.iter().enumerate() {
        let typed = match input {
            FnArg::Typed(typed) => typed,
            FnArg::Receiver(recv) => {
                return Err(syn::Error::new_spanned(
                    recv,
                    "speedtest: methods cannot be registered",
                ))
            }
        };
        let name = match typed.pat.as_ref() {
            Pat::Ident(ident) => ident.ident.to_string(),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "speedtest: parameters must be plain identifiers",
                ))
            }
        };
        let local = format_ident!("__arg{}", index);

        match typed.ty.as_ref() {
            Type::Reference(reference) => {
                let owned = owned_type(&reference.elem);
                if reference.mutability.is_some() {
                    bindings.push(quote! { let mut #local: #owned = args.get(#name)?; });
                    call_args.push(quote! { &mut #local });
                } else {
                    bindings.push(quote! { let #local: #owned = args.get(#name)?; });
                    call_args.push(quote! { &#local });
                }
            }
            ty => {
                bindings.push(quote! { let #local: #ty = args.get(#name)?; });
                call_args.push(quote! { ::core::clone::Clone::clone(&#local) });
            }
        }
    }

    let call = quote! { #fn_name(#(#call_args),*) };
    let body = if returns_result(&func.sig.output) {
        quote! {
            match #call {
                ::core::result::Result::Ok(value) => {
                    ::core::hint::black_box(value);
                    ::core::result::Result::Ok(::speedtest::internal::Value::Null)
                }
                ::core::result::Result::Err(err) => ::core::result::Result::Err(::speedtest::CallError::failed(err)),
            }
        }
    } else {
        quote! {
            ::core::hint::black_box(#call);
            ::core::result::Result::Ok(::speedtest::internal::Value::Null)
        }
    };

    Ok(quote! {
        #[doc(hidden)]
        #[allow(non_snake_case, unused_variables, unused_mut)]
        fn #runner_name(args: &::speedtest::Args) -> ::core::result::Result<::speedtest::PreparedCall, ::speedtest::CallError> {
            #(#bindings)*
            ::core::result::Result::Ok(::std::boxed::Box::new(move || {
                #body
            }))
        }
    })
}

/// Owned type a borrowed parameter is decoded into
fn owned_type(elem: &Type) -> TokenStream2 {
    match elem {
        Type::Path(path) if path.path.is_ident("str") => quote! { ::std::string::String },
        Type::Slice(slice) => {
            let inner = &slice.elem;
            quote! { ::std::vec::Vec<#inner> }
        }
        other => quote! { #other },
    }
}
