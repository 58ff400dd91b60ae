use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, punctuated::Punctuated, spanned::Spanned, FnArg, Ident, ItemFn, Pat,
    Signature, Token, Type,
};

/// Transform an asynchronous test into a synchronous one running against a
/// fresh server, and inject dependencies.
///
/// Every test gets its own in-memory record store and recording SMS gateway.
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::model::store::Store`, and `crate::voting::sms::TestGateway`.
///
/// Accepted arguments:
/// - `admin`: create an admin and log the client in as them.
/// - `no_otp`: run the server with OTP verification switched off.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let args = parse_macro_input!(args with Punctuated::<Ident, Token![,]>::parse_terminated);

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    let mut login_admin = false;
    let mut otp_required = true;
    for arg in &args {
        if arg == "admin" {
            login_admin = true;
        } else if arg == "no_otp" {
            otp_required = false;
        } else {
            return syn::Error::new(arg.span(), "Expected `admin` or `no_otp`")
                .into_compile_error()
                .into();
        }
    }

    // Rename the future so the generated test keeps the declared name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as admin if needed.
    let maybe_login = if login_admin {
        quote! {
            let admin = crate::model::db::admin::NewAdmin::try_from(
                crate::model::api::admin::AdminCredentials::example(),
            )
            .unwrap();
            store.insert_admin(admin).await.unwrap();

            // The response borrows the client, so only its status outlives the request.
            let status = rocket_client
                .post(uri!(crate::api::auth::authenticate))
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(crate::model::api::admin::AdminCredentials::example()).to_string())
                .dispatch()
                .await
                .status();
            assert_eq!(rocket::http::Status::Ok, status, "admin login failed");
        }
    } else {
        TokenStream2::new()
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::model::store::Store,
                crate::voting::sms::TestGateway,
            ) {
                let store = crate::model::store::Store::new(crate::model::store::MemoryStore::new());
                let gateway = crate::voting::sms::TestGateway::default();
                let notifier = crate::voting::sms::Notifier::new(gateway.clone());
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::test_rocket(#otp_required, store.clone(), notifier),
                )
                .await
                .unwrap();

                #maybe_login

                (rocket_client, store, gateway)
            }

            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["ballot_backend"], None, None);

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, store, gateway) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen: Vec<String> = vec![];
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.segments.last().map(|s| &s.ident) {
                    let injected = if type_ident == "Client" {
                        Some(quote! { rocket_client })
                    } else if type_ident == "Store" {
                        Some(quote! { store.clone() })
                    } else if type_ident == "TestGateway" {
                        Some(quote! { gateway.clone() })
                    } else {
                        None
                    };
                    if let Some(injected) = injected {
                        let type_name = type_ident.to_string();
                        if seen.contains(&type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(type_name);
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `store_ident: Store` or `gateway_ident: TestGateway`",
        ));
    }

    Ok(args)
}
