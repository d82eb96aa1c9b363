//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpResponse, Responder};
use bytes::Bytes;
use log::*;
use payment_providers::{BankWebhookEvent, StripeEvent};
use serde::de::DeserializeOwned;
use split_payment_engine::{
    CheckoutApi,
    CheckoutRequest,
    PaymentProvider,
    PayoutAccountApi,
    ProviderEvent,
    ReconcilerApi,
    SettlementDatabase,
};

use crate::{
    auth::AuthenticatedUser,
    data_objects::{JsonResponse, LoginLink},
    errors::ServerError,
    integrations::{bank_event_to_provider_event, stripe_event_to_provider_event},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------

route!(checkout => Post "/checkout" impl SettlementDatabase, PaymentProvider);
/// Starts a hosted checkout for one of the caller's unpaid orders.
///
/// The response carries the provider's redirect URL. The split plan for the order is fixed at this point, and the
/// order moves to `awaiting_payment`.
pub async fn checkout<B, P>(
    user: AuthenticatedUser,
    api: web::Data<CheckoutApi<B, P>>,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    let request = body.into_inner();
    debug!("💻️ Checkout request for order #{} with {} from {}", request.order_id, request.provider, user.user_id);
    let redirect = api.create_checkout_session(&user.user_id, request).await?;
    Ok(HttpResponse::Ok().json(redirect))
}

//----------------------------------------------   Payouts  ----------------------------------------------------

route!(onboard => Post "/payouts/onboard" impl SettlementDatabase, PaymentProvider);
pub async fn onboard<B, P>(
    user: AuthenticatedUser,
    api: web::Data<PayoutAccountApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    debug!("💻️ Payout onboarding request from {}", user.user_id);
    let result = api.onboard_maker(&user.user_id).await?;
    if result.created {
        Ok(HttpResponse::Created().json(result.account))
    } else {
        Ok(HttpResponse::Ok().json(result.account))
    }
}

route!(payout_account => Get "/payouts/account" impl SettlementDatabase, PaymentProvider);
pub async fn payout_account<B, P>(
    user: AuthenticatedUser,
    api: web::Data<PayoutAccountApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    let account = api.payout_account(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(account))
}

route!(login_link => Post "/payouts/login_link" impl SettlementDatabase, PaymentProvider);
pub async fn login_link<B, P>(
    user: AuthenticatedUser,
    api: web::Data<PayoutAccountApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    let url = api.login_link(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(LoginLink { url }))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
// Signatures have already been checked by the time these handlers run. Every event that can be read is answered with
// 200, including the ones that do not apply, so that the provider stops redelivering them.

route!(stripe_webhook => Post "" impl SettlementDatabase, PaymentProvider);
pub async fn stripe_webhook<B, P>(body: Bytes, api: web::Data<ReconcilerApi<B, P>>) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    trace!("💻️ Received Stripe webhook");
    let event = parse_payload::<StripeEvent>(&body)?;
    let event = stripe_event_to_provider_event(event)?;
    reconcile(api.get_ref(), event).await
}

route!(bank_webhook => Post "" impl SettlementDatabase, PaymentProvider);
pub async fn bank_webhook<B, P>(body: Bytes, api: web::Data<ReconcilerApi<B, P>>) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    trace!("💻️ Received bank transfer webhook");
    let event = parse_payload::<BankWebhookEvent>(&body)?;
    let event = bank_event_to_provider_event(event)?;
    reconcile(api.get_ref(), event).await
}

fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("💻️ Could not deserialize webhook payload. {e}");
        ServerError::CouldNotDeserializePayload(e.to_string())
    })
}

async fn reconcile<B, P>(api: &ReconcilerApi<B, P>, event: ProviderEvent) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    let event_id = event.event_id.clone();
    let outcome = api.handle_event(event).await?;
    info!("💻️ Webhook event {event_id}: {}", JsonResponse::from(&outcome).message);
    Ok(HttpResponse::Ok().json(JsonResponse::from(&outcome)))
}
