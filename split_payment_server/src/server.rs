use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::future::{ok, Either};
use log::*;
use split_payment_engine::{events::EventProducers, CheckoutApi, PayoutAccountApi, ReconcilerApi, SqliteDatabase};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    helpers::get_remote_ip,
    integrations::{create_notification_handlers, ProviderGateway},
    middleware::SignatureMiddlewareFactory,
    routes::{health, BankWebhookRoute, CheckoutRoute, LoginLinkRoute, OnboardRoute, PayoutAccountRoute, StripeWebhookRoute},
    sweep_worker::start_sweep_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Database migrations failed. {e}")))?;
    let provider = ProviderGateway::from_config(config.stripe.clone(), config.bank.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = create_notification_handlers(config.notification_url.clone(), config.settlement.provider_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = handlers.producers();
    handlers.start_handlers().await;
    // The worker is never awaited. It stops when the runtime shuts down.
    let _sweeper = start_sweep_worker(db.clone(), provider.clone(), config.settlement, config.sweep_interval);
    let srv = create_server_instance(config, db, provider, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    provider: ProviderGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone(), provider.clone(), config.settlement);
        let payouts_api = PayoutAccountApi::new(db.clone(), provider.clone(), config.settlement);
        let reconciler_api = ReconcilerApi::new(db.clone(), provider.clone(), config.settlement, producers.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("spg::access_log"))
            .app_data(web::Data::new(ServerOptions::from_config(&config)))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(payouts_api))
            .app_data(web::Data::new(reconciler_api));
        // Routes that act on behalf of the user identified by the upstream auth layer
        let api_scope = web::scope("/api")
            .service(CheckoutRoute::<SqliteDatabase, ProviderGateway>::new())
            .service(OnboardRoute::<SqliteDatabase, ProviderGateway>::new())
            .service(PayoutAccountRoute::<SqliteDatabase, ProviderGateway>::new())
            .service(LoginLinkRoute::<SqliteDatabase, ProviderGateway>::new());
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let whitelist = config.webhooks.whitelist.clone();
        let hooks = &config.webhooks;
        let stripe_scope = web::scope("/stripe")
            .wrap(SignatureMiddlewareFactory::stripe(
                hooks.stripe_secret.clone(),
                hooks.stripe_tolerance,
                hooks.signature_checks,
            ))
            .service(StripeWebhookRoute::<SqliteDatabase, ProviderGateway>::new());
        let bank_scope = web::scope("/bank")
            .wrap(SignatureMiddlewareFactory::bank(hooks.bank_secret.clone(), hooks.signature_checks))
            .service(BankWebhookRoute::<SqliteDatabase, ProviderGateway>::new());
        let webhook_scope = web::scope("/webhook")
            .wrap_fn(move |req, srv| {
                // Collect peer IP from x-forwarded-for, or forwarded headers _if_ `use_nnn` has been set to true
                // in the configuration. Otherwise, use the peer address from the connection info.
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                let whitelisted = match (peer_ip, &whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("💻️ Webhook from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("💻️ No IP address found in webhook remote peer request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    Either::Left(srv.call(req))
                } else {
                    let err = ServerError::InsufficientPermissions("Webhook calls from this address are not allowed.".into());
                    Either::Right(ok(req.error_response(err)))
                }
            })
            .service(stripe_scope)
            .service(bank_scope);
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
