// src/api/mod.rs

pub mod account;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod operations;
pub mod stripe_client;
pub mod tool;
pub mod webhooks;

use actix_web::{get, web, HttpResponse, Responder};

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

/// Registers every route. Shared by `main` and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(
        web::scope("/api")
            .wrap(auth::JwtMiddleware)
            .service(catalog::list_tools)
            .service(catalog::get_tool)
            .service(tool::run_tool)
            .service(checkout::create_checkout)
            .service(webhooks::stripe_webhook)
            .service(account::get_user)
            .service(account::request_tool)
            .service(operations::list_operations)
            .service(operations::operation_link)
            .service(operations::delete_operation)
            .service(operations::download),
    );
}
