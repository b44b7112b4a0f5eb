pub mod admin;
pub mod conversations;
pub mod messages;
pub mod profile;
pub mod wsroute;

use actix_web::{web, HttpResponse};

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Every HTTP and WebSocket route, shared by the server and the tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(conversations::get_conversations)
        .service(conversations::create_conversation)
        .service(messages::send_message)
        .service(messages::get_messages)
        .service(messages::mark_read)
        .service(messages::delete_message)
        .service(profile::get_own_profile)
        .service(profile::update_profile)
        .service(profile::search_users)
        .service(profile::get_public_profile)
        .service(admin::get_presence)
        .service(admin::list_users)
        .service(admin::list_messages)
        .service(admin::list_conversations)
        .service(admin::set_user_status)
        .service(admin::delete_user)
        .service(wsroute::ws_handler)
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(crate::metrics::metrics_handler));
}
