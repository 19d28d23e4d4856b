use axum::error_handling::HandleErrorLayer;
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

pub mod backends;
mod errs;
mod graceful_shutdown;
pub mod posts;
mod refinery_migrations;
mod scheduled_tasks;
pub mod server_state;
mod uploads;
pub mod user;
mod utils;

pub use errs::RootErrors;
pub use graceful_shutdown::handle_shutdown_signal;
pub use refinery_migrations::run_migrations;
pub use scheduled_tasks::initiate_scheduled_tasks;
pub use server_state::{Config, ServerState};

pub fn router(state: ServerState) -> Router {
    let request_timeout = state.config.request_timeout;

    Router::new()
        .merge(posts::router())
        .merge(uploads::router())
        .fallback(page_not_found)
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(root_error_handler))
                .timeout(request_timeout),
        )
        .with_state(state)
}

async fn root_error_handler(err: BoxError) -> RootErrors {
    if err.is::<tower::timeout::error::Elapsed>() {
        RootErrors::RequestTimeout
    } else {
        tracing::error!(error = %err, "[ROUTER] Unhandled middleware error");
        RootErrors::InternalServerError
    }
}

async fn page_not_found() -> RootErrors {
    RootErrors::NotFound("Not found".to_string())
}
