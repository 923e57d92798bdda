use axum::Router;

pub mod payments;
pub mod queue;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest("/queue", queue::router())
        .nest("/payments", payments::router())
}
