#[tokio::main]
async fn main() {
    totem_observability::init();

    let jwt_secret = std::env::var("TOTEM_JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("TOTEM_JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let services = match totem_api::app::services::build_services().await {
        Ok(services) => services,
        Err(err) => {
            eprintln!("startup failed: {err:#}");
            std::process::exit(1);
        }
    };

    let app = totem_api::app::build_app(services, jwt_secret.as_bytes());

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind {bind_addr}: {err}");
            std::process::exit(1);
        }
    };

    tracing::info!("listening on {}", bind_addr);

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
