use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::net::TcpListener;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use webscan_server::auth::handlers::{
    forgot_password, login, logout, refresh, register, reset_password, update_password,
    verify_email,
};
use webscan_server::{health_check, AppError, AppState, Settings};

#[actix_web::main]
async fn main() -> webscan_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Initialize application state. Fails fast on a missing signing secret
    // or unreachable database.
    let state = AppState::new(config.clone()).await?;
    let state = web::Data::new(state);

    // Periodically delete sessions whose refresh token expiry has passed
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        loop {
            match cleanup_state.db.cleanup_expired_sessions().await {
                Ok(removed) if removed > 0 => {
                    info!("Removed {} expired sessions", removed);
                }
                Ok(_) => {}
                Err(e) => warn!("Expired session cleanup failed: {}", e),
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    });

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/verify", web::get().to(verify_email))
            .route("/auth/logout", web::post().to(logout))
            .route("/auth/forgot-password", web::post().to(forgot_password))
            .route("/auth/reset-password", web::post().to(reset_password))
            .route("/user/update-password", web::put().to(update_password))
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
