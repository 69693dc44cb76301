pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;

pub use config::Settings;
pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;

pub use auth::{AuthService, TokenCodec};
pub use db::{DbOperations, Session, TokenPurpose, User, VerificationToken};
pub use email::{EmailClient, EmailNotifier, EmailSender};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: DbOperations,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(5),
        )
        .await?;

        // Misconfigured signing material or base URL is fatal here, before
        // the server ever accepts a request.
        let codec = TokenCodec::from_settings(&config.auth)?;
        let sender: Arc<dyn EmailSender> = Arc::new(EmailClient::new(config.email.clone()));
        let notifier = EmailNotifier::new(&config.base_url, sender)?;

        let auth_service = Arc::new(AuthService::new(
            db.clone(),
            codec,
            notifier,
            config.auth.force_email_verification,
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            auth_service,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        // Close database connections
        self.db.close().await;
        Ok(())
    }
}
