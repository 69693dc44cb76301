use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::service::VerifyOutcome;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);
    match state.auth_service.register(&req.email, &req.password).await {
        Ok(user) => {
            info!("Registration successful for email: {}", user.email);
            Ok(HttpResponse::Created().json(RegisterResponse {
                id: user.id,
                email: user.email,
            }))
        }
        Err(e) => {
            error!("Registration failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    http_req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);

    let device_info = http_req
        .headers()
        .get("User-Agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let ip_address = http_req.peer_addr().map(|addr| addr.ip().to_string());

    match state
        .auth_service
        .login(&req.email, &req.password, device_info, ip_address)
        .await
    {
        Ok(pair) => {
            info!("Login successful for email: {}", req.email);
            Ok(HttpResponse::Ok().json(pair))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn refresh(
    req: web::Json<RefreshTokenRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let pair = state.auth_service.refresh(&req.refresh_token).await?;
    Ok(HttpResponse::Ok().json(pair))
}

pub async fn verify_email(
    query: web::Query<VerifyQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    match state.auth_service.verify_email(&query.token).await? {
        VerifyOutcome::Verified => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Email verified successfully."
        }))),
        VerifyOutcome::AlreadyVerified => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Email already verified."
        }))),
    }
}

pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req)?;
    let user = state.auth_service.current_user(token).await?;
    state.auth_service.logout(user.id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out successfully."
    })))
}

pub async fn forgot_password(
    req: web::Json<ForgotPasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.forgot_password(&req.email).await?;

    // Uniform response regardless of account existence
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If that email is registered, a password reset link has been sent."
    })))
}

pub async fn reset_password(
    req: web::Json<ResetPasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .auth_service
        .reset_password(&req.token, &req.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password reset successfully."
    })))
}

pub async fn update_password(
    req: web::Json<UpdatePasswordRequest>,
    http_req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&http_req)?;
    let user = state.auth_service.current_user(token).await?;
    state
        .auth_service
        .update_password(&user, &req.old_password, &req.new_password)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password updated successfully"
    })))
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AppError> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("No authorization token provided".into()))
}
