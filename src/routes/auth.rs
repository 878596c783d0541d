/// Authentication Routes
///
/// Registration, login, refresh-token rotation and logout for the auth
/// service. Handlers only translate between JSON and `AccountService`; all
/// validation and credential lifecycle rules live in the service.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AccountService, CredentialPair};
use crate::error::{AuthError, ValidationError};
use crate::middleware::AuthenticatedUser;

/// Body of `/register` and `/login`
///
/// Missing fields deserialize as empty strings so validation can report
/// which field was wrong.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub device_id: String,
}

/// Credential pair as returned to clients
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
    pub expires_in: i64,
    pub token_type: String,
}

impl From<CredentialPair> for AuthResponse {
    fn from(pair: CredentialPair) -> Self {
        let expires_in = pair.expires_in();
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user_id: pair.user_id,
            expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

/// POST /register
///
/// # Errors
/// - 400: invalid email, password or device id (response names the field)
/// - 409: email already registered
/// - 500: storage unavailable
pub async fn register(
    form: web::Json<CredentialsRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AuthError> {
    let pair = accounts
        .register(&form.email, &form.password, &form.device_id)
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse::from(pair)))
}

/// POST /login
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    form: web::Json<CredentialsRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AuthError> {
    let pair = accounts
        .login(&form.email, &form.password, &form.device_id)
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse::from(pair)))
}

/// POST /refresh
///
/// Rotates the presented refresh token. A superseded token revokes the
/// device session and answers 401 `TOKEN_REVOKED`.
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AuthError> {
    if form.refresh_token.trim().is_empty() {
        return Err(ValidationError::EmptyField("refreshToken").into());
    }

    let pair = accounts.refresh(&form.refresh_token, &form.device_id).await?;

    Ok(HttpResponse::Ok().json(AuthResponse::from(pair)))
}

/// POST /logout (bearer-protected)
///
/// Revokes the caller's session on the given device.
pub async fn logout(
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<LogoutRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AuthError> {
    accounts.logout(user.user_id, &form.device_id).await?;

    Ok(HttpResponse::NoContent().finish())
}
