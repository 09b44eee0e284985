//! Authentication handlers

use axum::{extract::State, Json};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use chrono::{Utc, Duration};
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::access::check_password_change;
use crate::audit;
use crate::middleware::auth::{ClientIp, UserContext};
use crate::models::{ChangePassword, LoginRequest, LoginResponse, User, UserInfo};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // User ID
    pub matricule: String,
    pub role: String,
    pub clearance: String,
    pub exp: usize,         // Expiration timestamp
    pub iat: usize,         // Issued at
}

/// Login endpoint
pub async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    req.validate()?;

    let user = match User::find_by_matricule(&state.pool, &req.matricule).await? {
        Some(user) => user,
        None => {
            audit::auth_event(&state, &req.matricule, "login_failed", "Unknown matricule", ip.0).await;
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&req.password, &user.password_hash)? {
        audit::auth_event(&state, &user.matricule, "login_failed", "Wrong password", ip.0).await;
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_active {
        audit::auth_event(&state, &user.matricule, "login_failed", "Inactive account", ip.0).await;
        return Err(AppError::InactiveAccount);
    }

    User::update_last_login(&state.pool, user.id).await?;

    let access_token = generate_jwt(&user, &state.config.jwt_secret, state.config.jwt_expiration_minutes)?;

    audit::auth_event(&state, &user.matricule, "login_success", "User logged in", ip.0).await;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        role: user.role,
        matricule: user.matricule,
        full_name: user.full_name,
    }))
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    user: UserContext,
) -> AppResult<Json<UserInfo>> {
    let account = User::find_by_id(&state.pool, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(account.to_info()))
}

/// Tokens are stateless; logout only leaves a trace in the audit log
pub async fn logout(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
) -> AppResult<Json<serde_json::Value>> {
    audit::auth_event(&state, &user.matricule, "logout", "User logged out", ip.0).await;
    Ok(Json(json!({ "message": "Logged out" })))
}

/// Change own password
pub async fn change_password(
    State(state): State<AppState>,
    user: UserContext,
    ip: ClientIp,
    Json(req): Json<ChangePassword>,
) -> AppResult<Json<serde_json::Value>> {
    let account = User::find_by_id(&state.pool, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !verify_password(&req.current_password, &account.password_hash)? {
        audit::user_action(&state, &user, &ip, "password_change_failed", "user", Some(user.user_id), "Wrong current password").await;
        return Err(AppError::ValidationError("Current password is incorrect".to_string()));
    }

    check_password_change(&req.current_password, &req.new_password)?;

    let password_hash = hash_password(&req.new_password)?;
    User::set_password(&state.pool, user.user_id, &password_hash).await?;

    audit::user_action(&state, &user, &ip, "password_changed", "user", Some(user.user_id), "Password changed").await;

    Ok(Json(json!({ "message": "Password updated" })))
}

/// Hash a password with Argon2 and a random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|_| AppError::InternalError("Invalid password hash".to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate JWT token
pub fn generate_jwt(user: &User, secret: &str, expiration_minutes: u64) -> AppResult<String> {
    let now = Utc::now();
    let exp = now + Duration::minutes(expiration_minutes as i64);

    let claims = Claims {
        sub: user.id.to_string(),
        matricule: user.matricule.clone(),
        role: user.role.clone(),
        clearance: user.clearance_level.clone(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes())
    ).map_err(|e| AppError::InternalError(e.to_string()))
}

/// Decode and validate a JWT (signature and expiry)
pub fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            matricule: "CM-5678B".to_string(),
            full_name: "Commander".to_string(),
            email: "cmd@example.org".to_string(),
            password_hash: String::new(),
            role: "commander".to_string(),
            clearance_level: "secret".to_string(),
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_jwt_round_trip() {
        let user = sample_user();
        let token = generate_jwt(&user, "test-secret", 60).unwrap();
        let claims = decode_jwt(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.matricule, "CM-5678B");
        assert_eq!(claims.role, "commander");
        assert_eq!(claims.clearance, "secret");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let token = generate_jwt(&sample_user(), "test-secret", 60).unwrap();
        assert!(matches!(decode_jwt(&token, "other-secret"), Err(AppError::TokenInvalid)));
        assert!(matches!(decode_jwt("not.a.jwt", "test-secret"), Err(AppError::TokenInvalid)));
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            matricule: "FD-9012C".to_string(),
            role: "field".to_string(),
            clearance: "confidential".to_string(),
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"s")).unwrap();
        assert!(matches!(decode_jwt(&token, "s"), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }
}
