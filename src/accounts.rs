use tracing::{info, warn};
use ulid::Ulid;

use crate::auth::{
    check_password_len, generate_token, hash_password_blocking, token_digest, verify_password_blocking,
};
use crate::error::ApiError;
use crate::limits::*;
use crate::mailer::Mail;
use crate::model::*;
use crate::state::AppState;
use crate::store::{StoreError, now_ms, parse_tz};

pub const SELECT_ROLE_PATH: &str = "/auth/select-role";
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, we've sent a password reset link.";
pub const PASSWORD_RESET_MESSAGE: &str = "Password has been reset successfully.";
const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_TOKEN: &str = "Invalid or expired token.";

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Role,
    pub timezone: Option<String>,
}

/// Identity asserted by an external OAuth provider after its handshake.
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub provider: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    /// Bearer token; only its digest is stored.
    pub token: String,
    pub user: User,
    pub expires_at: Ms,
    /// Where the client should go next, when the account is incomplete.
    pub next: Option<&'static str>,
}

pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if valid {
        Ok(email)
    } else {
        Err(ApiError::bad_request("Invalid email"))
    }
}

fn check_timezone(tz: Option<String>) -> Result<String, ApiError> {
    match tz.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        None => Ok(DEFAULT_TIMEZONE.to_string()),
        Some(t) if t.parse::<chrono_tz::Tz>().is_ok() => Ok(t),
        Some(_) => Err(ApiError::bad_request("Unknown timezone")),
    }
}

/// Profile every new teacher starts with; hidden until they activate it.
pub fn default_teacher_profile(user_id: Ulid, now: Ms) -> TeacherProfile {
    TeacherProfile {
        user_id,
        bio: None,
        hourly_rate_cents: DEFAULT_HOURLY_RATE_CENTS,
        languages: vec!["English".to_string()],
        years_experience: None,
        buffer_minutes: 0,
        is_active: false,
        created_at: now,
    }
}

async fn ensure_teacher_profile(state: &AppState, user_id: Ulid) -> Result<(), ApiError> {
    match state
        .store
        .create_teacher_profile(default_teacher_profile(user_id, now_ms()))
        .await
    {
        Ok(()) | Err(StoreError::AlreadyExists(..)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn register(state: &AppState, reg: Registration) -> Result<User, ApiError> {
    let email = normalize_email(&reg.email)?;
    check_password_len(&reg.password)?;
    if reg.role == Role::Admin {
        return Err(ApiError::bad_request("Invalid role"));
    }
    let name = reg.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
        return Err(ApiError::bad_request("Name too long"));
    }
    let timezone = check_timezone(reg.timezone)?;

    if state.store.find_user_by_email(&email).is_some() {
        return Err(ApiError::bad_request("User with this email already exists"));
    }

    let password_hash = hash_password_blocking(reg.password).await?;
    let user = User {
        id: Ulid::new(),
        email,
        name,
        image: None,
        password_hash: Some(password_hash),
        role: Some(reg.role),
        timezone,
        created_at: now_ms(),
    };
    match state.store.create_user(user.clone()).await {
        Ok(()) => {}
        Err(StoreError::AlreadyExists(..)) => {
            return Err(ApiError::bad_request("User with this email already exists"));
        }
        Err(e) => return Err(e.into()),
    }
    if reg.role == Role::Teacher {
        ensure_teacher_profile(state, user.id).await?;
    }
    info!(user = %user.id, role = ?reg.role, "registered");
    Ok(user)
}

async fn start_session(state: &AppState, user: User) -> Result<SignedIn, ApiError> {
    let token = generate_token();
    let expires_at = now_ms() + state.config.session_ttl_ms();
    state
        .store
        .issue_session(Session {
            digest: token_digest(&token),
            user_id: user.id,
            expires_at,
        })
        .await?;
    let next = user.role.is_none().then_some(SELECT_ROLE_PATH);
    Ok(SignedIn {
        token,
        user,
        expires_at,
        next,
    })
}

fn auth_failure() -> ApiError {
    metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
    ApiError::new(axum::http::StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
}

pub async fn sign_in_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<SignedIn, ApiError> {
    let Ok(email) = normalize_email(email) else {
        return Err(auth_failure());
    };
    let Some(user) = state.store.find_user_by_email(&email) else {
        return Err(auth_failure());
    };
    let verified = match user.password_hash.clone() {
        Some(phc) => verify_password_blocking(password.to_string(), phc).await,
        None => false,
    };
    if !verified {
        return Err(auth_failure());
    }
    start_session(state, user).await
}

/// Accounts are linked by email: a known address signs into the existing
/// account, an unknown one creates an account without a role.
pub async fn sign_in_oauth(state: &AppState, identity: OAuthIdentity) -> Result<SignedIn, ApiError> {
    if identity.provider != "google" {
        return Err(ApiError::bad_request("Unsupported provider"));
    }
    let email = normalize_email(&identity.email)?;
    if let Some(user) = state.store.find_user_by_email(&email) {
        return start_session(state, user).await;
    }

    let user = User {
        id: Ulid::new(),
        email,
        name: identity.name.filter(|n| n.chars().count() <= MAX_NAME_LEN),
        image: identity.image.filter(|i| i.len() <= MAX_IMAGE_URL_LEN),
        password_hash: None,
        role: None,
        timezone: DEFAULT_TIMEZONE.to_string(),
        created_at: now_ms(),
    };
    match state.store.create_user(user.clone()).await {
        Ok(()) => start_session(state, user).await,
        // Lost a race with another first sign-in for the same address.
        Err(StoreError::AlreadyExists(..)) => {
            let existing = state
                .store
                .find_user_by_email(&user.email)
                .ok_or_else(ApiError::internal)?;
            start_session(state, existing).await
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn update_role(state: &AppState, user: &User, role: Role) -> Result<User, ApiError> {
    if role == Role::Admin {
        return Err(ApiError::bad_request("Invalid role"));
    }
    state.store.set_user_role(user.id, role).await?;
    if role == Role::Teacher {
        ensure_teacher_profile(state, user.id).await?;
    }
    state
        .store
        .find_user(&user.id)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Always succeeds with the same message so callers cannot probe for
/// registered addresses.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<&'static str, ApiError> {
    let email = normalize_email(email)?;
    let Some(user) = state.store.find_user_by_email(&email) else {
        return Ok(FORGOT_PASSWORD_MESSAGE);
    };

    let token = generate_token();
    state
        .store
        .issue_reset_token(ResetToken {
            digest: token_digest(&token),
            email: user.email.clone(),
            expires_at: now_ms() + RESET_TOKEN_TTL_MS,
        })
        .await?;

    let link = format!("{}/auth/reset-password?token={token}", state.config.public_url);
    let mail = Mail {
        to: user.email,
        subject: "Reset your Flexibook password".into(),
        body: format!("Open {link} to reset your password. The link expires in one hour."),
    };
    if let Err(e) = state.mailer.send(&mail).await {
        warn!("could not send reset mail: {e}");
    }
    Ok(FORGOT_PASSWORD_MESSAGE)
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    password: &str,
) -> Result<&'static str, ApiError> {
    check_password_len(password)?;
    let reset = state
        .store
        .consume_reset_token(&token_digest(token), now_ms())
        .await
        .map_err(|e| match e {
            StoreError::InvalidInput(_) => ApiError::bad_request(INVALID_TOKEN),
            other => other.into(),
        })?;
    let user = state
        .store
        .find_user_by_email(&reset.email)
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    let password_hash = hash_password_blocking(password.to_string()).await?;
    state.store.set_password(user.id, password_hash).await?;
    info!(user = %user.id, "password reset");
    Ok(PASSWORD_RESET_MESSAGE)
}

/// The signed-in user behind a bearer token.
pub fn authenticate(state: &AppState, token: &str) -> Option<User> {
    state.store.session_user(&token_digest(token), now_ms())
}

pub async fn sign_out(state: &AppState, token: &str) -> Result<(), ApiError> {
    state.store.revoke_session(&token_digest(token)).await?;
    Ok(())
}

/// Local timezone of a user, UTC when unknown.
pub fn user_tz(user: &User) -> chrono_tz::Tz {
    parse_tz(&user.timezone)
}
