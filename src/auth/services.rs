use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};

use crate::auth::store::User;
use crate::auth::token::generate_reset_token;
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

const MIN_PASSWORD_LEN: usize = 8;

/// Strength policy applied to every new password (registration, change, reset).
pub(crate) fn validate_new_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::Validation(
            "Password must contain an uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::Validation(
            "Password must contain a lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation("Password must contain a digit"));
    }
    Ok(())
}

pub async fn register(state: &AppState, email: &str, password: &str) -> Result<User, ApiError> {
    if !is_valid_email(email) {
        return Err(ApiError::Validation("Invalid email address"));
    }
    validate_new_password(password)?;

    let hash = state.hasher.hash(password)?;
    let user = state.users.create_user(email, &hash).await?;
    info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// Verify credentials without revealing which half failed. The unknown-email
/// path still runs one argon2 verification so it costs the same as a wrong
/// password.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<User, ApiError> {
    let user = match state.users.find_by_email(email).await? {
        Some(u) => u,
        None => {
            state.hasher.verify_dummy(password);
            warn!("login with unknown email");
            return Err(ApiError::InvalidCredentials);
        }
    };
    if !state.hasher.verify(password, &user.password_hash) {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }
    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Start a reset: mint a token, persist token + expiry in one update, hand the
/// link to the mailer. Unknown emails and delivery failures are indistinguishable
/// from success at the HTTP layer; only the logs know.
pub async fn request_reset(state: &AppState, email: &str) -> Result<(), ApiError> {
    let Some(user) = state.users.find_by_email(email).await? else {
        debug!("password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_reset_token();
    let expiry =
        OffsetDateTime::now_utc() + Duration::minutes(state.config.auth.reset_token_ttl_minutes);
    state.users.update_reset_token(user.id, &token, expiry).await?;

    let reset_url = format!(
        "{}/reset-password?token={}",
        state.config.base_url.trim_end_matches('/'),
        token
    );
    if let Err(e) = state.mailer.send_password_reset(&user.email, &reset_url).await {
        error!(error = %e, user_id = %user.id, "reset mail delivery failed");
    }
    Ok(())
}

/// Finish a reset. The password policy runs before any persistence change, so
/// a rejected password leaves the token valid for a retry. Consumption itself
/// is a single compare-and-clear in the store; of two racing consumers only
/// one sees a matched row.
pub async fn consume_reset(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    if token.trim().is_empty() {
        return Err(ApiError::InvalidOrExpiredToken);
    }
    validate_new_password(new_password)?;

    let new_hash = state.hasher.hash(new_password)?;
    let now = OffsetDateTime::now_utc();
    let consumed = state.users.consume_reset_token(token, &new_hash, now).await?;
    if !consumed {
        warn!("reset token rejected (unknown, used, or expired)");
        return Err(ApiError::InvalidOrExpiredToken);
    }
    info!("password reset completed");
    Ok(())
}

pub async fn change_password(
    state: &AppState,
    user_id: uuid::Uuid,
    current_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !state.hasher.verify(current_password, &user.password_hash) {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(ApiError::InvalidCredentials);
    }
    validate_new_password(new_password)?;

    let new_hash = state.hasher.hash(new_password)?;
    state.users.update_password(user.id, &new_hash).await?;
    info!(user_id = %user.id, "password changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::test_hasher;
    use crate::auth::store::MemoryCredentialStore;
    use crate::mailer::RecordingMailer;
    use crate::ratelimit::RateLimiter;
    use crate::state::{lazy_test_pool, AppState};
    use std::sync::Arc;

    fn test_state() -> (AppState, Arc<MemoryCredentialStore>, Arc<RecordingMailer>) {
        let users = Arc::new(MemoryCredentialStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let config = Arc::new(crate::config::test_config());
        let state = AppState::from_parts(
            lazy_test_pool(),
            config.clone(),
            users.clone(),
            mailer.clone(),
            test_hasher(),
            Arc::new(RateLimiter::new(
                std::time::Duration::from_secs(config.auth.rate_limit_window_secs),
                config.auth.rate_limit_max_attempts,
            )),
        );
        (state, users, mailer)
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("a lice@example.com"));
    }

    #[test]
    fn password_policy() {
        assert!(validate_new_password("Passw0rd").is_ok());
        assert!(validate_new_password("short1A").is_err());
        assert!(validate_new_password("alllower1").is_err());
        assert!(validate_new_password("ALLUPPER1").is_err());
        assert!(validate_new_password("NoDigitsHere").is_err());
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let (state, _, _) = test_state();
        assert!(matches!(
            register(&state, "not-an-email", "Passw0rd1").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            register(&state, "a@b.com", "weak").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn register_then_login() {
        let (state, _, _) = test_state();
        let user = register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("register");
        assert_eq!(user.email, "alice@example.com");

        let logged_in = login(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("login");
        assert_eq!(logged_in.id, user.id);

        assert!(matches!(
            login(&state, "alice@example.com", "WrongPass1").await,
            Err(ApiError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&state, "nobody@example.com", "Passw0rd1").await,
            Err(ApiError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let (state, _, _) = test_state();
        register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("first register");
        assert!(matches!(
            register(&state, "alice@example.com", "Passw0rd2").await,
            Err(ApiError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn request_reset_sets_token_with_ttl_and_sends_mail() {
        let (state, users, mailer) = test_state();
        register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("register");

        let before = OffsetDateTime::now_utc();
        request_reset(&state, "alice@example.com")
            .await
            .expect("request reset");

        let (token, expiry) = users
            .reset_state("alice@example.com")
            .expect("user exists");
        let token = token.expect("token set");
        let expiry = expiry.expect("expiry set");

        let ttl = Duration::minutes(state.config.auth.reset_token_ttl_minutes);
        let expected = before + ttl;
        assert!((expiry - expected).abs() < Duration::seconds(5));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@example.com");
        assert!(sent[0].1.contains(&token));
    }

    #[tokio::test]
    async fn request_reset_for_unknown_email_is_silent() {
        let (state, users, mailer) = test_state();
        register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("register");

        request_reset(&state, "nobody@example.com")
            .await
            .expect("still ok");

        assert!(mailer.sent.lock().unwrap().is_empty());
        let (token, expiry) = users.reset_state("alice@example.com").unwrap();
        assert!(token.is_none());
        assert!(expiry.is_none());
    }

    #[tokio::test]
    async fn consume_reset_is_single_use() {
        let (state, users, _) = test_state();
        register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("register");
        request_reset(&state, "alice@example.com")
            .await
            .expect("request");
        let token = users
            .reset_state("alice@example.com")
            .unwrap()
            .0
            .expect("token");

        consume_reset(&state, &token, "NewPassw0rd2")
            .await
            .expect("first consume");
        assert!(matches!(
            consume_reset(&state, &token, "NewPassw0rd3").await,
            Err(ApiError::InvalidOrExpiredToken)
        ));

        // old password dead, new one live
        assert!(login(&state, "alice@example.com", "Passw0rd1").await.is_err());
        assert!(login(&state, "alice@example.com", "NewPassw0rd2")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn weak_password_does_not_burn_the_token() {
        let (state, users, _) = test_state();
        register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("register");
        request_reset(&state, "alice@example.com")
            .await
            .expect("request");
        let token = users
            .reset_state("alice@example.com")
            .unwrap()
            .0
            .expect("token");

        assert!(matches!(
            consume_reset(&state, &token, "weak").await,
            Err(ApiError::Validation(_))
        ));
        // token survived the validation failure and still works
        consume_reset(&state, &token, "NewPassw0rd2")
            .await
            .expect("retry succeeds");
    }

    #[tokio::test]
    async fn unknown_and_empty_tokens_are_rejected() {
        let (state, _, _) = test_state();
        assert!(matches!(
            consume_reset(&state, "definitely-not-a-token", "NewPassw0rd2").await,
            Err(ApiError::InvalidOrExpiredToken)
        ));
        assert!(matches!(
            consume_reset(&state, "  ", "NewPassw0rd2").await,
            Err(ApiError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let (state, _, _) = test_state();
        let user = register(&state, "alice@example.com", "Passw0rd1")
            .await
            .expect("register");

        assert!(matches!(
            change_password(&state, user.id, "WrongPass1", "NewPassw0rd2").await,
            Err(ApiError::InvalidCredentials)
        ));
        change_password(&state, user.id, "Passw0rd1", "NewPassw0rd2")
            .await
            .expect("change");
        assert!(login(&state, "alice@example.com", "NewPassw0rd2")
            .await
            .is_ok());
    }
}
