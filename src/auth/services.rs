use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, MessageResponse, SignInRequest, SignUpRequest, UpdateProfileRequest},
        jwt::TokenService,
        password::{hash_password, verify_password},
        repo::UserDirectory,
        repo_types::{CreateOutcome, User},
    },
    error::AuthError,
};

const MIN_PASSWORD_LEN: usize = 8;

/// Length bounds are exclusive: 6 < len < 255.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let len = email.len();
    len > 6
        && len < 255
        && !email.starts_with(&['.', '@'][..])
        && !email.ends_with(&['.', '@'][..])
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Current time at the microsecond precision `TIMESTAMPTZ` keeps, so the
/// value returned to the client matches what a later read yields.
fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - TimeDuration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

fn require_names(first: &str, last: &str) -> Result<(String, String), AuthError> {
    let (first, last) = (first.trim(), last.trim());
    if first.is_empty() || last.is_empty() {
        return Err(AuthError::validation("First name and last name are required"));
    }
    Ok((first.to_string(), last.to_string()))
}

pub async fn register(
    users: &dyn UserDirectory,
    tokens: &TokenService,
    req: SignUpRequest,
) -> Result<AuthResponse, AuthError> {
    if !is_valid_email(req.email.trim()) {
        warn!("invalid email");
        return Err(AuthError::validation("Invalid email format"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AuthError::validation(
            "Password must be at least 8 characters",
        ));
    }
    let (first_name, last_name) = require_names(&req.first_name, &req.last_name)?;
    let email = normalize_email(&req.email);

    let existing = users
        .find_by_email(&email)
        .await
        .map_err(AuthError::store("Failed to create user"))?;
    if existing.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::EmailTaken);
    }

    let password_hash = hash_password(&req.password)?;

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash,
        first_name,
        last_name,
        created_at: now_utc(),
        updated_at: None,
    };

    // The insert is conditional, so a concurrent sign-up that passed the
    // lookup above still ends here.
    match users
        .create(&user)
        .await
        .map_err(AuthError::store("Failed to create user"))?
    {
        CreateOutcome::Created => {}
        CreateOutcome::EmailTaken => {
            warn!(email = %user.email, "email registered concurrently");
            return Err(AuthError::EmailTaken);
        }
    }

    let issued = tokens.issue(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(AuthResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        user,
    })
}

pub async fn authenticate(
    users: &dyn UserDirectory,
    tokens: &TokenService,
    req: SignInRequest,
) -> Result<AuthResponse, AuthError> {
    if !is_valid_email(req.email.trim()) {
        warn!("invalid email");
        return Err(AuthError::validation("Invalid email format"));
    }
    if req.password.trim().is_empty() {
        return Err(AuthError::validation("Password is required"));
    }
    let email = normalize_email(&req.email);

    let user = match users
        .find_by_email(&email)
        .await
        .map_err(AuthError::store("Failed to sign in"))?
    {
        Some(u) => u,
        None => {
            warn!(email = %email, "sign-in unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password(&req.password, &user.password_hash) {
        warn!(email = %email, user_id = %user.id, "sign-in invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let issued = tokens.issue(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user signed in");
    Ok(AuthResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        user,
    })
}

/// Tokens are not tracked server-side, so there is nothing to invalidate.
pub fn sign_out() -> MessageResponse {
    info!("user signed out");
    MessageResponse {
        message: "Successfully signed out".into(),
    }
}

pub async fn profile(users: &dyn UserDirectory, user_id: Uuid) -> Result<User, AuthError> {
    users
        .find_by_id(user_id)
        .await
        .map_err(AuthError::store("Failed to load profile"))?
        .ok_or(AuthError::UserNotFound)
}

pub async fn update_profile(
    users: &dyn UserDirectory,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> Result<User, AuthError> {
    let (first_name, last_name) = require_names(&req.first_name, &req.last_name)?;

    let mut user = profile(users, user_id).await?;
    user.first_name = first_name;
    user.last_name = last_name;
    user.updated_at = Some(now_utc());

    let updated = users
        .update_profile(&user)
        .await
        .map_err(AuthError::store("Failed to update profile"))?;
    if !updated {
        return Err(AuthError::UserNotFound);
    }

    info!(user_id = %user.id, "profile updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{auth::repo::memory::MemoryUserDirectory, config::TOKEN_ISSUER};

    /// Directory with fixed answers, for store behavior the map-backed one
    /// cannot produce on demand.
    struct ScriptedDirectory {
        user: Option<User>,
        create: CreateOutcome,
        updated: bool,
    }

    #[async_trait]
    impl UserDirectory for ScriptedDirectory {
        async fn find_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn find_by_id(&self, _id: Uuid) -> anyhow::Result<Option<User>> {
            Ok(self.user.clone())
        }

        async fn create(&self, _user: &User) -> anyhow::Result<CreateOutcome> {
            Ok(self.create)
        }

        async fn update_profile(&self, _user: &User) -> anyhow::Result<bool> {
            Ok(self.updated)
        }
    }

    fn stored_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            password_hash: "x".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        }
    }

    fn keys() -> TokenService {
        TokenService::new("test-secret", TOKEN_ISSUER).unwrap()
    }

    fn signup(email: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: "longenough".into(),
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
        }
    }

    #[test]
    fn email_validation_table() {
        for bad in ["a@b", ".x@y.com", "x@y.com.", "x@y", "@xample.com", "user@example.com@", ""] {
            assert!(!is_valid_email(bad), "{bad:?} should be rejected");
        }
        assert!(!is_valid_email(&format!("{}@example.com", "a".repeat(250))));
        for good in ["user@example.com", "a@b.com", "A@B.com"] {
            assert!(is_valid_email(good), "{good:?} should be accepted");
        }
    }

    #[test]
    fn email_length_upper_bound() {
        // "@example.com" is 12 bytes
        let of_len = |n: usize| format!("{}@example.com", "a".repeat(n - 12));
        assert_eq!(of_len(254).len(), 254);
        assert!(is_valid_email(&of_len(254)));
        assert!(!is_valid_email(&of_len(255)));
    }

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  A@B.com "), "a@b.com");
    }

    #[tokio::test]
    async fn register_normalizes_and_issues_token() {
        let users = MemoryUserDirectory::default();
        let tokens = keys();
        let res = register(
            &users,
            &tokens,
            SignUpRequest {
                email: "A@B.com".into(),
                password: "longenough".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            },
        )
        .await
        .expect("register");

        assert_eq!(res.user.email, "a@b.com");
        assert_eq!(res.expires_in, 86_400);
        assert!(res.user.updated_at.is_none());
        let claims = tokens.validate(&res.token).unwrap();
        assert_eq!(claims.user_id, res.user.id);
        assert_eq!(claims.email, "a@b.com");
        assert!(verify_password("longenough", &res.user.password_hash));
    }

    #[tokio::test]
    async fn register_trims_names() {
        let users = MemoryUserDirectory::default();
        let res = register(&users, &keys(), signup("ada@example.com")).await.unwrap();
        assert_eq!(res.user.first_name, "Ada");
    }

    #[tokio::test]
    async fn duplicate_email_differing_in_case_conflicts() {
        let users = MemoryUserDirectory::default();
        let tokens = keys();
        register(&users, &tokens, signup("user@example.com")).await.unwrap();
        let err = register(&users, &tokens, signup("  USER@Example.com "))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_registrations_for_one_email_yield_one_account() {
        let users = MemoryUserDirectory::default();
        let tokens = keys();
        let (a, b) = tokio::join!(
            register(&users, &tokens, signup("race@example.com")),
            register(&users, &tokens, signup(" RACE@example.com")),
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AuthError::EmailTaken)))
                .count(),
            1
        );
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn register_losing_insert_is_conflict() {
        let users = ScriptedDirectory {
            user: None,
            create: CreateOutcome::EmailTaken,
            updated: true,
        };
        let err = register(&users, &keys(), signup("user@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn timestamps_have_microsecond_precision() {
        let users = MemoryUserDirectory::default();
        let created = register(&users, &keys(), signup("user@example.com")).await.unwrap();
        assert_eq!(created.user.created_at.nanosecond() % 1_000, 0);

        let updated = update_profile(
            &users,
            created.user.id,
            UpdateProfileRequest {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.updated_at.unwrap().nanosecond() % 1_000, 0);
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let users = MemoryUserDirectory::default();
        let tokens = keys();

        let mut req = signup("x@y");
        assert!(matches!(
            register(&users, &tokens, req).await,
            Err(AuthError::Validation(_))
        ));

        req = signup("user@example.com");
        req.password = "short".into();
        assert!(matches!(
            register(&users, &tokens, req).await,
            Err(AuthError::Validation(_))
        ));

        req = signup("user@example.com");
        req.last_name = "   ".into();
        assert!(matches!(
            register(&users, &tokens, req).await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(users.len(), 0);
    }

    #[tokio::test]
    async fn authenticate_accepts_correct_password() {
        let users = MemoryUserDirectory::default();
        let tokens = keys();
        let created = register(&users, &tokens, signup("user@example.com")).await.unwrap();

        let res = authenticate(
            &users,
            &tokens,
            SignInRequest {
                email: "User@Example.com".into(),
                password: "longenough".into(),
            },
        )
        .await
        .expect("sign in");
        assert_eq!(res.user.id, created.user.id);
        assert_eq!(tokens.validate(&res.token).unwrap().user_id, created.user.id);
    }

    #[tokio::test]
    async fn authenticate_failures_are_indistinguishable() {
        let users = MemoryUserDirectory::default();
        let tokens = keys();
        register(&users, &tokens, signup("user@example.com")).await.unwrap();

        let wrong_password = authenticate(
            &users,
            &tokens,
            SignInRequest {
                email: "user@example.com".into(),
                password: "not-the-password".into(),
            },
        )
        .await
        .unwrap_err();
        let unknown_user = authenticate(
            &users,
            &tokens,
            SignInRequest {
                email: "nobody@example.com".into(),
                password: "longenough".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn authenticate_requires_password() {
        let users = MemoryUserDirectory::default();
        let err = authenticate(
            &users,
            &keys(),
            SignInRequest {
                email: "user@example.com".into(),
                password: "   ".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn update_profile_sets_names_and_timestamp() {
        let users = MemoryUserDirectory::default();
        let created = register(&users, &keys(), signup("user@example.com")).await.unwrap();

        let updated = update_profile(
            &users,
            created.user.id,
            UpdateProfileRequest {
                first_name: " Grace ".into(),
                last_name: "Hopper".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.first_name, "Grace");
        assert_eq!(updated.email, "user@example.com");
        assert!(updated.updated_at.is_some());

        let stored = profile(&users, created.user.id).await.unwrap();
        assert_eq!(stored.last_name, "Hopper");
        assert_eq!(stored.updated_at, updated.updated_at);
        assert_eq!(stored.password_hash, created.user.password_hash);
    }

    #[tokio::test]
    async fn update_profile_rejects_empty_last_name() {
        let users = MemoryUserDirectory::default();
        let created = register(&users, &keys(), signup("user@example.com")).await.unwrap();
        let err = update_profile(
            &users,
            created.user.id,
            UpdateProfileRequest {
                first_name: "Grace".into(),
                last_name: "".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn profile_of_missing_user_is_not_found() {
        let users = MemoryUserDirectory::default();
        let created = register(&users, &keys(), signup("user@example.com")).await.unwrap();
        users.remove("user@example.com");
        assert!(matches!(
            profile(&users, created.user.id).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn update_of_missing_user_is_not_found() {
        let users = MemoryUserDirectory::default();
        let created = register(&users, &keys(), signup("user@example.com")).await.unwrap();
        users.remove("user@example.com");
        let err = update_profile(
            &users,
            created.user.id,
            UpdateProfileRequest {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn update_matching_no_record_is_not_found() {
        let user = stored_user();
        let users = ScriptedDirectory {
            user: Some(user.clone()),
            create: CreateOutcome::Created,
            updated: false,
        };
        let err = update_profile(
            &users,
            user.id,
            UpdateProfileRequest {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[test]
    fn sign_out_acknowledges() {
        assert_eq!(sign_out().message, "Successfully signed out");
    }
}
