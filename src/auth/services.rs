use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::dto::{AuthResponse, OnboardingRequest, PublicUser, WeightData};
use crate::auth::repo::{SessionStore, UserDirectory};
use crate::auth::repo_types::{SessionUser, UserRecord, WeightEntry};
use crate::config::JwtConfig;
use crate::meals::repo_types::Role;
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Password should be at least 6 characters long.")]
    WeakPassword,
    #[error("This email is already registered. Please login instead.")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("User not found")]
    UserNotFound,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Token type used to tell access and refresh JWTs apart.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub role: Role,
    pub kind: TokenKind,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, role: Role, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            role,
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid, role: Role) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, role, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid, role: Role) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, role, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.auth.keys().clone()
    }
}

/// Local identity provider: user records, password checks, tokens, and the
/// signed-in session blob.
pub struct AuthService {
    users: Arc<UserDirectory>,
    sessions: Arc<SessionStore>,
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<UserDirectory>, sessions: Arc<SessionStore>, keys: JwtKeys) -> Self {
        Self {
            users,
            sessions,
            keys,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    fn issue(&self, user: &UserRecord) -> Result<AuthResponse, AuthError> {
        Ok(AuthResponse {
            access_token: self.keys.sign_access(user.uid, user.role)?,
            refresh_token: self.keys.sign_refresh(user.uid, user.role)?,
            user: PublicUser::from(user),
        })
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<AuthResponse, AuthError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AuthError::WeakPassword);
        }

        let hash = hash_password(password)?;
        let now = crate::now_millis();
        let name = match name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            n => n.to_string(),
        };
        let record = UserRecord {
            uid: Uuid::new_v4(),
            email: email.clone(),
            name,
            role,
            password_hash: hash,
            created_at: now,
            last_login: now,
            profile: Default::default(),
        };

        let user = self
            .users
            .update(|doc| {
                if doc.find_by_email(&email).is_some() {
                    return Ok(None);
                }
                doc.users.insert(record.uid, record.clone());
                Ok(Some(record))
            })
            .await?
            .ok_or_else(|| {
                warn!(email = %email, "email already registered");
                AuthError::EmailTaken
            })?;

        self.sessions.save(&SessionUser::from(&user)).await?;
        info!(user_id = %user.uid, email = %user.email, "user registered");
        self.issue(&user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            warn!(email = %email, user_id = %user.uid, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let now = crate::now_millis();
        let user = self
            .users
            .update(|doc| {
                let rec = doc
                    .users
                    .get_mut(&user.uid)
                    .ok_or_else(|| anyhow::anyhow!("user vanished during login"))?;
                rec.last_login = now;
                Ok(rec.clone())
            })
            .await?;

        self.sessions.save(&SessionUser::from(&user)).await?;
        info!(user_id = %user.uid, "user logged in");
        self.issue(&user)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.sessions.clear().await?;
        info!("user logged out");
        Ok(())
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        let claims = self
            .keys
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidToken)?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        self.issue(&user)
    }

    pub async fn me(&self, uid: Uuid) -> Result<PublicUser, AuthError> {
        let user = self.users.find_by_id(uid).await?.ok_or(AuthError::UserNotFound)?;
        Ok(PublicUser::from(&user))
    }

    /// Applies `f` to the user record and mirrors the result into the
    /// session blob when that session belongs to the same user.
    async fn modify_user<F>(&self, uid: Uuid, f: F) -> Result<UserRecord, AuthError>
    where
        F: FnOnce(&mut UserRecord) + Send,
    {
        let user = self
            .users
            .update(|doc| {
                Ok(doc.users.get_mut(&uid).map(|rec| {
                    f(rec);
                    rec.clone()
                }))
            })
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(session) = self.sessions.current().await {
            if session.uid == Some(uid) {
                self.sessions.save(&SessionUser::from(&user)).await?;
            }
        }
        Ok(user)
    }

    pub async fn update_onboarding(
        &self,
        uid: Uuid,
        data: OnboardingRequest,
    ) -> Result<PublicUser, AuthError> {
        if !(data.weight > 0.0 && data.height > 0.0) {
            return Err(AuthError::InvalidInput(
                "weight and height must be positive".into(),
            ));
        }
        let entry = weight_entry(data.weight, OffsetDateTime::now_utc());
        let user = self
            .modify_user(uid, move |rec| {
                let p = &mut rec.profile;
                p.onboarding_completed = true;
                p.weight = Some(data.weight);
                p.current_weight = Some(data.weight);
                p.height = Some(data.height);
                p.birthdate = Some(data.birthdate);
                p.gender = Some(data.gender);
                p.fitness_goal = Some(data.fitness_goal);
                if data.is_pregnant.is_some() {
                    p.is_pregnant = data.is_pregnant;
                }
                if data.trimester.is_some() {
                    p.trimester = data.trimester;
                }
                if data.target_weight.is_some() {
                    p.target_weight = data.target_weight;
                }
                p.weight_history = vec![entry];
            })
            .await?;
        info!(user_id = %uid, "onboarding completed");
        Ok(PublicUser::from(&user))
    }

    pub async fn add_weight_entry(&self, uid: Uuid, weight: f64) -> Result<WeightData, AuthError> {
        if weight <= 0.0 {
            return Err(AuthError::InvalidInput("weight must be positive".into()));
        }
        let entry = weight_entry(weight, OffsetDateTime::now_utc());
        let user = self
            .modify_user(uid, move |rec| {
                rec.profile.current_weight = Some(weight);
                rec.profile.weight_history.push(entry);
            })
            .await?;
        Ok(WeightData::from(&user))
    }

    pub async fn update_target_weight(&self, uid: Uuid, target: f64) -> Result<WeightData, AuthError> {
        if target <= 0.0 {
            return Err(AuthError::InvalidInput("target weight must be positive".into()));
        }
        let user = self
            .modify_user(uid, move |rec| rec.profile.target_weight = Some(target))
            .await?;
        Ok(WeightData::from(&user))
    }

    pub async fn weight_data(&self, uid: Uuid) -> Result<WeightData, AuthError> {
        let user = self.users.find_by_id(uid).await?.ok_or(AuthError::UserNotFound)?;
        Ok(WeightData::from(&user))
    }
}

fn weight_entry(weight: f64, at: OffsetDateTime) -> WeightEntry {
    WeightEntry {
        date: at.date().to_string(),
        weight,
        timestamp: (at.unix_timestamp_nanos() / 1_000_000) as i64,
    }
}


#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id, Role::Trainer).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Trainer);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn verify_refresh_rejects_access_token() {
        let keys = keys("dev-secret", "iss", "aud");
        let token = keys.sign_access(Uuid::new_v4(), Role::User).expect("sign access");
        let err = keys.verify_refresh(&token).unwrap_err();
        assert!(err.to_string().contains("not a refresh token"));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = keys("same-secret", "good-iss", "good-aud");
        let bad = keys("same-secret", "bad-iss", "bad-aud");
        let token = good.sign_access(Uuid::new_v4(), Role::User).expect("sign access");
        assert!(bad.verify(&token).is_err());
    }
}

#[cfg(test)]
mod service_tests {
    use super::*;
    use crate::auth::repo::SESSION_KEY;
    use crate::meals::repo_types::Gender;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn service() -> (Arc<MemoryStore>, AuthService) {
        let kv = Arc::new(MemoryStore::new());
        let svc = AuthService::new(
            Arc::new(UserDirectory::new(kv.clone())),
            Arc::new(SessionStore::new(kv.clone())),
            JwtKeys::from_config(&JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            }),
        );
        (kv, svc)
    }

    fn onboarding() -> OnboardingRequest {
        OnboardingRequest {
            weight: 72.0,
            height: 178.0,
            birthdate: "1994-05-02".into(),
            gender: Gender::Male,
            is_pregnant: None,
            trimester: None,
            fitness_goal: "lose_weight".into(),
            target_weight: Some(68.0),
        }
    }

    #[tokio::test]
    async fn register_login_logout_flow() {
        let (kv, svc) = service();
        let reg = svc
            .register("  Ana@Example.com ", "hunter22", "Ana", Role::User)
            .await
            .unwrap();
        assert_eq!(reg.user.email, "ana@example.com");
        assert!(kv.get(SESSION_KEY).await.unwrap().is_some());

        svc.logout().await.unwrap();
        assert!(kv.get(SESSION_KEY).await.unwrap().is_none());

        let login = svc.login("ana@example.com", "hunter22").await.unwrap();
        assert_eq!(login.user.id, reg.user.id);
        let claims = svc.keys().verify(&login.access_token).unwrap();
        assert_eq!(claims.sub, reg.user.id);
    }

    #[tokio::test]
    async fn register_validates_and_rejects_duplicates() {
        let (_, svc) = service();
        assert!(matches!(
            svc.register("bad", "hunter22", "x", Role::User).await,
            Err(AuthError::InvalidEmail)
        ));
        assert!(matches!(
            svc.register("a@b.co", "12345", "x", Role::User).await,
            Err(AuthError::WeakPassword)
        ));
        svc.register("a@b.co", "123456", "", Role::Trainer).await.unwrap();
        assert!(matches!(
            svc.register("A@B.co", "123456", "x", Role::User).await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn blank_name_falls_back_to_email_local_part() {
        let (_, svc) = service();
        let reg = svc.register("chef@b.co", "123456", " ", Role::User).await.unwrap();
        assert_eq!(reg.user.name, "chef");
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials_uniformly() {
        let (_, svc) = service();
        svc.register("a@b.co", "123456", "A", Role::User).await.unwrap();
        assert!(matches!(
            svc.login("a@b.co", "wrong!").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            svc.login("nobody@b.co", "123456").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn refresh_issues_new_pair_and_rejects_access_tokens() {
        let (_, svc) = service();
        let reg = svc.register("a@b.co", "123456", "A", Role::User).await.unwrap();
        let again = svc.refresh(&reg.refresh_token).await.unwrap();
        assert_eq!(again.user.id, reg.user.id);
        assert!(matches!(
            svc.refresh(&reg.access_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn onboarding_updates_record_and_session() {
        let (kv, svc) = service();
        let reg = svc.register("a@b.co", "123456", "A", Role::User).await.unwrap();
        let user = svc.update_onboarding(reg.user.id, onboarding()).await.unwrap();
        assert!(user.onboarding_completed);

        let raw = kv.get(SESSION_KEY).await.unwrap().unwrap();
        let session: SessionUser = serde_json::from_str(&raw).unwrap();
        assert!(session.profile.onboarding_completed);
        assert_eq!(session.profile.weight_history.len(), 1);
        assert_eq!(session.profile.target_weight, Some(68.0));

        let weights = svc.weight_data(reg.user.id).await.unwrap();
        assert_eq!(weights.current_weight, 72.0);
        assert_eq!(weights.weight_history[0].weight, 72.0);
    }

    #[tokio::test]
    async fn weight_tracking_appends_history() {
        let (_, svc) = service();
        let reg = svc.register("a@b.co", "123456", "A", Role::User).await.unwrap();
        svc.update_onboarding(reg.user.id, onboarding()).await.unwrap();
        svc.add_weight_entry(reg.user.id, 71.2).await.unwrap();
        let data = svc.update_target_weight(reg.user.id, 66.0).await.unwrap();
        assert_eq!(data.current_weight, 71.2);
        assert_eq!(data.target_weight, Some(66.0));
        assert_eq!(data.weight_history.len(), 2);

        assert!(matches!(
            svc.add_weight_entry(reg.user.id, -1.0).await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.weight_data(Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn other_users_session_is_left_alone() {
        let (kv, svc) = service();
        let first = svc.register("a@b.co", "123456", "A", Role::User).await.unwrap();
        svc.register("b@b.co", "123456", "B", Role::User).await.unwrap();
        svc.add_weight_entry(first.user.id, 80.0).await.unwrap();

        let raw = kv.get(SESSION_KEY).await.unwrap().unwrap();
        let session: SessionUser = serde_json::from_str(&raw).unwrap();
        assert_eq!(session.email.as_deref(), Some("b@b.co"));
        assert!(session.profile.weight_history.is_empty());
    }
}
