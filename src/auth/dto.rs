use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::{UserRecord, WeightEntry};
use crate::meals::repo_types::{Gender, Role};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response returned after login, register or refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub onboarding_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitness_goal: Option<String>,
    pub created_at: i64,
    pub last_login: i64,
}

impl From<&UserRecord> for PublicUser {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.uid,
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
            onboarding_completed: u.profile.onboarding_completed,
            weight: u.profile.weight,
            height: u.profile.height,
            birthdate: u.profile.birthdate.clone(),
            gender: u.profile.gender,
            fitness_goal: u.profile.fitness_goal.clone(),
            created_at: u.created_at,
            last_login: u.last_login,
        }
    }
}

/// Answers collected by the onboarding flow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub weight: f64,
    pub height: f64,
    pub birthdate: String,
    pub gender: Gender,
    #[serde(default)]
    pub is_pregnant: Option<bool>,
    #[serde(default)]
    pub trimester: Option<String>,
    pub fitness_goal: String,
    #[serde(default)]
    pub target_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetWeightRequest {
    pub target_weight: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightData {
    pub current_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    pub weight_history: Vec<WeightEntry>,
}

impl From<&UserRecord> for WeightData {
    fn from(u: &UserRecord) -> Self {
        let p = &u.profile;
        Self {
            current_weight: p.current_weight.or(p.weight).unwrap_or(0.0),
            target_weight: p.target_weight,
            weight_history: p.weight_history.clone(),
        }
    }
}
