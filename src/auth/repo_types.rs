use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::meals::repo_types::{Gender, Role};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightEntry {
    pub date: String, // YYYY-MM-DD
    pub weight: f64,
    pub timestamp: i64,
}

/// Profile fields shared by the persisted user record and the session blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pregnant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trimester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_weight: Option<f64>,
    #[serde(default)]
    pub weight_history: Vec<WeightEntry>,
}

/// User record in the users document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    pub password_hash: String, // Argon2 PHC string
    pub created_at: i64,
    pub last_login: i64,
    #[serde(flatten)]
    pub profile: ProfileData,
}

/// The whole users document, keyed by uid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsersDocument {
    #[serde(default)]
    pub users: BTreeMap<Uuid, UserRecord>,
}

impl UsersDocument {
    pub fn find_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.email == email)
    }
}

/// Blob stored under the `user` key while someone is signed in. Every field
/// is optional on read since other writers may have stored partial data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
    #[serde(flatten)]
    pub profile: ProfileData,
}

/// Unknown values read as `None` instead of failing the whole blob.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl From<&UserRecord> for SessionUser {
    fn from(u: &UserRecord) -> Self {
        Self {
            uid: Some(u.uid),
            name: Some(u.name.clone()),
            email: Some(u.email.clone()),
            role: Some(u.role),
            profile: u.profile.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_flattens_profile_fields() {
        let rec = UserRecord {
            uid: Uuid::new_v4(),
            email: "a@b.co".into(),
            name: "Ana".into(),
            role: Role::Trainer,
            password_hash: "$argon2id$...".into(),
            created_at: 1,
            last_login: 2,
            profile: ProfileData {
                weight: Some(60.0),
                ..ProfileData::default()
            },
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["role"], "trainer");
        assert_eq!(json["weight"], 60.0);
        assert_eq!(json["onboardingCompleted"], false);
        assert!(json.get("profile").is_none());
    }

    #[test]
    fn unknown_role_and_gender_do_not_reject_session() {
        let s: SessionUser = serde_json::from_str(
            r#"{"name":"Ana","email":"ana@x.io","role":"admin","gender":"other","height":170}"#,
        )
        .unwrap();
        assert_eq!(s.name.as_deref(), Some("Ana"));
        assert_eq!(s.role, None);
        assert_eq!(s.profile.gender, None);
        assert_eq!(s.profile.height, Some(170.0));

        let s: SessionUser =
            serde_json::from_str(r#"{"role":"trainer","gender":"female"}"#).unwrap();
        assert_eq!(s.role, Some(Role::Trainer));
        assert_eq!(s.profile.gender, Some(Gender::Female));
    }

    #[test]
    fn session_blob_tolerates_partial_data() {
        let s: SessionUser = serde_json::from_str(r#"{"email":"x@y.io"}"#).unwrap();
        assert_eq!(s.email.as_deref(), Some("x@y.io"));
        assert!(s.name.is_none());
        assert!(s.profile.weight_history.is_empty());
    }
}
