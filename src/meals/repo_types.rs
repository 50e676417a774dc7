use serde::{Deserialize, Serialize};

pub const DEFAULT_CALORIE_GOAL: f64 = 2200.0;
pub const DEFAULT_PROTEIN_GOAL: f64 = 150.0;
pub const DEFAULT_CARBS_GOAL: f64 = 250.0;
pub const DEFAULT_FAT_GOAL: f64 = 70.0;

/// Nutrient facts for one food or product. `health_score` is on the 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NutritionInfo {
    pub food_name: String,
    #[serde(default)]
    pub serving_size: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default)]
    pub health_score: f64,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub health_benefits: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MealLog {
    pub id: String,
    pub timestamp: i64,
    pub image_url: String,
    pub nutrition: NutritionInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Trainer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// The `profile` sub-object of the store document. Every field is optional
/// on disk; defaults are applied when a [`UserProfile`] is assembled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_calorie_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_protein_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_carbs_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_fat_goal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness_goal: Option<String>,
}

impl GoalSettings {
    pub fn with_defaults() -> Self {
        Self {
            daily_calorie_goal: Some(DEFAULT_CALORIE_GOAL),
            daily_protein_goal: Some(DEFAULT_PROTEIN_GOAL),
            daily_carbs_goal: Some(DEFAULT_CARBS_GOAL),
            daily_fat_goal: Some(DEFAULT_FAT_GOAL),
            ..Self::default()
        }
    }

    /// Overlay every field that is set in `patch`.
    pub fn merge(&mut self, patch: GoalSettings) {
        macro_rules! take {
            ($($f:ident),*) => { $( if patch.$f.is_some() { self.$f = patch.$f; } )* };
        }
        take!(
            daily_calorie_goal,
            daily_protein_goal,
            daily_carbs_goal,
            daily_fat_goal,
            weight,
            height,
            age,
            gender,
            activity_level,
            fitness_goal
        );
    }
}

/// The single persisted aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreDocument {
    #[serde(default)]
    pub meals: Vec<MealLog>,
    #[serde(default)]
    pub profile: GoalSettings,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            meals: Vec::new(),
            profile: GoalSettings::with_defaults(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub daily_calorie_goal: f64,
    pub daily_protein_goal: f64,
    pub daily_carbs_goal: f64,
    pub daily_fat_goal: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitness_goal: Option<String>,
}

/// A stored goal of zero counts as unset.
pub(crate) fn goal_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v > 0.0 => v,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_uses_camel_case_wire_names() {
        let doc = StoreDocument {
            meals: vec![MealLog {
                id: "1700000000000".into(),
                timestamp: 1_700_000_000_000,
                image_url: "data:image/jpeg;base64,AAAA".into(),
                nutrition: NutritionInfo {
                    food_name: "Apple".into(),
                    health_score: 90.0,
                    ..NutritionInfo::default()
                },
            }],
            profile: GoalSettings::with_defaults(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["meals"][0]["imageUrl"], "data:image/jpeg;base64,AAAA");
        assert_eq!(json["meals"][0]["nutrition"]["foodName"], "Apple");
        assert_eq!(json["meals"][0]["nutrition"]["healthScore"], 90.0);
        assert_eq!(json["profile"]["dailyCalorieGoal"], 2200.0);
        assert!(json["profile"].get("weight").is_none());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let doc: StoreDocument = serde_json::from_str(r#"{"meals":[]}"#).unwrap();
        assert!(doc.meals.is_empty());
        assert_eq!(doc.profile, GoalSettings::default());

        let doc: StoreDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.meals.is_empty());
    }

    #[test]
    fn merge_overlays_only_present_fields() {
        let mut goals = GoalSettings::with_defaults();
        goals.merge(GoalSettings {
            daily_protein_goal: Some(180.0),
            weight: Some(72.5),
            ..GoalSettings::default()
        });
        assert_eq!(goals.daily_protein_goal, Some(180.0));
        assert_eq!(goals.daily_calorie_goal, Some(DEFAULT_CALORIE_GOAL));
        assert_eq!(goals.weight, Some(72.5));
    }

    #[test]
    fn zero_goal_falls_back_to_default() {
        assert_eq!(goal_or(Some(0.0), 70.0), 70.0);
        assert_eq!(goal_or(None, 70.0), 70.0);
        assert_eq!(goal_or(Some(65.0), 70.0), 65.0);
    }
}
