mod open_food_facts;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::meals::repo_types::NutritionInfo;

pub use open_food_facts::OpenFoodFactsClient;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Product not found in database")]
    NotFound,
    #[error("product lookup failed: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundProduct {
    pub barcode: String,
    pub nutrition: NutritionInfo,
    pub image_url: Option<String>,
}

/// External product database keyed by barcode.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn lookup(&self, barcode: &str) -> Result<FoundProduct, LookupError>;
}

/// The subset of an Open Food Facts product record we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_name_en: Option<String>,
    #[serde(default)]
    pub serving_size: Option<String>,
    #[serde(default)]
    pub serving_quantity: Option<Value>,
    #[serde(default)]
    pub ingredients_text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub labels_tags: Vec<String>,
    #[serde(default)]
    pub allergens_tags: Vec<String>,
    #[serde(default)]
    pub additives_tags: Vec<String>,
    #[serde(default)]
    pub nutriments: serde_json::Map<String, Value>,
}

impl Product {
    fn nutriment(&self, key: &str) -> Option<f64> {
        match self.nutriments.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Per-100g value, falling back to the per-serving field. Zero counts as missing.
    fn first_of(&self, keys: &[&str]) -> Option<f64> {
        keys.iter()
            .filter_map(|k| self.nutriment(k))
            .find(|v| *v != 0.0)
    }

    fn per_100g(&self, name: &str) -> f64 {
        self.nutriment(&format!("{name}_100g")).unwrap_or(0.0)
    }
}

/// Product nutriments mapped onto [`NutritionInfo`]. Grams are rounded to
/// whole numbers and the 1-10 heuristic score is stored on the 0-100 scale.
pub fn map_product(product: &Product) -> NutritionInfo {
    let calories = product
        .first_of(&["energy-kcal_100g", "energy-kcal"])
        .or_else(|| product.nutriment("energy_100g").map(|kj| kj / 4.184))
        .unwrap_or(0.0);

    let grams = |name: &str| -> f64 {
        let per_100g = format!("{name}_100g");
        product
            .first_of(&[per_100g.as_str(), name])
            .unwrap_or(0.0)
            .round()
    };

    let serving_size = product
        .serving_size
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| match &product.serving_quantity {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "100g".into());

    NutritionInfo {
        food_name: product
            .product_name
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| product.product_name_en.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "Unknown Product".into()),
        serving_size,
        calories: calories.round(),
        protein: grams("proteins"),
        carbs: grams("carbohydrates"),
        fat: grams("fat"),
        fiber: grams("fiber"),
        sugar: grams("sugars"),
        health_score: f64::from(health_score(product)) * 10.0,
        ingredients: product
            .ingredients_text
            .clone()
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
        health_benefits: health_benefits(product),
        warnings: warnings(product),
    }
}

/// Heuristic 1-10 score from per-100g nutriments.
pub fn health_score(product: &Product) -> u8 {
    let mut score: i32 = 5;
    if product.per_100g("proteins") > 10.0 {
        score += 1;
    }
    if product.per_100g("fiber") > 5.0 {
        score += 1;
    }
    if product.per_100g("fruits-vegetables-nuts") > 40.0 {
        score += 1;
    }
    if product.per_100g("sugars") > 15.0 {
        score -= 1;
    }
    if product.per_100g("fat") > 20.0 {
        score -= 1;
    }
    if product.per_100g("salt") > 1.5 {
        score -= 1;
    }
    if product.per_100g("saturated-fat") > 5.0 {
        score -= 1;
    }
    score.clamp(1, 10) as u8
}

fn health_benefits(product: &Product) -> Vec<String> {
    let mut benefits = Vec::new();
    if product.per_100g("proteins") > 10.0 {
        benefits.push("High in protein".to_string());
    }
    if product.per_100g("fiber") > 5.0 {
        benefits.push("Good source of fiber".to_string());
    }
    if product.labels_tags.iter().any(|t| t == "en:organic") {
        benefits.push("Organic product".to_string());
    }
    if product.nutriment("fat_100g").is_some_and(|fat| fat < 3.0) {
        benefits.push("Low fat".to_string());
    }
    if benefits.is_empty() {
        benefits.push("Packaged food item".to_string());
    }
    benefits
}

fn warnings(product: &Product) -> Vec<String> {
    let mut warnings = Vec::new();
    if product.per_100g("sugars") > 15.0 {
        warnings.push("High in sugar".to_string());
    }
    if product.per_100g("salt") > 1.5 {
        warnings.push("High in sodium".to_string());
    }
    if product.per_100g("saturated-fat") > 5.0 {
        warnings.push("High in saturated fat".to_string());
    }
    if !product.allergens_tags.is_empty() {
        warnings.push(format!(
            "Contains allergens: {}",
            product.allergens_tags.join(", ")
        ));
    }
    if product.additives_tags.len() > 5 {
        warnings.push("Contains multiple additives".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(v: Value) -> Product {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn maps_a_typical_product() {
        let p = product(json!({
            "product_name": "Greek Yogurt",
            "serving_size": "170g",
            "ingredients_text": "milk, cultures",
            "labels_tags": ["en:organic"],
            "nutriments": {
                "energy-kcal_100g": 97.4,
                "proteins_100g": 10.3,
                "carbohydrates_100g": 3.6,
                "fat_100g": 5.0,
                "sugars_100g": 3.2
            }
        }));
        let info = map_product(&p);
        assert_eq!(info.food_name, "Greek Yogurt");
        assert_eq!(info.serving_size, "170g");
        assert_eq!(info.calories, 97.0);
        assert_eq!(info.protein, 10.0);
        assert_eq!(info.carbs, 4.0);
        assert_eq!(info.ingredients, vec!["milk, cultures"]);
        assert_eq!(info.health_score, 60.0);
        assert!(info.health_benefits.contains(&"High in protein".to_string()));
        assert!(info.health_benefits.contains(&"Organic product".to_string()));
        assert!(info.warnings.is_empty());
    }

    #[test]
    fn falls_back_on_kilojoules_and_defaults() {
        let p = product(json!({ "nutriments": { "energy_100g": 418.4 } }));
        let info = map_product(&p);
        assert_eq!(info.food_name, "Unknown Product");
        assert_eq!(info.serving_size, "100g");
        assert_eq!(info.calories, 100.0);
        assert_eq!(info.health_benefits, vec!["Packaged food item"]);
    }

    #[test]
    fn unhealthy_product_scores_low_and_warns() {
        let p = product(json!({
            "product_name": "Cola Chips",
            "allergens_tags": ["en:gluten", "en:soybeans"],
            "additives_tags": ["e1", "e2", "e3", "e4", "e5", "e6"],
            "nutriments": {
                "sugars_100g": 30,
                "fat_100g": 32,
                "salt_100g": "2.1",
                "saturated-fat_100g": 12
            }
        }));
        assert_eq!(health_score(&p), 1);
        let info = map_product(&p);
        assert_eq!(info.health_score, 10.0);
        assert_eq!(
            info.warnings,
            vec![
                "High in sugar",
                "High in sodium",
                "High in saturated fat",
                "Contains allergens: en:gluten, en:soybeans",
                "Contains multiple additives",
            ]
        );
    }

    #[test]
    fn positive_factors_raise_score() {
        let p = product(json!({
            "nutriments": {
                "proteins_100g": 20,
                "fiber_100g": 8,
                "fruits-vegetables-nuts_100g": 80
            }
        }));
        assert_eq!(health_score(&p), 8);
    }
}
