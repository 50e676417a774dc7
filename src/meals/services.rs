use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::auth::repo::SessionStore;
use crate::auth::repo_types::SessionUser;
use crate::barcode::{LookupError, ProductLookup};
use crate::config::LatencyConfig;
use crate::meals::repo::MealStore;
use crate::meals::repo_types::{
    goal_or, GoalSettings, MealLog, NutritionInfo, Role, UserProfile, DEFAULT_CALORIE_GOAL,
    DEFAULT_CARBS_GOAL, DEFAULT_FAT_GOAL, DEFAULT_PROTEIN_GOAL,
};
use crate::telemetry::{HttpMethod, ServerLog, TelemetryLog};
use crate::vision::{decode_data_url, is_valid_barcode, VisionClient, VisionError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("No barcode detected in image")]
    NoBarcode,
    #[error("invalid barcode {0:?}")]
    InvalidBarcode(String),
    #[error("store write failed: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub uptime: u64,
    pub total_requests: u64,
    pub db_size: usize,
    pub logs: Vec<ServerLog>,
    pub degraded_reads: u64,
}

/// Today's intake against the daily goals.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: String,
    pub meal_count: usize,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calorie_goal: f64,
    pub protein_goal: f64,
    pub carbs_goal: f64,
    pub fat_goal: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub meal_count: usize,
    /// Mean health score on the 0-10 display scale, one decimal.
    pub average_health_score: Option<f64>,
    pub total_protein: f64,
}

/// Where a barcode meal comes from.
#[derive(Debug, Clone)]
pub enum BarcodeSource {
    Code(String),
    Image(String),
}

/// Simulated backend surface over the store, the telemetry log and the
/// external collaborators. One instance per composition root.
pub struct MockGateway {
    store: Arc<MealStore>,
    sessions: Arc<SessionStore>,
    telemetry: Arc<TelemetryLog>,
    vision: Arc<dyn VisionClient>,
    products: Arc<dyn ProductLookup>,
    latency: LatencyConfig,
    started_at: Instant,
    requests: AtomicU64,
    reloads: watch::Sender<u64>,
}

impl MockGateway {
    pub fn new(
        store: Arc<MealStore>,
        sessions: Arc<SessionStore>,
        telemetry: Arc<TelemetryLog>,
        vision: Arc<dyn VisionClient>,
        products: Arc<dyn ProductLookup>,
        latency: LatencyConfig,
    ) -> Self {
        let (reloads, _) = watch::channel(0);
        Self {
            store,
            sessions,
            telemetry,
            vision,
            products,
            latency,
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            reloads,
        }
    }

    /// Bumped every time the database is reset; clients reload on change.
    pub fn subscribe_reloads(&self) -> watch::Receiver<u64> {
        self.reloads.subscribe()
    }

    async fn simulate_latency(&self) {
        let LatencyConfig { min_ms, max_ms } = self.latency;
        if max_ms == 0 {
            return;
        }
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn log(&self, method: HttpMethod, endpoint: &str, status: u16, message: impl Into<String>) {
        self.telemetry
            .append(ServerLog::new(method, endpoint, status, message));
    }

    fn complete(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn get_status(&self) -> ServerStatus {
        ServerStatus {
            uptime: self.started_at.elapsed().as_secs(),
            total_requests: self.requests.load(Ordering::Relaxed),
            db_size: self.store.size_bytes().await,
            logs: self.telemetry.snapshot(),
            degraded_reads: self.store.degraded_reads(),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_meals(&self) -> Vec<MealLog> {
        self.simulate_latency().await;
        self.log(HttpMethod::Get, "/api/meals", 200, "Fetched all meal records");
        let meals = self.store.read().await.meals;
        self.complete();
        meals
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self) -> UserProfile {
        self.simulate_latency().await;
        let session = self.sessions.current().await;
        let goals = self.store.read().await.profile;
        self.log(HttpMethod::Get, "/api/profile", 200, "User profile retrieved");
        let profile = build_profile(session.as_ref(), &goals, today());
        self.complete();
        profile
    }

    /// Analyzes a `data:` URL image and logs the recognized food as a meal.
    /// Every failure is logged with status 500 and returned unchanged.
    #[instrument(skip(self, image), fields(image_len = image.len()))]
    pub async fn create_meal(&self, image: &str) -> Result<MealLog, GatewayError> {
        self.simulate_latency().await;
        self.log(
            HttpMethod::Post,
            "/api/analyze-food",
            200,
            "Processing AI vision request...",
        );

        let result = self.analyze_and_store(image).await;
        match &result {
            Ok(meal) => {
                info!(id = %meal.id, food = %meal.nutrition.food_name, "meal logged");
                self.log(
                    HttpMethod::Post,
                    "/api/meals",
                    201,
                    format!("Meal logged: {}", meal.nutrition.food_name),
                );
            }
            Err(e) => {
                error!(error = %e, "meal analysis failed");
                self.log(HttpMethod::Post, "/api/analyze-food", 500, "AI Analysis failed");
            }
        }
        self.complete();
        result
    }

    async fn analyze_and_store(&self, image: &str) -> Result<MealLog, GatewayError> {
        let payload = decode_data_url(image)?;
        let nutrition = self
            .vision
            .analyze_food(payload.bytes, &payload.mime_type)
            .await?;
        self.prepend_meal(image.to_string(), nutrition).await
    }

    async fn prepend_meal(
        &self,
        image_url: String,
        nutrition: NutritionInfo,
    ) -> Result<MealLog, GatewayError> {
        let now = crate::now_millis();
        self.store
            .update(move |doc| {
                let newest = doc
                    .meals
                    .iter()
                    .filter_map(|m| m.id.parse::<i64>().ok())
                    .max();
                let id = match newest {
                    Some(n) if n >= now => n.checked_add(1).unwrap_or(now),
                    _ => now,
                };
                let meal = MealLog {
                    id: id.to_string(),
                    timestamp: now,
                    image_url,
                    nutrition,
                };
                doc.meals.insert(0, meal.clone());
                meal
            })
            .await
            .map_err(GatewayError::Store)
    }

    /// Barcode flow: read the code (from the image if needed), look the
    /// product up and log it like any other meal.
    #[instrument(skip(self, source))]
    pub async fn log_product_meal(&self, source: BarcodeSource) -> Result<MealLog, GatewayError> {
        self.simulate_latency().await;
        self.log(HttpMethod::Post, "/api/barcode", 200, "Looking up product...");

        let result = self.lookup_and_store(source).await;
        let result = match result {
            Ok((meal, barcode)) => {
                info!(id = %meal.id, %barcode, "product logged");
                self.log(
                    HttpMethod::Post,
                    "/api/meals",
                    201,
                    format!("Product logged: {} ({barcode})", meal.nutrition.food_name),
                );
                Ok(meal)
            }
            Err(e) => {
                error!(error = %e, "barcode lookup failed");
                self.log(HttpMethod::Post, "/api/barcode", 500, e.to_string());
                Err(e)
            }
        };
        self.complete();
        result
    }

    async fn lookup_and_store(
        &self,
        source: BarcodeSource,
    ) -> Result<(MealLog, String), GatewayError> {
        let barcode = match source {
            BarcodeSource::Code(code) => {
                let code = code.trim().to_string();
                if !is_valid_barcode(&code) {
                    return Err(GatewayError::InvalidBarcode(code));
                }
                code
            }
            BarcodeSource::Image(image) => {
                let payload = decode_data_url(&image)?;
                self.vision
                    .read_barcode(payload.bytes, &payload.mime_type)
                    .await?
                    .ok_or(GatewayError::NoBarcode)?
            }
        };
        let product = self.products.lookup(&barcode).await?;
        let meal = self
            .prepend_meal(product.image_url.unwrap_or_default(), product.nutrition)
            .await?;
        Ok((meal, product.barcode))
    }

    /// Removes the given meals in one write; returns how many were found.
    #[instrument(skip(self))]
    pub async fn delete_meals(&self, ids: &[String]) -> Result<usize, GatewayError> {
        self.simulate_latency().await;
        let result = self
            .store
            .update(|doc| {
                let before = doc.meals.len();
                doc.meals.retain(|m| !ids.contains(&m.id));
                before - doc.meals.len()
            })
            .await
            .map_err(GatewayError::Store);
        match &result {
            Ok(n) => self.log(
                HttpMethod::Delete,
                "/api/meals",
                200,
                format!("Deleted {n} meal record(s)"),
            ),
            Err(e) => self.log(HttpMethod::Delete, "/api/meals", 500, e.to_string()),
        }
        self.complete();
        result
    }

    #[instrument(skip(self))]
    pub async fn update_goals(&self, patch: GoalSettings) -> Result<UserProfile, GatewayError> {
        self.simulate_latency().await;
        let result = self
            .store
            .update(|doc| {
                doc.profile.merge(patch);
                doc.profile.clone()
            })
            .await
            .map_err(GatewayError::Store);
        let goals = match result {
            Ok(goals) => goals,
            Err(e) => {
                self.log(HttpMethod::Put, "/api/profile", 500, e.to_string());
                self.complete();
                return Err(e);
            }
        };
        self.log(HttpMethod::Put, "/api/profile", 200, "Profile goals updated");
        let session = self.sessions.current().await;
        self.complete();
        Ok(build_profile(session.as_ref(), &goals, today()))
    }

    /// Wipes the store document and asks clients to reload.
    #[instrument(skip(self))]
    pub async fn reset_database(&self) {
        if let Err(e) = self.store.remove().await {
            error!(error = %e, "store removal failed");
        }
        self.log(
            HttpMethod::Delete,
            "/api/db",
            200,
            "Database wiped to factory settings",
        );
        self.reloads.send_modify(|generation| *generation += 1);
        self.complete();
    }

    pub async fn daily_summary(&self, now: OffsetDateTime) -> DailySummary {
        let doc = self.store.read().await;
        summarize_day(&doc.meals, &doc.profile, now)
    }

    pub async fn history_stats(&self) -> HistoryStats {
        let doc = self.store.read().await;
        history_stats(&doc.meals)
    }
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Identity from the session side-channel, goals from the store document.
pub fn build_profile(session: Option<&SessionUser>, goals: &GoalSettings, today: Date) -> UserProfile {
    let (name, email, role) = match session {
        Some(s) => (
            s.name.clone().filter(|n| !n.is_empty()).unwrap_or_else(|| "User".into()),
            s.email
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "user@nutrivision.ai".into()),
            s.role.unwrap_or(Role::User),
        ),
        None => (
            "Demo User".to_string(),
            "demo@nutrivision.ai".to_string(),
            Role::User,
        ),
    };
    let onboarding = session.map(|s| &s.profile);

    UserProfile {
        name,
        email,
        role,
        daily_calorie_goal: goal_or(goals.daily_calorie_goal, DEFAULT_CALORIE_GOAL),
        daily_protein_goal: goal_or(goals.daily_protein_goal, DEFAULT_PROTEIN_GOAL),
        daily_carbs_goal: goal_or(goals.daily_carbs_goal, DEFAULT_CARBS_GOAL),
        daily_fat_goal: goal_or(goals.daily_fat_goal, DEFAULT_FAT_GOAL),
        weight: goals
            .weight
            .or_else(|| onboarding.and_then(|p| p.current_weight.or(p.weight))),
        height: goals.height.or_else(|| onboarding.and_then(|p| p.height)),
        age: goals.age.or_else(|| {
            onboarding
                .and_then(|p| p.birthdate.as_deref())
                .and_then(|b| age_on(b, today))
        }),
        gender: goals.gender.or_else(|| onboarding.and_then(|p| p.gender)),
        activity_level: goals.activity_level.clone(),
        fitness_goal: goals
            .fitness_goal
            .clone()
            .or_else(|| onboarding.and_then(|p| p.fitness_goal.clone())),
    }
}

/// Whole years between a `YYYY-MM-DD` birthdate and `today`.
pub fn age_on(birthdate: &str, today: Date) -> Option<u32> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    let born = Date::parse(birthdate, &format).ok()?;
    if born > today {
        return None;
    }
    let mut age = today.year() - born.year();
    if (today.month() as u8, today.day()) < (born.month() as u8, born.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

pub fn summarize_day(meals: &[MealLog], goals: &GoalSettings, now: OffsetDateTime) -> DailySummary {
    let midnight = now.replace_time(time::Time::MIDNIGHT);
    let start_ms = (midnight.unix_timestamp_nanos() / 1_000_000) as i64;
    let todays: Vec<&NutritionInfo> = meals
        .iter()
        .filter(|m| m.timestamp >= start_ms)
        .map(|m| &m.nutrition)
        .collect();

    DailySummary {
        date: now.date().to_string(),
        meal_count: todays.len(),
        calories: todays.iter().map(|n| n.calories).sum(),
        protein: todays.iter().map(|n| n.protein).sum(),
        carbs: todays.iter().map(|n| n.carbs).sum(),
        fat: todays.iter().map(|n| n.fat).sum(),
        calorie_goal: goal_or(goals.daily_calorie_goal, DEFAULT_CALORIE_GOAL),
        protein_goal: goal_or(goals.daily_protein_goal, DEFAULT_PROTEIN_GOAL),
        carbs_goal: goal_or(goals.daily_carbs_goal, DEFAULT_CARBS_GOAL),
        fat_goal: goal_or(goals.daily_fat_goal, DEFAULT_FAT_GOAL),
    }
}

pub fn history_stats(meals: &[MealLog]) -> HistoryStats {
    let average_health_score = if meals.is_empty() {
        None
    } else {
        let mean = meals.iter().map(|m| m.nutrition.health_score).sum::<f64>() / meals.len() as f64;
        // 0-100 stored, 0-10 displayed
        Some(mean.round() / 10.0)
    };
    HistoryStats {
        meal_count: meals.len(),
        average_health_score,
        total_protein: meals.iter().map(|m| m.nutrition.protein).sum(),
    }
}
