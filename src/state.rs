use crate::auth::repo::{SessionStore, UserDirectory};
use crate::auth::services::{AuthService, JwtKeys};
use crate::barcode::{OpenFoodFactsClient, ProductLookup};
use crate::config::AppConfig;
use crate::meals::repo::MealStore;
use crate::meals::services::MockGateway;
use crate::storage::{FileStore, KeyValueStore};
use crate::telemetry::TelemetryLog;
use crate::vision::{GeminiVisionClient, VisionClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub gateway: Arc<MockGateway>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let kv = Arc::new(FileStore::open(&config.data_dir).await?) as Arc<dyn KeyValueStore>;

        // Реальные внешние сервисы
        let vision = Arc::new(GeminiVisionClient::new(
            config.gemini.api_key.clone(),
            config.gemini.model.clone(),
        )) as Arc<dyn VisionClient>;
        let products =
            Arc::new(OpenFoodFactsClient::new(config.open_food_facts_url.clone())) as Arc<dyn ProductLookup>;

        Ok(Self::from_parts(config, kv, vision, products))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        kv: Arc<dyn KeyValueStore>,
        vision: Arc<dyn VisionClient>,
        products: Arc<dyn ProductLookup>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(kv.clone()));
        let auth = Arc::new(AuthService::new(
            Arc::new(UserDirectory::new(kv.clone())),
            sessions.clone(),
            JwtKeys::from_config(&config.jwt),
        ));
        let gateway = Arc::new(MockGateway::new(
            Arc::new(MealStore::new(kv.clone())),
            sessions,
            Arc::new(TelemetryLog::new()),
            vision,
            products,
            config.latency,
        ));
        Self {
            config,
            auth,
            gateway,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use fakes::{apple, StubProducts, StubVision};
        Self::fake_with(StubVision::food(apple()), StubProducts::missing())
    }

    #[cfg(test)]
    pub fn fake_with(vision: fakes::StubVision, products: fakes::StubProducts) -> Self {
        use crate::config::{GeminiConfig, JwtConfig, LatencyConfig};
        use crate::storage::MemoryStore;

        let config = Arc::new(AppConfig {
            data_dir: std::env::temp_dir(),
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            gemini: GeminiConfig {
                api_key: "fake".into(),
                model: "fake".into(),
            },
            open_food_facts_url: "https://{region}.fake.local".into(),
            latency: LatencyConfig::none(),
        });

        Self::from_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(vision),
            Arc::new(products),
        )
    }
}
