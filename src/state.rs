use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::analysis::{AnalysisProvider, AnalysisService, HttpAnalysisProvider, MockAnalysisProvider};
use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::foods::barcode::ProductDirectory;
use crate::foods::FoodCatalog;
use crate::meals::{MealRepository, MealStore, MemoryMealStore, PgMealStore};
use crate::pending::PendingActionManager;
use crate::profiles::{MemoryProfileStore, PgProfileStore, ProfileStore};
use crate::storage::{MemoryStorage, Storage, StorageClient};

/// Everything a request handler needs, shared by handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
    pub storage: Arc<dyn StorageClient>,
    pub analysis: Arc<AnalysisService>,
    pub meals: Arc<MealRepository>,
    pub pending: PendingActionManager,
    pub profiles: Arc<dyn ProfileStore>,
    pub catalog: Arc<FoodCatalog>,
    pub products: Arc<ProductDirectory>,
}

/// Collaborators that differ between a deployment and a local run.
pub struct Backends {
    pub provider: Arc<dyn AnalysisProvider>,
    pub meal_store: Arc<dyn MealStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub storage: Arc<dyn StorageClient>,
    pub catalog: FoodCatalog,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let (meal_store, profiles): (Arc<dyn MealStore>, Arc<dyn ProfileStore>) =
            match &config.database_url {
                Some(url) => {
                    let db = crate::db::connect(url).await?;
                    (Arc::new(PgMealStore::new(db.clone())), Arc::new(PgProfileStore::new(db)))
                }
                None => {
                    tracing::warn!("DATABASE_URL not set; meals and profiles are kept in memory");
                    (Arc::new(MemoryMealStore::new()), Arc::new(MemoryProfileStore::default()))
                }
            };

        let storage: Arc<dyn StorageClient> = match &config.minio {
            Some(minio) => Arc::new(Storage::new(minio, "us-east-1").await?),
            None => {
                tracing::warn!("MINIO_ENDPOINT not set; meal images are kept in memory");
                Arc::new(MemoryStorage::default())
            }
        };

        let provider: Arc<dyn AnalysisProvider> = match &config.analysis.endpoint {
            Some(endpoint) => Arc::new(
                HttpAnalysisProvider::new(endpoint, config.analysis.timeout)
                    .context("build analysis client")?,
            ),
            None => {
                tracing::warn!("ANALYSIS_ENDPOINT not set; using the mock analysis provider");
                Arc::new(MockAnalysisProvider::default())
            }
        };

        let catalog = match &config.food_catalog_path {
            Some(path) => FoodCatalog::from_json_file(path)?,
            None => FoodCatalog::default(),
        };

        Ok(Self::from_parts(
            config,
            Backends {
                provider,
                meal_store,
                profiles,
                storage,
                catalog,
            },
        ))
    }

    pub fn from_parts(config: AppConfig, backends: Backends) -> Self {
        let analysis = Arc::new(AnalysisService::new(backends.provider, config.analysis.timeout));
        let meals = Arc::new(MealRepository::new(backends.meal_store));
        let pending = PendingActionManager::new(
            analysis.clone(),
            meals.clone(),
            backends.storage.clone(),
            config.pipeline.clone(),
        );
        Self {
            jwt: Arc::new(JwtKeys::new(&config.jwt)),
            config: Arc::new(config),
            storage: backends.storage,
            analysis,
            meals,
            pending,
            profiles: backends.profiles,
            catalog: Arc::new(backends.catalog),
            products: Arc::new(ProductDirectory::default()),
        }
    }

    /// In-memory state around the given provider, for tests.
    pub fn fake_with(provider: Arc<dyn AnalysisProvider>, catalog: FoodCatalog) -> Self {
        Self::from_parts(
            AppConfig::local("test"),
            Backends {
                provider,
                meal_store: Arc::new(MemoryMealStore::new()),
                profiles: Arc::new(MemoryProfileStore::default()),
                storage: Arc::new(MemoryStorage::default()),
                catalog,
            },
        )
    }

    pub fn fake() -> Self {
        Self::fake_with(
            Arc::new(MockAnalysisProvider::new(Duration::ZERO)),
            FoodCatalog::default(),
        )
    }
}
