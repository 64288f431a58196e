//! Wiring of the bonus engine components over a storage backend.

use bonus_engine::{
    BonusOrchestrator, CashbackTierEngine, Clock, ExpirySweeper, MemoryWallet, RetryPolicy,
    SweeperConfig, TemplateCatalog, WalletService,
    db::{BonusRepository, CashbackLevelRepository, MemoryStore, PgStore, TemplateRepository},
    wallet::PgWallet,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Storage, wallet and time sources the engine runs on
#[derive(Clone)]
pub struct Backends {
    pub templates: Arc<dyn TemplateRepository>,
    pub bonuses: Arc<dyn BonusRepository>,
    pub levels: Arc<dyn CashbackLevelRepository>,
    pub wallet: Arc<dyn WalletService>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Process-local store with the given wallet
    pub fn in_memory(wallet: Arc<dyn WalletService>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            templates: store.clone(),
            bonuses: store.clone(),
            levels: store,
            wallet,
            clock,
        }
    }

    /// Process-local store and wallet
    pub fn sandbox(clock: Arc<dyn Clock>) -> Self {
        Self::in_memory(Arc::new(MemoryWallet::new()), clock)
    }

    /// PostgreSQL store and wallet sharing one pool
    pub fn postgres(pool: Arc<PgPool>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            templates: store.clone(),
            bonuses: store.clone(),
            levels: store,
            wallet: Arc::new(PgWallet::new(pool)),
            clock,
        }
    }
}

/// Engine components shared by the HTTP handlers and background tasks
#[derive(Clone)]
pub struct Engine {
    pub catalog: Arc<TemplateCatalog>,
    pub cashback: Arc<CashbackTierEngine>,
    pub orchestrator: Arc<BonusOrchestrator>,
    pub sweeper: Arc<ExpirySweeper>,
}

impl Engine {
    pub fn assemble(backends: Backends, retry: RetryPolicy, sweeper: SweeperConfig) -> Self {
        let catalog = Arc::new(TemplateCatalog::new(
            backends.templates.clone(),
            backends.bonuses.clone(),
            backends.clock.clone(),
        ));
        let cashback = Arc::new(CashbackTierEngine::new(
            backends.levels.clone(),
            backends.bonuses.clone(),
            backends.clock.clone(),
        ));
        let orchestrator = Arc::new(
            BonusOrchestrator::new(
                backends.templates,
                backends.bonuses,
                cashback.clone(),
                backends.wallet,
                backends.clock,
                retry,
            )
            .with_template_locks(catalog.template_locks()),
        );
        let sweeper = Arc::new(ExpirySweeper::new(orchestrator.clone(), sweeper));

        Self {
            catalog,
            cashback,
            orchestrator,
            sweeper,
        }
    }
}
