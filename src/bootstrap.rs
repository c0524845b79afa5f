//! # Storefront Bootstrap
//!
//! Builds the shared resources once at process start and hands them to the
//! components explicitly:
//!
//! 1. Load configuration ([`ConfigManager`])
//! 2. Create the store and queue pools with bounded connection retry
//! 3. Ensure the configured queues exist
//! 4. Wire the distributor, workflows and task processor
//!
//! Teardown runs in the reverse order: stop the processor, shut the distributor
//! down, close the pools. Every step logs its failure and teardown continues.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::checkout::{CartService, CheckoutWorkflow};
use crate::config::ConfigManager;
use crate::database::{
    CommerceStore, DatabasePools, InMemoryCommerceStore, PgCommerceStore,
};
use crate::error::{CommerceError, CommerceResult};
use crate::lifecycle::{AddressBook, OrderLifecycle, ProductGallery};
use crate::messaging::{InMemoryMessagingService, MessagingService, PgmqMessagingService};
use crate::notifications::{AskamaRenderer, HttpMailSender, MailSender, TemplateRenderer};
use crate::tasks::{
    DisabledScheduler, HandlerRegistry, JobScheduler, OrderConfirmationHandler, ProcessorConfig,
    TaskDistributor, TaskProcessor, VerifyEmailHandler,
};

/// Grace period for in-flight tasks during shutdown
pub const PROCESSOR_STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub type PgStorefrontContext = StorefrontContext<PgCommerceStore, PgmqMessagingService>;
pub type InMemoryStorefrontContext = StorefrontContext<InMemoryCommerceStore, InMemoryMessagingService>;

/// Process-wide resources shared by every component
pub struct StorefrontContext<S: CommerceStore, M: MessagingService> {
    config: Arc<ConfigManager>,
    pools: Option<DatabasePools>,
    store: Arc<S>,
    messaging: Arc<M>,
    distributor: Arc<TaskDistributor<M>>,
    scheduler: Arc<dyn JobScheduler>,
}

impl<S: CommerceStore, M: MessagingService> std::fmt::Debug for StorefrontContext<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontContext")
            .field("environment", &self.config.environment())
            .field("store", &self.store.backend_name())
            .field("messaging", &self.messaging.provider_name())
            .field("pools", &self.pools)
            .finish()
    }
}

impl PgStorefrontContext {
    /// Load configuration from the default locations and connect
    pub async fn bootstrap() -> CommerceResult<Self> {
        let config = ConfigManager::load()?;
        Self::connect(config).await
    }

    pub async fn connect(config: Arc<ConfigManager>) -> CommerceResult<Self> {
        info!(environment = %config.environment(), "Bootstrapping storefront");

        let pools = DatabasePools::from_config(config.config()).await?;
        let store = Arc::new(PgCommerceStore::new(pools.store().clone()));
        let messaging = Arc::new(PgmqMessagingService::new(pools.queue().clone()));

        Self::assemble(config, Some(pools), store, messaging).await
    }
}

impl InMemoryStorefrontContext {
    /// Fully wired context without external services
    pub async fn in_memory(config: Arc<ConfigManager>) -> CommerceResult<Self> {
        Self::assemble(
            config,
            None,
            Arc::new(InMemoryCommerceStore::new()),
            Arc::new(InMemoryMessagingService::new()),
        )
        .await
    }
}

impl<S: CommerceStore, M: MessagingService> StorefrontContext<S, M> {
    pub async fn assemble(
        config: Arc<ConfigManager>,
        pools: Option<DatabasePools>,
        store: Arc<S>,
        messaging: Arc<M>,
    ) -> CommerceResult<Self> {
        let queues = &config.config().queue.queues;
        messaging.ensure_queues(queues).await?;
        info!(provider = messaging.provider_name(), queues = ?queues, "Queues ready");

        let distributor = Arc::new(TaskDistributor::new(
            messaging.clone(),
            &config.config().queue,
        ));

        Ok(Self {
            config,
            pools,
            store,
            messaging,
            distributor,
            scheduler: Arc::new(DisabledScheduler),
        })
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn messaging(&self) -> &Arc<M> {
        &self.messaging
    }

    pub fn distributor(&self) -> &Arc<TaskDistributor<M>> {
        &self.distributor
    }

    pub fn scheduler(&self) -> &Arc<dyn JobScheduler> {
        &self.scheduler
    }

    /// Checkout that publishes an order-confirmation task after each commit
    pub fn checkout_workflow(&self) -> CheckoutWorkflow<S> {
        CheckoutWorkflow::new(self.store.clone()).with_publisher(self.distributor.clone())
    }

    pub fn cart_service(&self) -> CartService<S> {
        CartService::new(self.store.clone())
    }

    pub fn order_lifecycle(&self) -> OrderLifecycle<S> {
        OrderLifecycle::new(self.store.clone())
    }

    pub fn address_book(&self) -> AddressBook<S> {
        AddressBook::new(self.store.clone())
    }

    pub fn product_gallery(&self) -> ProductGallery<S> {
        ProductGallery::new(self.store.clone())
    }

    /// Task processor with the built-in handlers registered
    pub fn task_processor(
        &self,
        renderer: Arc<dyn TemplateRenderer>,
        mailer: Arc<dyn MailSender>,
    ) -> Arc<TaskProcessor<M>> {
        let settings = self.config.config();
        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::new(VerifyEmailHandler::new(
                self.store.clone(),
                renderer.clone(),
                mailer.clone(),
                settings.mail.verify_url_base.clone(),
            )))
            .register(Arc::new(OrderConfirmationHandler::new(
                self.store.clone(),
                renderer,
                mailer,
            )));

        Arc::new(TaskProcessor::new(
            self.messaging.clone(),
            registry,
            ProcessorConfig::from_config(&settings.queue, &settings.backoff),
        ))
    }

    /// Task processor rendering askama templates and delivering through the configured relay
    pub fn default_task_processor(&self) -> CommerceResult<Arc<TaskProcessor<M>>> {
        let mailer = HttpMailSender::new(self.config.config().mail.clone())
            .map_err(|e| CommerceError::Configuration(e.to_string()))?;
        Ok(self.task_processor(Arc::new(AskamaRenderer::new()), Arc::new(mailer)))
    }

    /// Ordered teardown: processor, scheduler, distributor, pools
    pub async fn shutdown(&self, processor: Option<&TaskProcessor<M>>) {
        info!("Storefront shutting down");

        if let Some(processor) = processor {
            processor.stop(PROCESSOR_STOP_TIMEOUT).await;
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Scheduler shutdown failed");
        }

        if let Err(e) = self.distributor.shutdown().await {
            warn!(error = %e, "Task distributor shutdown failed");
        }

        self.store.close().await;
        if let Some(pools) = &self.pools {
            pools.close().await;
        }

        info!("Storefront shutdown complete");
    }
}
