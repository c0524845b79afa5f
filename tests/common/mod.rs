//! Shared fixtures for the integration suites
#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;

use rust_decimal::Decimal;
use storefront_core::bootstrap::InMemoryStorefrontContext;
use storefront_core::checkout::{CheckoutRequest, CheckoutWorkflow};
use storefront_core::config::{BackoffConfig, ConfigManager, StorefrontConfig};
use storefront_core::database::InMemoryCommerceStore;
use storefront_core::messaging::InMemoryMessagingService;
use storefront_core::models::{Address, Cart, Product, User};
use storefront_core::notifications::{AskamaRenderer, RecordingMailSender, TemplateRenderer};
use storefront_core::tasks::TaskProcessor;

pub const VERIFY_URL_BASE: &str = "https://shop.example.com/v1/verify_email";

pub fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// A user with a primary address and a cart holding 2 x Teapot (10.00) and 1 x Cup (5.00)
pub struct CheckoutFixture {
    pub store: InMemoryCommerceStore,
    pub user: User,
    pub address: Address,
    pub teapot: Product,
    pub cup: Product,
    pub cart: Cart,
}

impl CheckoutFixture {
    pub async fn new() -> Self {
        Self::with_stock(10, 10).await
    }

    pub async fn with_stock(teapot_stock: i32, cup_stock: i32) -> Self {
        Self::seed(InMemoryCommerceStore::new(), teapot_stock, cup_stock).await
    }

    pub async fn seed(store: InMemoryCommerceStore, teapot_stock: i32, cup_stock: i32) -> Self {
        let user = store.seed_user("ada", "ada@example.com").await;
        let address = store.seed_address(user.id, "Ada Lovelace", true).await;
        let teapot = store.seed_product("Teapot", money(1000), teapot_stock).await;
        let cup = store.seed_product("Cup", money(500), cup_stock).await;
        let cart = store.seed_cart_item(user.id, teapot.id, 2).await.unwrap();
        store.seed_cart_item(user.id, cup.id, 1).await.unwrap();

        Self {
            store,
            user,
            address,
            teapot,
            cup,
            cart,
        }
    }

    pub fn request(&self) -> CheckoutRequest {
        CheckoutRequest {
            user_id: self.user.id,
            cart_id: self.cart.id,
            address_id: self.address.id,
            payment_method: "cash".to_string(),
            cash_on_delivery: true,
        }
    }

    pub fn workflow(&self) -> CheckoutWorkflow<InMemoryCommerceStore> {
        CheckoutWorkflow::new(Arc::new(self.store.clone()))
    }
}

/// Seed a shopper whose cart holds `quantity` of `product_id`
pub async fn shopper(
    store: &InMemoryCommerceStore,
    name: &str,
    product_id: i64,
    quantity: i32,
) -> CheckoutRequest {
    let user = store.seed_user(name, &format!("{name}@example.com")).await;
    let address = store.seed_address(user.id, name, true).await;
    let cart = store.seed_cart_item(user.id, product_id, quantity).await.unwrap();
    CheckoutRequest {
        user_id: user.id,
        cart_id: cart.id,
        address_id: address.id,
        payment_method: "card".to_string(),
        cash_on_delivery: false,
    }
}

/// Configuration for fast, deterministic task processing
pub fn test_config(max_attempts: u32) -> Arc<ConfigManager> {
    let mut config = StorefrontConfig::default();
    config.environment = "test".to_string();
    config.queue.max_attempts = max_attempts;
    config.queue.worker_count = 2;
    config.queue.polling_interval_ms = 10;
    config.mail.verify_url_base = VERIFY_URL_BASE.to_string();
    config.backoff = BackoffConfig {
        base_delay_ms: 0,
        max_delay_ms: 0,
    };
    ConfigManager::from_config(config).unwrap()
}

/// In-memory context with a processor that records outgoing mail
pub struct TaskHarness {
    pub context: InMemoryStorefrontContext,
    pub mailer: Arc<RecordingMailSender>,
    pub processor: Arc<TaskProcessor<InMemoryMessagingService>>,
}

impl TaskHarness {
    pub async fn new(max_attempts: u32) -> Self {
        Self::with_renderer(Arc::new(AskamaRenderer::new()), max_attempts).await
    }

    pub async fn with_renderer(renderer: Arc<dyn TemplateRenderer>, max_attempts: u32) -> Self {
        let context = InMemoryStorefrontContext::in_memory(test_config(max_attempts))
            .await
            .unwrap();
        let mailer = Arc::new(RecordingMailSender::new());
        let processor = context.task_processor(renderer, mailer.clone());
        Self {
            context,
            mailer,
            processor,
        }
    }

    pub fn store(&self) -> &InMemoryCommerceStore {
        self.context.store()
    }

    pub fn messaging(&self) -> &InMemoryMessagingService {
        self.context.messaging()
    }
}
