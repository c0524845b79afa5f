//! PostgreSQL store integration tests
//!
//! Each test gets a fresh database with the crate migrations applied.
//! Requires `DATABASE_URL`.

#![cfg(feature = "test-db")]

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use storefront_core::checkout::{CheckoutRequest, CheckoutWorkflow};
use storefront_core::constants::payment_status;
use storefront_core::database::{CommerceStore, PgCommerceStore};
use storefront_core::error::CommerceError;
use storefront_core::lifecycle::{AddressBook, OrderLifecycle, ProductGallery};
use storefront_core::models::{
    Address, Cart, CartItem, NewAddress, NewProduct, NewProductImage, NewUser, NewVerifyEmail,
    Product, ProductImage, User, VerifyEmail,
};
use storefront_core::state_machine::OrderStatus;

struct Seeded {
    user: User,
    address: Address,
    teapot: Product,
    cup: Product,
    cart: Cart,
}

async fn seed_user(pool: &PgPool, username: &str) -> sqlx::Result<(User, Address)> {
    let user = User::create(
        pool,
        &NewUser {
            username: username.to_string(),
            full_name: username.to_string(),
            email: format!("{username}@example.com"),
        },
    )
    .await?;
    let address = Address::create(
        pool,
        &NewAddress {
            user_id: user.id,
            recipient: username.to_string(),
            line: "1 Main Street".to_string(),
            city: "Springfield".to_string(),
            phone: "555-0100".to_string(),
        },
        true,
    )
    .await?;
    Ok((user, address))
}

async fn seed_product(pool: &PgPool, name: &str, cents: i64, stock: i32) -> sqlx::Result<Product> {
    Product::create(
        pool,
        &NewProduct {
            name: name.to_string(),
            price: Decimal::new(cents, 2),
            stock,
        },
    )
    .await
}

/// 2 x Teapot (10.00) and 1 x Cup (5.00) in a fresh cart
async fn seed(pool: &PgPool) -> sqlx::Result<Seeded> {
    let (user, address) = seed_user(pool, "ada").await?;
    let teapot = seed_product(pool, "Teapot", 1000, 10).await?;
    let cup = seed_product(pool, "Cup", 500, 10).await?;
    let cart = Cart::create(pool, user.id).await?;
    CartItem::upsert(pool, cart.id, teapot.id, 2).await?;
    CartItem::upsert(pool, cart.id, cup.id, 1).await?;
    Ok(Seeded {
        user,
        address,
        teapot,
        cup,
        cart,
    })
}

fn request(seeded: &Seeded) -> CheckoutRequest {
    CheckoutRequest {
        user_id: seeded.user.id,
        cart_id: seeded.cart.id,
        address_id: seeded.address.id,
        payment_method: "cash".to_string(),
        cash_on_delivery: true,
    }
}

async fn stock_of(pool: &PgPool, product_id: i64) -> sqlx::Result<i32> {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(pool)
        .await
}

async fn count(pool: &PgPool, table: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
}

#[sqlx::test(migrations = "./migrations")]
async fn test_checkout_persists_order_aggregate(pool: PgPool) -> sqlx::Result<()> {
    let seeded = seed(&pool).await?;
    let store = Arc::new(PgCommerceStore::new(pool.clone()));

    let receipt = CheckoutWorkflow::new(store.clone())
        .checkout(request(&seeded))
        .await
        .unwrap();

    assert_eq!(receipt.order.total_price, Decimal::new(2500, 2));
    assert_eq!(receipt.payment.amount, Decimal::new(2500, 2));
    assert_eq!(receipt.payment.status, payment_status::NOT_PAID);
    assert_eq!(receipt.items.len(), 2);

    assert_eq!(stock_of(&pool, seeded.teapot.id).await?, 8);
    assert_eq!(stock_of(&pool, seeded.cup.id).await?, 9);
    assert_eq!(count(&pool, "cart_items").await?, 0);

    let lines = store.order_lines(receipt.order.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_insufficient_stock_rolls_back(pool: PgPool) -> sqlx::Result<()> {
    let seeded = seed(&pool).await?;
    sqlx::query("UPDATE products SET stock = 0 WHERE id = $1")
        .bind(seeded.cup.id)
        .execute(&pool)
        .await?;
    let store = Arc::new(PgCommerceStore::new(pool.clone()));

    let result = CheckoutWorkflow::new(store).checkout(request(&seeded)).await;

    assert!(matches!(result, Err(CommerceError::InsufficientStock { .. })));
    assert_eq!(stock_of(&pool, seeded.teapot.id).await?, 10);
    assert_eq!(count(&pool, "orders").await?, 0);
    assert_eq!(count(&pool, "payments").await?, 0);
    assert_eq!(count(&pool, "cart_items").await?, 2);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_checkouts_never_oversell(pool: PgPool) -> sqlx::Result<()> {
    let kettle = seed_product(&pool, "Kettle", 3000, 3).await?;
    let mut requests = Vec::new();
    for i in 0..6 {
        let (user, address) = seed_user(&pool, &format!("shopper{i}")).await?;
        let cart = Cart::create(&pool, user.id).await?;
        CartItem::upsert(&pool, cart.id, kettle.id, 1).await?;
        requests.push(CheckoutRequest {
            user_id: user.id,
            cart_id: cart.id,
            address_id: address.id,
            payment_method: "card".to_string(),
            cash_on_delivery: false,
        });
    }

    let workflow = Arc::new(CheckoutWorkflow::new(Arc::new(PgCommerceStore::new(pool.clone()))));
    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let workflow = workflow.clone();
            tokio::spawn(async move { workflow.checkout(request).await })
        })
        .collect();

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(CommerceError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(stock_of(&pool, kettle.id).await?, 0);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_cancel_restocks_and_rejects_second_cancel(pool: PgPool) -> sqlx::Result<()> {
    let seeded = seed(&pool).await?;
    let store = Arc::new(PgCommerceStore::new(pool.clone()));
    let receipt = CheckoutWorkflow::new(store.clone())
        .checkout(request(&seeded))
        .await
        .unwrap();
    let lifecycle = OrderLifecycle::new(store);

    let cancelled = lifecycle.cancel(receipt.order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled.as_str());
    assert_eq!(stock_of(&pool, seeded.teapot.id).await?, 10);
    assert_eq!(stock_of(&pool, seeded.cup.id).await?, 10);

    let again = lifecycle.cancel(receipt.order.id).await;
    assert!(matches!(again, Err(CommerceError::InvalidTransition { .. })));
    assert_eq!(stock_of(&pool, seeded.teapot.id).await?, 10);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_primary_address_changes(pool: PgPool) -> sqlx::Result<()> {
    let (user, home) = seed_user(&pool, "ada").await?;
    let mut address_ids = vec![home.id];
    for i in 0..3 {
        let address = Address::create(
            &pool,
            &NewAddress {
                user_id: user.id,
                recipient: format!("Alt {i}"),
                line: "2 Side Street".to_string(),
                city: "Springfield".to_string(),
                phone: "555-0101".to_string(),
            },
            false,
        )
        .await?;
        address_ids.push(address.id);
    }

    let book = Arc::new(AddressBook::new(Arc::new(PgCommerceStore::new(pool.clone()))));
    let handles: Vec<_> = address_ids
        .iter()
        .cycle()
        .take(12)
        .map(|&address_id| {
            let book = book.clone();
            let user_id = user.id;
            tokio::spawn(async move { book.set_primary(user_id, address_id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let primaries: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM addresses WHERE user_id = $1 AND is_primary AND NOT is_deleted",
    )
    .bind(user.id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(primaries, 1);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_primary_image_exchange(pool: PgPool) -> sqlx::Result<()> {
    let teapot = seed_product(&pool, "Teapot", 1000, 1).await?;
    let front = ProductImage::create(
        &pool,
        &NewProductImage {
            product_id: teapot.id,
            url: "front.png".to_string(),
            is_primary: true,
        },
    )
    .await?;
    let side = ProductImage::create(
        &pool,
        &NewProductImage {
            product_id: teapot.id,
            url: "side.png".to_string(),
            is_primary: false,
        },
    )
    .await?;
    let gallery = ProductGallery::new(Arc::new(PgCommerceStore::new(pool.clone())));

    gallery.set_primary_image(teapot.id, side.id).await.unwrap();

    let images = gallery.images(teapot.id).await.unwrap();
    let primaries: Vec<_> = images.iter().filter(|i| i.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, side.id);
    assert!(images.iter().any(|i| i.id == front.id && !i.is_primary));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_new_verify_code_retires_earlier_codes(pool: PgPool) -> sqlx::Result<()> {
    let (user, _) = seed_user(&pool, "grace").await?;
    let code = |secret: &str| NewVerifyEmail {
        user_id: user.id,
        email: user.email.clone(),
        secret_code: secret.to_string(),
        expired_at: chrono::Utc::now() + chrono::Duration::minutes(15),
    };

    let first = VerifyEmail::create(&pool, &code("first")).await?;
    let second = VerifyEmail::create(&pool, &code("second")).await?;

    let live = VerifyEmail::find_live_for_user(&pool, user.id).await?;
    assert_eq!(live.map(|v| v.id), Some(second.id));
    let first_used: bool = sqlx::query_scalar("SELECT is_used FROM verify_emails WHERE id = $1")
        .bind(first.id)
        .fetch_one(&pool)
        .await?;
    assert!(first_used);

    let store = PgCommerceStore::new(pool.clone());
    let found = store.find_live_verify_email(user.id).await.unwrap();
    assert_eq!(found.map(|v| v.secret_code), Some("second".to_string()));
    Ok(())
}
