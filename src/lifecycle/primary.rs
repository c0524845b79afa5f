//! # Primary Flags
//!
//! Exactly one active address per user and one image per product carry the
//! primary flag. Every change is an unset-all/set-one exchange inside one
//! transaction with the parent row (user or product) locked, so concurrent
//! exchanges for the same parent run one after another.

use std::sync::Arc;

use tracing::info;

use crate::database::{CommerceStore, CommerceTx, TransactionExecutor};
use crate::error::{CommerceError, CommerceResult};
use crate::models::{Address, NewAddress, ProductImage};

#[derive(Debug)]
pub struct AddressBook<S: CommerceStore> {
    executor: TransactionExecutor<S>,
}

async fn lock_user<T: CommerceTx>(tx: &mut T, user_id: i64) -> CommerceResult<()> {
    if tx.lock_user(user_id).await? {
        Ok(())
    } else {
        Err(CommerceError::not_found("user", user_id))
    }
}

/// The user's active address, or `NotFound`
async fn owned_address<T: CommerceTx>(
    tx: &mut T,
    user_id: i64,
    address_id: i64,
) -> CommerceResult<Address> {
    match tx.find_address(address_id).await? {
        Some(address) if address.user_id == user_id && !address.is_deleted => Ok(address),
        _ => Err(CommerceError::not_found("address", address_id)),
    }
}

impl<S: CommerceStore> AddressBook<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            executor: TransactionExecutor::new(store),
        }
    }

    /// Add an address; the user's first active address becomes primary
    pub async fn create(&self, address: NewAddress) -> CommerceResult<Address> {
        self.executor
            .execute(move |tx| {
                Box::pin(async move {
                    lock_user(tx, address.user_id).await?;
                    let first = tx.active_addresses(address.user_id).await?.is_empty();
                    tx.insert_address(&address, first).await
                })
            })
            .await
    }

    pub async fn set_primary(&self, user_id: i64, address_id: i64) -> CommerceResult<Address> {
        let address = self
            .executor
            .execute_logged("set_primary_address", move |tx| {
                Box::pin(async move {
                    lock_user(tx, user_id).await?;
                    let mut address = owned_address(tx, user_id, address_id).await?;

                    tx.clear_primary_addresses(user_id).await?;
                    if !tx.mark_address_primary(address_id).await? {
                        return Err(CommerceError::not_found("address", address_id));
                    }
                    address.is_primary = true;
                    Ok(address)
                })
            })
            .await?;

        info!(user_id = user_id, address_id = address_id, "Primary address set");
        Ok(address)
    }

    /// Soft-delete an address, promoting the newest remaining one if it was primary
    ///
    /// Returns the promoted address, if any.
    pub async fn soft_delete(&self, user_id: i64, address_id: i64) -> CommerceResult<Option<Address>> {
        self.executor
            .execute_logged("soft_delete_address", move |tx| {
                Box::pin(async move {
                    lock_user(tx, user_id).await?;
                    let address = owned_address(tx, user_id, address_id).await?;

                    if !tx.soft_delete_address(address_id).await? {
                        return Err(CommerceError::not_found("address", address_id));
                    }
                    if !address.is_primary {
                        return Ok(None);
                    }

                    // Newest first
                    let Some(mut successor) = tx.active_addresses(user_id).await?.into_iter().next()
                    else {
                        return Ok(None);
                    };
                    tx.clear_primary_addresses(user_id).await?;
                    if !tx.mark_address_primary(successor.id).await? {
                        return Err(CommerceError::not_found("address", successor.id));
                    }
                    successor.is_primary = true;
                    Ok(Some(successor))
                })
            })
            .await
    }

    pub async fn list(&self, user_id: i64) -> CommerceResult<Vec<Address>> {
        self.executor.store().active_addresses(user_id).await
    }
}

#[derive(Debug)]
pub struct ProductGallery<S: CommerceStore> {
    executor: TransactionExecutor<S>,
}

impl<S: CommerceStore> ProductGallery<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            executor: TransactionExecutor::new(store),
        }
    }

    pub async fn set_primary_image(
        &self,
        product_id: i64,
        image_id: i64,
    ) -> CommerceResult<ProductImage> {
        let image = self
            .executor
            .execute_logged("set_primary_image", move |tx| {
                Box::pin(async move {
                    if !tx.lock_product(product_id).await? {
                        return Err(CommerceError::not_found("product", product_id));
                    }
                    let mut image = match tx.find_image(image_id).await? {
                        Some(image) if image.product_id == product_id => image,
                        _ => return Err(CommerceError::not_found("product_image", image_id)),
                    };

                    tx.clear_primary_images(product_id).await?;
                    if !tx.mark_image_primary(image_id).await? {
                        return Err(CommerceError::not_found("product_image", image_id));
                    }
                    image.is_primary = true;
                    Ok(image)
                })
            })
            .await?;

        info!(product_id = product_id, image_id = image_id, "Primary image set");
        Ok(image)
    }

    pub async fn images(&self, product_id: i64) -> CommerceResult<Vec<ProductImage>> {
        self.executor.store().product_images(product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryCommerceStore;

    fn new_address(user_id: i64, recipient: &str) -> NewAddress {
        NewAddress {
            user_id,
            recipient: recipient.to_string(),
            line: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            phone: "555-0100".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_address_is_primary() {
        let store = InMemoryCommerceStore::new();
        let user = store.seed_user("ada", "ada@example.com").await;
        let book = AddressBook::new(Arc::new(store.clone()));

        let home = book.create(new_address(user.id, "Home")).await.unwrap();
        let work = book.create(new_address(user.id, "Work")).await.unwrap();

        assert!(home.is_primary);
        assert!(!work.is_primary);
        assert!(matches!(
            book.create(new_address(999, "Nobody")).await,
            Err(CommerceError::NotFound { entity: "user", .. })
        ));
    }

    #[tokio::test]
    async fn test_deleting_primary_promotes_newest() {
        let store = InMemoryCommerceStore::new();
        let user = store.seed_user("ada", "ada@example.com").await;
        let book = AddressBook::new(Arc::new(store.clone()));

        let home = book.create(new_address(user.id, "Home")).await.unwrap();
        let _work = book.create(new_address(user.id, "Work")).await.unwrap();
        let cabin = book.create(new_address(user.id, "Cabin")).await.unwrap();

        let promoted = book.soft_delete(user.id, home.id).await.unwrap().unwrap();
        assert_eq!(promoted.id, cabin.id);

        let state = store.snapshot().await;
        let primaries = state.primary_addresses(user.id);
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].id, cabin.id);

        assert!(matches!(
            book.set_primary(user.id, home.id).await,
            Err(CommerceError::NotFound { entity: "address", .. })
        ));
    }

    #[tokio::test]
    async fn test_image_must_belong_to_product() {
        let store = InMemoryCommerceStore::new();
        let mug = store.seed_product("Mug", rust_decimal::Decimal::new(800, 2), 1).await;
        let cup = store.seed_product("Cup", rust_decimal::Decimal::new(500, 2), 1).await;
        let cup_image = store.seed_image(cup.id, "cup.png", true).await;
        let gallery = ProductGallery::new(Arc::new(store.clone()));

        assert!(matches!(
            gallery.set_primary_image(mug.id, cup_image.id).await,
            Err(CommerceError::NotFound { entity: "product_image", .. })
        ));
    }
}
