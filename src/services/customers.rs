use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::{address, user, wishlist_item};
use crate::errors::ServiceError;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, max = 120))]
    pub recipient: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2))]
    pub country_code: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct AddWishlistItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub image_url: Option<String>,
}

#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn get_profile(&self, caller: &AuthUser) -> Result<ProfileResponse, ServiceError> {
        let account = user::Entity::find_by_id(caller.user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("account not found".into()))?;

        Ok(ProfileResponse {
            id: account.id,
            email: account.email,
            name: account.name,
            created_at: account.created_at,
        })
    }

    #[instrument(skip(self, caller, request), fields(user_id = %caller.user_id))]
    pub async fn update_profile(
        &self,
        caller: &AuthUser,
        request: UpdateProfileRequest,
    ) -> Result<ProfileResponse, ServiceError> {
        request.validate()?;

        let account = user::Entity::find_by_id(caller.user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("account not found".into()))?;

        let mut active: user::ActiveModel = account.into();
        active.name = Set(request.name);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        Ok(ProfileResponse {
            id: updated.id,
            email: updated.email,
            name: updated.name,
            created_at: updated.created_at,
        })
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn list_addresses(
        &self,
        caller: &AuthUser,
    ) -> Result<Vec<address::Model>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(caller.user_id))
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, caller, request), fields(user_id = %caller.user_id))]
    pub async fn create_address(
        &self,
        caller: &AuthUser,
        request: CreateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        request.validate()?;
        let now = Utc::now();

        let model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(caller.user_id),
            recipient: Set(request.recipient),
            line1: Set(request.line1),
            line2: Set(request.line2),
            city: Set(request.city),
            postal_code: Set(request.postal_code),
            country_code: Set(request.country_code.to_ascii_uppercase()),
            is_default: Set(request.is_default),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(&*self.db).await?)
    }

    /// Delete requires an ownership match; someone else's address id reads
    /// as absent.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn delete_address(
        &self,
        caller: &AuthUser,
        address_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = address::Entity::delete_many()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::UserId.eq(caller.user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("address not found".into()));
        }
        Ok(())
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn list_wishlist(
        &self,
        caller: &AuthUser,
    ) -> Result<Vec<wishlist_item::Model>, ServiceError> {
        Ok(wishlist_item::Entity::find()
            .filter(wishlist_item::Column::UserId.eq(caller.user_id))
            .order_by_desc(wishlist_item::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, caller, request), fields(user_id = %caller.user_id))]
    pub async fn add_wishlist_item(
        &self,
        caller: &AuthUser,
        request: AddWishlistItemRequest,
    ) -> Result<wishlist_item::Model, ServiceError> {
        request.validate()?;

        let existing = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::UserId.eq(caller.user_id))
            .filter(wishlist_item::Column::ProductId.eq(request.product_id.clone()))
            .one(&*self.db)
            .await?;
        if let Some(existing) = existing {
            // Saving the same product twice is a no-op.
            return Ok(existing);
        }

        let model = wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(caller.user_id),
            product_id: Set(request.product_id),
            title: Set(request.title),
            image_url: Set(request.image_url),
            created_at: Set(Utc::now()),
        };

        Ok(model.insert(&*self.db).await?)
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn remove_wishlist_item(
        &self,
        caller: &AuthUser,
        item_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = wishlist_item::Entity::delete_many()
            .filter(wishlist_item::Column::Id.eq(item_id))
            .filter(wishlist_item::Column::UserId.eq(caller.user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("wishlist item not found".into()));
        }
        Ok(())
    }
}
