//! Central authorization rules.
//!
//! Every route asks [`authorize`] before touching data. The rules only look
//! at the verified identity (`role`, `client_id`, `client_type`, `lga_ids`),
//! so they are tested here without any HTTP or database wiring.

use crate::{
    error::ApiError,
    models::{auth::AuthenticatedUser, client::ClientType, user::UserRole},
};

/// Client types allowed to upload or delete their own trend rows.
const TREND_WRITE_CLIENT_TYPES: &[ClientType] = &[ClientType::Business];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Read operator-owned public trends.
    ReadSharedTrends,
    /// Read a tenant dataset other than the caller's own.
    ReadForeignTrends { client_id: i64 },
    /// Insert or delete rows in the caller's dataset.
    WriteTrends,
    /// List the users of a client.
    ListUsers { client_id: i64 },
    /// Create a user with `role` inside `client_id`.
    CreateUser { client_id: i64, role: UserRole },
    /// Add trend types.
    ManageReferenceData,
    /// List clients, renew subscriptions.
    ManageClients,
    /// Review and finalize onboarding requests.
    ReviewSubscriptions,
}

pub fn is_site_admin(user: &AuthenticatedUser, site_client_id: i64) -> bool {
    user.role == UserRole::Admin && user.client_id == site_client_id
}

/// Decide whether `user` may perform `action`.
pub fn authorize(action: &Action, user: &AuthenticatedUser, site_client_id: i64) -> Result<(), ApiError> {
    if is_site_admin(user, site_client_id) {
        return Ok(());
    }

    match action {
        Action::ReadSharedTrends => Ok(()),
        Action::ReadForeignTrends { client_id } if *client_id == user.client_id => Ok(()),
        Action::ReadForeignTrends { .. } => Err(ApiError::forbidden(
            "Only the site admin can read another client's trends",
        )),
        Action::WriteTrends => {
            if !TREND_WRITE_CLIENT_TYPES.contains(&user.client_type) {
                return Err(ApiError::forbidden(
                    "Trend uploads require a Business client",
                ));
            }
            Ok(())
        }
        Action::ListUsers { client_id } => {
            require_client_admin_of(user, *client_id)
        }
        Action::CreateUser { client_id, role } => {
            require_client_admin_of(user, *client_id)?;
            if *role == UserRole::Admin {
                return Err(ApiError::forbidden(
                    "Only the site admin can create admin users",
                ));
            }
            Ok(())
        }
        Action::ManageReferenceData | Action::ManageClients | Action::ReviewSubscriptions => {
            Err(ApiError::forbidden("Requires the site admin role"))
        }
    }
}

pub fn allowed(action: &Action, user: &AuthenticatedUser, site_client_id: i64) -> bool {
    authorize(action, user, site_client_id).is_ok()
}

fn require_client_admin_of(user: &AuthenticatedUser, client_id: i64) -> Result<(), ApiError> {
    if user.role != UserRole::ClientAdmin {
        return Err(ApiError::forbidden("Requires the client_admin role"));
    }
    if user.client_id != client_id {
        return Err(ApiError::forbidden("Client admins can only manage their own client"));
    }
    Ok(())
}

/// Which regions a caller may see or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionScope {
    All,
    Only(Vec<i64>),
}

impl RegionScope {
    pub fn for_user(user: &AuthenticatedUser, site_client_id: i64) -> Self {
        if is_site_admin(user, site_client_id) {
            RegionScope::All
        } else {
            RegionScope::Only(user.lga_ids.clone())
        }
    }

    pub fn allows(&self, region_id: i64) -> bool {
        match self {
            RegionScope::All => true,
            RegionScope::Only(ids) => ids.contains(&region_id),
        }
    }

    /// Narrow the scope to an explicit request. Asking for a region outside
    /// the scope is refused rather than silently dropped.
    pub fn narrow(self, requested: Option<Vec<i64>>) -> Result<RegionScope, ApiError> {
        let Some(requested) = requested else {
            return Ok(self);
        };
        if let Some(denied) = requested.iter().find(|id| !self.allows(**id)) {
            return Err(ApiError::forbidden(format!("Region {denied} is not licensed to your client")));
        }
        Ok(RegionScope::Only(requested))
    }

    /// Every id in `region_ids` must be allowed.
    pub fn ensure_all(&self, region_ids: impl IntoIterator<Item = i64>) -> Result<(), ApiError> {
        for id in region_ids {
            if !self.allows(id) {
                return Err(ApiError::forbidden(format!("Region {id} is not licensed to your client")));
            }
        }
        Ok(())
    }
}
