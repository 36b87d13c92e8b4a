//! Role template storage.

use crate::broker::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::model::{RoleConfig, RoleRequest, naming};
use crate::store::{keys, leaf_names, store_json};
use tracing::{info, instrument};

impl Broker {
    /// Create or replace a role. Missing TTLs take the system lease limits.
    #[instrument(skip(self, request))]
    pub async fn write_role(&self, name: &str, request: &RoleRequest) -> BrokerResult<RoleConfig> {
        naming::validate_name("role", name)?;

        let default_ttl = request.default_ttl.unwrap_or(self.config.lease.default_ttl);
        let max_ttl = request.max_ttl.unwrap_or(self.config.lease.max_ttl);

        if !max_ttl.is_zero() && default_ttl > max_ttl {
            return Err(BrokerError::validation(
                "default_ttl cannot be greater than max_ttl",
            ));
        }

        let role = RoleConfig {
            default_ttl: default_ttl.as_secs(),
            max_ttl: max_ttl.as_secs(),
            creation_statement: request.creation_statement.clone(),
            revocation_statement: request.revocation_statement.clone(),
        };
        store_json(self.store.as_ref(), &keys::role(name), &role).await?;

        info!(role = name, default_ttl = role.default_ttl, max_ttl = role.max_ttl, "Role written");
        Ok(role)
    }

    /// Read a role.
    #[instrument(skip(self))]
    pub async fn read_role(&self, name: &str) -> BrokerResult<RoleConfig> {
        self.load_role(name)
            .await?
            .ok_or_else(|| role_not_configured(name))
    }

    /// Delete a role. Credentials already issued from it stay revocable.
    #[instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> BrokerResult<()> {
        self.store.delete(&keys::role(name)).await?;
        info!(role = name, "Role deleted");
        Ok(())
    }

    /// Every role name.
    #[instrument(skip(self))]
    pub async fn list_roles(&self) -> BrokerResult<Vec<String>> {
        Ok(leaf_names(self.store.list(keys::ROLE_PREFIX).await?))
    }
}

pub(crate) fn role_not_configured(name: &str) -> BrokerError {
    BrokerError::not_found(format!("Role {name} is not configured"))
}
