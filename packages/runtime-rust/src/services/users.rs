//! User accounts: creation with unique usernames, lookup by id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lattice_core::{Fault, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::graph::{GraphService, Layer, ServiceId};
use crate::storage::StoreBackend;

const USERS: &str = "users";
const USERNAMES: &str = "usernames";

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
}

/// Caller-supplied input for [`UsersService::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    #[must_use]
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}

/// User operations over the scope's shared storage connection.
///
/// Ids come from an atomic in-memory sequence, so concurrent creations get
/// distinct, strictly increasing ids without coordination.
pub struct UsersService {
    store: Arc<dyn StoreBackend>,
    id_seq: AtomicU64,
}

impl GraphService for UsersService {
    const ID: ServiceId = ServiceId::new("users");
}

impl UsersService {
    /// Layer providing this service. Depends only on the resource handle.
    #[must_use]
    pub fn layer() -> Layer {
        Layer::new::<Self, _, _>(|ctx| async move {
            let store = ctx.acquire_store().await?;
            Ok(Self {
                store,
                id_seq: AtomicU64::new(0),
            })
        })
    }

    /// Creates a user. May fail with `Validation`, `AlreadyExists`, or
    /// `ResourceUnavailable`.
    ///
    /// Validation runs before any storage call; invalid input never reaches
    /// the backing resource. Username uniqueness is enforced by an atomic
    /// reserve in storage, so of two concurrent same-name creations exactly
    /// one succeeds.
    pub async fn create_user(&self, new_user: NewUser) -> Outcome<User> {
        if let Err(fault) = validate_new_user(&new_user) {
            return Outcome::Failure(fault);
        }

        let id = self.id_seq.fetch_add(1, Ordering::AcqRel) + 1;
        match self
            .store
            .insert_unique(USERNAMES, &new_user.username, json!(id))
            .await
        {
            Ok(true) => {}
            Ok(false) => return Outcome::Failure(Fault::already_exists(new_user.username)),
            Err(error) => return Outcome::Failure(Fault::resource_unavailable(&error)),
        }

        let user = User {
            id,
            username: new_user.username,
            email: new_user.email,
        };
        let value = match serde_json::to_value(&user) {
            Ok(value) => value,
            Err(error) => return Outcome::Failure(Fault::resource_unavailable(&error)),
        };
        if let Err(error) = self.store.store(USERS, &id.to_string(), value).await {
            // Hand the name back; otherwise a retry of the same username is
            // refused as a duplicate with no user record behind it.
            if let Err(rollback) = self.store.delete(USERNAMES, &user.username).await {
                warn!(username = %user.username, %rollback, "username reservation rollback failed");
            }
            return Outcome::Failure(Fault::resource_unavailable(&error));
        }

        Outcome::Success(user)
    }

    /// Looks up a user by id. May fail with `NotFound` or
    /// `ResourceUnavailable`.
    pub async fn get_user(&self, id: u64) -> Outcome<User> {
        match self.store.load(USERS, &id.to_string()).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(user) => Outcome::Success(user),
                Err(error) => Outcome::Failure(Fault::resource_unavailable(&error)),
            },
            Ok(None) => Outcome::Failure(Fault::not_found(format!("user-{id}"))),
            Err(error) => Outcome::Failure(Fault::resource_unavailable(&error)),
        }
    }
}

fn validate_new_user(new_user: &NewUser) -> Result<(), Fault> {
    if new_user.username.is_empty() {
        return Err(Fault::validation("username must not be empty"));
    }
    if new_user.username.chars().any(char::is_whitespace) {
        return Err(Fault::validation("username must not contain whitespace"));
    }
    if !new_user.email.contains('@') {
        return Err(Fault::validation("email must contain '@'"));
    }
    Ok(())
}

/// One program constructor per logical request, for the transport layer.
pub mod programs {
    use std::sync::Arc;

    use lattice_core::{Outcome, Program};

    use super::{NewUser, User, UsersService};
    use crate::graph::ServiceRegistry;
    use crate::runtime::ServiceProgram;

    /// Program that creates a user.
    #[must_use]
    pub fn create_user(new_user: NewUser) -> ServiceProgram<User> {
        Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
            match ctx.resolve::<UsersService>() {
                Ok(users) => users.create_user(new_user).await,
                Err(fault) => Outcome::Failure(fault),
            }
        })
    }

    /// Program that looks up a user by id.
    #[must_use]
    pub fn get_user(id: u64) -> ServiceProgram<User> {
        Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
            match ctx.resolve::<UsersService>() {
                Ok(users) => users.get_user(id).await,
                Err(fault) => Outcome::Failure(fault),
            }
        })
    }
}
