//! Posts: authored content whose service depends on the users service.
//!
//! The dependency on [`UsersService`] is declared in the descriptor and
//! resolved through the graph, never via an ad-hoc lookup, so
//! initialization order and failure propagation stay uniform with every
//! other service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lattice_core::{Fault, Outcome};
use serde::{Deserialize, Serialize};

use crate::graph::{GraphService, Layer, ServiceDescriptor, ServiceId};
use crate::services::users::UsersService;
use crate::storage::StoreBackend;

const POSTS: &str = "posts";

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub author_id: u64,
    pub title: String,
    pub body: String,
}

/// Caller-supplied input for [`PostsService::create_post`].
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub body: String,
}

impl NewPost {
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Post operations; validates authorship through the users service.
pub struct PostsService {
    users: Arc<UsersService>,
    store: Arc<dyn StoreBackend>,
    id_seq: AtomicU64,
}

impl GraphService for PostsService {
    const ID: ServiceId = ServiceId::new("posts");

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(Self::ID).requires(UsersService::ID)
    }
}

impl PostsService {
    /// Layer providing this service. Requires [`UsersService`] and the
    /// resource handle.
    #[must_use]
    pub fn layer() -> Layer {
        Layer::new::<Self, _, _>(|ctx| async move {
            let users = ctx.resolve::<UsersService>()?;
            let store = ctx.acquire_store().await?;
            Ok(Self {
                users,
                store,
                id_seq: AtomicU64::new(0),
            })
        })
    }

    /// Creates a post. May fail with `Validation`, `NotFound` (author
    /// absent), or `ResourceUnavailable`.
    ///
    /// Validation runs before storage; the author check goes through the
    /// users service, and its `NotFound` propagates unchanged.
    pub async fn create_post(&self, author_id: u64, new_post: NewPost) -> Outcome<Post> {
        if let Err(fault) = validate_new_post(&new_post) {
            return Outcome::Failure(fault);
        }

        if let Outcome::Failure(fault) = self.users.get_user(author_id).await {
            return Outcome::Failure(fault);
        }

        let id = self.id_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let post = Post {
            id,
            author_id,
            title: new_post.title,
            body: new_post.body,
        };
        let value = match serde_json::to_value(&post) {
            Ok(value) => value,
            Err(error) => return Outcome::Failure(Fault::resource_unavailable(&error)),
        };
        if let Err(error) = self.store.store(POSTS, &id.to_string(), value).await {
            return Outcome::Failure(Fault::resource_unavailable(&error));
        }

        Outcome::Success(post)
    }

    /// Looks up a post by id. May fail with `NotFound` or
    /// `ResourceUnavailable`.
    pub async fn get_post(&self, id: u64) -> Outcome<Post> {
        match self.store.load(POSTS, &id.to_string()).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(post) => Outcome::Success(post),
                Err(error) => Outcome::Failure(Fault::resource_unavailable(&error)),
            },
            Ok(None) => Outcome::Failure(Fault::not_found(format!("post-{id}"))),
            Err(error) => Outcome::Failure(Fault::resource_unavailable(&error)),
        }
    }

    /// Lists every post by the given author, ordered by id. Authors with no
    /// posts get an empty list, not a failure.
    pub async fn list_posts(&self, author_id: u64) -> Outcome<Vec<Post>> {
        let rows = match self.store.load_all(POSTS).await {
            Ok(rows) => rows,
            Err(error) => return Outcome::Failure(Fault::resource_unavailable(&error)),
        };

        let mut posts = Vec::new();
        for (_, value) in rows {
            let post: Post = match serde_json::from_value(value) {
                Ok(post) => post,
                Err(error) => return Outcome::Failure(Fault::resource_unavailable(&error)),
            };
            if post.author_id == author_id {
                posts.push(post);
            }
        }
        posts.sort_unstable_by_key(|post| post.id);
        Outcome::Success(posts)
    }

    /// Deletes a post. Only the author may delete; anyone else gets
    /// `Unauthorized`. May also fail with `NotFound` or
    /// `ResourceUnavailable`.
    pub async fn delete_post(&self, actor_id: u64, post_id: u64) -> Outcome<()> {
        let post = match self.get_post(post_id).await {
            Outcome::Success(post) => post,
            Outcome::Failure(fault) => return Outcome::Failure(fault),
        };

        if post.author_id != actor_id {
            return Outcome::Failure(Fault::unauthorized(
                format!("user-{actor_id}"),
                format!("post-{post_id}"),
            ));
        }

        if let Err(error) = self.store.delete(POSTS, &post_id.to_string()).await {
            return Outcome::Failure(Fault::resource_unavailable(&error));
        }
        Outcome::Success(())
    }
}

fn validate_new_post(new_post: &NewPost) -> Result<(), Fault> {
    if new_post.title.is_empty() {
        return Err(Fault::validation("title must not be empty"));
    }
    if new_post.body.is_empty() {
        return Err(Fault::validation("body must not be empty"));
    }
    Ok(())
}

/// One program constructor per logical request, for the transport layer.
pub mod programs {
    use std::sync::Arc;

    use lattice_core::{Outcome, Program};

    use super::{NewPost, Post, PostsService};
    use crate::graph::ServiceRegistry;
    use crate::runtime::ServiceProgram;

    /// Program that creates a post for the given author.
    #[must_use]
    pub fn create_post(author_id: u64, new_post: NewPost) -> ServiceProgram<Post> {
        Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
            match ctx.resolve::<PostsService>() {
                Ok(posts) => posts.create_post(author_id, new_post).await,
                Err(fault) => Outcome::Failure(fault),
            }
        })
    }

    /// Program that looks up a post by id.
    #[must_use]
    pub fn get_post(id: u64) -> ServiceProgram<Post> {
        Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
            match ctx.resolve::<PostsService>() {
                Ok(posts) => posts.get_post(id).await,
                Err(fault) => Outcome::Failure(fault),
            }
        })
    }

    /// Program that lists an author's posts.
    #[must_use]
    pub fn list_posts(author_id: u64) -> ServiceProgram<Vec<Post>> {
        Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
            match ctx.resolve::<PostsService>() {
                Ok(posts) => posts.list_posts(author_id).await,
                Err(fault) => Outcome::Failure(fault),
            }
        })
    }

    /// Program that deletes a post on behalf of an actor.
    #[must_use]
    pub fn delete_post(actor_id: u64, post_id: u64) -> ServiceProgram<()> {
        Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
            match ctx.resolve::<PostsService>() {
                Ok(posts) => posts.delete_post(actor_id, post_id).await,
                Err(fault) => Outcome::Failure(fault),
            }
        })
    }
}
