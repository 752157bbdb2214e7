//! Domain services assembled on top of the runtime.
//!
//! Each service declares its identity token and dependencies, exposes a
//! [`Layer`](crate::graph::Layer) constructor for graph assembly, and a
//! `programs` module with one program constructor per logical request,
//! the surface a transport layer composes and hands to
//! [`Runtime::run`](crate::runtime::Runtime::run).

pub mod posts;
pub mod users;

pub use posts::{NewPost, Post, PostsService};
pub use users::{NewUser, User, UsersService};
