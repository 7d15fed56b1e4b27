//! Data-store collaborators for snippets and users.
//!
//! The request pipeline only depends on the [`SnippetStore`] and [`UserStore`]
//! traits. The in-memory implementations here are what the binary runs with;
//! a database-backed store plugs in behind the same traits.
//!
//! ```text
//! handlers ──► SnippetStore ──► MemorySnippetStore
//!          └─► UserStore    ──► MemoryUserStore
//! ```

mod snippets;
mod users;

pub use snippets::{MemorySnippetStore, Snippet, SnippetStore, LATEST_LIMIT};
pub use users::{MemoryUserStore, User, UserStore};
