mod repo;
mod repo_types;

pub use repo::{InsertOutcome, PgUserStore, UserStore};
#[cfg(test)]
pub use repo::MemoryUserStore;
pub use repo_types::{Role, User};
