pub mod cache_entry;
pub mod credential;
pub mod rule;

pub use cache_entry::CacheEntry;
pub use credential::{Credential, CredentialSource};
pub use rule::DomainRule;
