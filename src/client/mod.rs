//! Client core: everything a browser session needs to show the directory,
//! keep it current and take part in moderation.

mod completion;
mod directory;
mod error;
mod http;
mod identity;
mod ledger;
mod optimistic;
mod read_model;
mod remote;
mod sync;
mod verification;
mod visitors;

#[cfg(test)]
pub(crate) mod fixtures;

pub use completion::{CompletionCache, FileStore, KeyValueStore, MemoryStore};
pub use directory::ResourceDirectory;
pub use error::ClientError;
pub use http::HttpRemote;
pub use identity::{ClientEnvironment, IdentityProvider, IpLookupIdentity, SessionIdentity};
pub use ledger::{VoteLedger, VoteReceipt};
pub use optimistic::with_rollback;
pub use read_model::{ReadModel, SharedModel, FEATURED_LIMIT, RECENTLY_ADDED_LIMIT};
pub use remote::{ChangeStream, RemoteStore};
pub use sync::{resync, LiveSync, Subscription, VoteCountWatch};
pub use verification::{
    ItemPhase, PendingItem, VerificationController, VerificationOutcome, ALREADY_VOTED_EXIT_DELAY,
    EXIT_DELAY,
};
pub use visitors::VisitorTracker;

use std::sync::Arc;

use crate::config::ClientConfig;

/// A fully wired client session.
pub struct DirectoryClient {
    pub directory: Arc<ResourceDirectory>,
    pub ledger: Arc<VoteLedger>,
    pub verification: VerificationController,
    pub visitors: VisitorTracker,
    pub cache: Arc<CompletionCache>,
}

impl DirectoryClient {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn KeyValueStore>,
        config: &ClientConfig,
    ) -> Self {
        let cache = Arc::new(CompletionCache::load(storage));
        let ledger = Arc::new(VoteLedger::new(
            remote.clone(),
            identity.clone(),
            config.vote_settle_delay,
        ));
        let directory = Arc::new(ResourceDirectory::new(
            remote.clone(),
            ledger.clone(),
            cache.clone(),
        ));
        let verification =
            VerificationController::new(directory.clone(), ledger.clone(), cache.clone());
        let visitors = VisitorTracker::new(remote, identity, cache.clone());

        Self {
            directory,
            ledger,
            verification,
            visitors,
            cache,
        }
    }

    /// HTTP store, IP-lookup identity and file-backed local storage.
    pub fn from_config(config: &ClientConfig, environment: ClientEnvironment) -> Self {
        let remote = Arc::new(HttpRemote::from_config(config));
        let identity = Arc::new(IpLookupIdentity::new(
            config.ip_lookup_url.clone(),
            environment,
        ));
        let storage = Arc::new(FileStore::open(&config.storage_path));
        Self::new(remote, identity, storage, config)
    }
}
