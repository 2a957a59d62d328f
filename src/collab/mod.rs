//! Interfaces to systems outside the coordinator, with in-process implementations.

pub mod identify;
pub mod roster;
pub mod wordlist;

use std::path::PathBuf;

use crate::coordinator::HashTypeInfo;
use crate::error::Result;

pub use identify::PatternIdentifier;
pub use roster::{Member, MemberRole, TeamRoster};
pub use wordlist::DirectoryResolver;

/// Number of ranked candidates kept from identification.
pub const MAX_CANDIDATES: usize = 5;

/// Ranks plausible hash types for a fingerprint, best first.
pub trait HashIdentifier: Send + Sync {
    fn identify(&self, hash: &str) -> Vec<HashTypeInfo>;
}

/// Maps a shared wordlist reference to a local file.
pub trait WordlistResolver: Send + Sync {
    fn resolve(&self, wordlist_ref: &str) -> Result<PathBuf>;
}

pub trait PeerAuthorizer: Send + Sync {
    fn is_authorized_peer(&self, team_id: &str, user_id: &str) -> bool;
}

/// Accepts every peer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PeerAuthorizer for AllowAll {
    fn is_authorized_peer(&self, _team_id: &str, _user_id: &str) -> bool {
        true
    }
}
