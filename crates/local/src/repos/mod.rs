//! Repository traits for the local row cache.

pub mod card_states;
pub mod entries;
pub mod review_logs;
pub mod sync_state;

pub use card_states::CardStateRepo;
pub use entries::EntryRepo;
pub use review_logs::ReviewLogRepo;
pub use sync_state::SyncStateRepo;
