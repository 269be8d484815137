//! Repository traits for the metadata store.

pub mod audius_users;
pub mod clock;
pub mod files;
pub mod tracks;
pub mod users;

pub use audius_users::AudiusUserRepo;
pub use clock::{ClockRepo, ExportSlice, IncomingFile, Mutation, SyncCommit};
pub use files::FileRepo;
pub use tracks::TrackRepo;
pub use users::UserRepo;
