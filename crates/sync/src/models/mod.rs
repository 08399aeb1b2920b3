mod bookmark;
mod progress;
mod snapshot;
mod timestamp;

pub use self::bookmark::BookmarkRecord;
pub use self::progress::ProgressSnapshot;
pub use self::snapshot::StateSnapshot;
pub use self::timestamp::Timestamp;
