pub mod archive;
pub mod handler;
pub mod watcher;

pub use archive::{ArchiveEnvironment, ArchiveFile, SdkData};
pub use handler::FileDataHandler;
pub use watcher::ArchiveWatcher;
