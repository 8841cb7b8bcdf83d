//! Remote listing of the photo folder.
//!
//! - `PhotoSource` - the seam the synchronization engine fetches through
//! - `DriveClient` - paginated listing against the storage provider's HTTP API

pub mod drive_client;
pub mod source;

pub use drive_client::*;
pub use source::*;
