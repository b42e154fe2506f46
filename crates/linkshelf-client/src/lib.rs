//! Client-side core of Linkshelf: the backend seam, the bookmark store, live
//! inbox and reaction feeds, and the signed-in session.

pub mod config;
pub mod error;
pub mod guest;
pub mod inbox;
pub mod mutation;
pub mod notifier;
pub mod reactions;
pub mod remote;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use guest::GuestStorage;
pub use inbox::InboxFeed;
pub use notifier::{Notifier, TracingNotifier};
pub use reactions::ReactionBoard;
pub use remote::{HttpRemote, Remote};
pub use session::{AuthEvent, Identity, Session, SessionDirective};
pub use store::{BookmarkStore, LocalBookmark, StoreSnapshot};
