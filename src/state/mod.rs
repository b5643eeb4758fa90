//! Live relay state: users, their connections and channel membership.
//!
//! - [`ChannelTable`]: channel name to local subscribers
//! - [`User`]: one user's connections and subscriptions behind its own lock
//! - [`UserRegistry`]: creation, lookup and atomic removal of users

mod channel_table;
mod dashmap_ext;
mod registry;
mod user;

pub use channel_table::ChannelTable;
pub use registry::UserRegistry;
pub use user::{Connection, ConnectionId, User, UserConsumers, UserState};
