//! Replay buffer with independent subscriber cursors.
//!
//! A [`Topic`] is an append-only sequence of items that any number of
//! [`Subscription`]s read at their own pace. Unlike
//! [`tokio::sync::broadcast`], nothing is ever dropped for a slow reader:
//! the buffer keeps the full history so a new subscriber can replay it, and
//! the only way an item disappears is an explicit [`Topic::delete_where`].
//!
//! # Delivery guarantees
//!
//! - A subscription observes every item published after its cursor, in
//!   publish order, exactly once, until it is closed.
//! - An item deleted before a subscription reached it is never observed by
//!   that subscription. Subscriptions that already passed it are unaffected.
//! - Closing a subscription (directly, through a [`Closer`], or by dropping
//!   it) wakes any pending read on it, which then returns `None`.
//!
//! Synchronization is internal: publishers and subscribers need no external
//! locking. Reads suspend on [`tokio::sync::Notify`], which works on any
//! executor.

mod subscription;
mod topic;

pub use subscription::{Closed, Closer, Subscription};
pub use topic::{Sequence, StartAt, Topic};
