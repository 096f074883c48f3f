//! Queue primitives behind the combinators.
//!
//! Both queues apply backpressure by suspending producers while full and
//! support a terminal closed state that releases every waiter. Neither
//! holds its lock across an `.await`.

pub mod closable;
pub mod multi_consumer;

pub use closable::ClosableQueue;
pub use multi_consumer::{Consumer, ConsumerKey, MultiConsumerQueue};
