//! Consumer - pull, decode, handle, ack or nack
//!
//! ```text
//!  queue ──receive──▶ Delivery ──decode──▶ Event ──▶ Handler
//!                                  │                   │
//!                            MalformedPayload     Ok │ Err / panic
//!                                  │                   │
//!                                  └───────▶ nack ◀────┘──▶ ack
//! ```
//!
//! A nacked message comes back with its delivery count incremented until
//! the queue's retry budget is spent; the broker then moves it to the
//! dead-letter queue. The loop never sees that transition.

mod delivery_loop;
mod dispatcher;
mod error;
mod handler;

pub use delivery_loop::{
    Consumer, ConsumerHandle, ConsumerOptions, ConsumerStats, Disposition, MIN_IDLE_WAIT,
};
pub use dispatcher::Dispatcher;
pub use error::{HandlerError, ProcessingError};
pub use handler::{handler_fn, Context, FnHandler, Handler};
