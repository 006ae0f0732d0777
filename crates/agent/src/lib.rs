//! The exchange loop, the heart of chatloom.
//!
//! One exchange follows a bounded **Stream → Finalize → Act** cycle:
//!
//! 1. **Stream** the working sequence to the provider, accumulating answer,
//!    reasoning and tool-call fragments as they arrive
//! 2. **Finalize** the fragment table into an ordered call list
//! 3. **If tool calls**: run them sequentially, append the traffic, go to 1
//! 4. **Otherwise**: the accumulated answer is final
//!
//! The loop also stops when the round bound is reached, whatever the model
//! keeps asking for.

pub mod accumulator;
pub mod exchange;
pub mod stream_event;
pub mod tool_stage;

#[cfg(test)]
mod test_helpers;

pub use accumulator::{Applied, DeltaAccumulator, PendingToolCall};
pub use exchange::{ExchangeOutcome, ExchangeRunner};
pub use stream_event::ExchangeEvent;
