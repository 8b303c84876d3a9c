//! Record forwarding
//!
//! Turns one framed GELF record into one reliable-enough HTTP delivery:
//! a single POST with a JSON body, retried with linear backoff on network
//! failures only. A response - any response - is final:
//!
//! - status 200/201/202 is [`ForwardOutcome::Delivered`]
//! - any other status is [`ForwardOutcome::Rejected`] and is **not**
//!   retried ("reached and declined" is distinct from "could not reach")
//! - exhausting all attempts without a response is
//!   [`ForwardOutcome::Unreachable`]

mod forwarder;

pub use forwarder::{ForwardError, ForwardOutcome, Forwarder, ForwarderConfig};
