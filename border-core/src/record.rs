//! Types for recording values emitted by environments and evaluators.
//!
//! A [`Record`] is a flexible container of key-value pairs. Environments return
//! one from every step, e.g., the diagnostic information of a driving simulator,
//! and [`DefaultEvaluator`](crate::DefaultEvaluator) returns one holding the
//! average episode return.
//!
//! ```rust
//! use border_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("reward", RecordValue::Scalar(-1.0));
//! record.insert("done_dist_done", RecordValue::Bool(false));
//! record.insert("control_repeat", RecordValue::Integer(4));
//! record.insert("expert_action", RecordValue::Array1(vec![0.5, 0.0]));
//!
//! assert_eq!(record.get_scalar("reward").unwrap(), -1.0);
//! assert!(!record.get_bool("done_dist_done").unwrap());
//! ```
mod base;

pub use base::{Record, RecordValue};
