//! Ethical policy engine — named validators gating every operation.
//!
//! Each policy is a pure function from an operation's parameter set to a
//! compliance verdict. The engine holds a registry of named validators plus
//! a flag marking which names are compulsory: every agreement must reference
//! the compulsory set to be creatable at all.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌──────────────┐
//! │  Governance   │───▶│  Policy       │───▶│  Task        │
//! │  pipeline     │    │  Engine       │    │  Executor    │
//! └──────────────┘    └───────────────┘    └──────────────┘
//!                           │
//!                     ┌─────┴──────┐
//!                     │ Compliance │
//!                     │ pass       │
//!                     │ reject     │
//!                     └────────────┘
//! ```
//!
//! Evaluation fails closed: an unknown policy name is non-compliant, never
//! an automatic pass. Validators take no I/O and hold no state, so
//! evaluation is synchronous, deterministic, and bounded in time.

mod engine;
mod validators;

pub use engine::{Compliance, FnValidator, PolicyEngine, PolicyValidator};
pub use validators::{
    CONTENT_SAFETY, ContentSafetyValidator, FAIR_USE, FairUseValidator, QUANTITY_PARAM,
};
