//! Protocol-agnostic payment types shared by the risk evaluator, the AP2
//! verifier, and the facilitator proxy.

pub mod context;
pub mod requirements;

pub use context::PaymentContext;
pub use requirements::PaymentRequirements;
