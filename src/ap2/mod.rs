//! AP2 evidence verification (C4): policy extraction, evidence decoding, and
//! the ordered congruence/TTL/origin/payment-hash/merchant/signature checks.

pub mod eip712;
pub mod evidence;
pub mod policy;
pub mod verify;

pub use evidence::AP2Evidence;
pub use policy::AP2Policy;
pub use verify::{verify, Ap2Outcome};
