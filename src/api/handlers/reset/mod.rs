//! Password-reset flow handlers.
//!
//! Three-step wizard: request a code, verify it, set the new password. The
//! final step re-submits the address and code as proof of verification.
//!
//! Every validation-kind rejection (mismatched, expired, or missing code)
//! shares [`GENERIC_REJECTION`] so callers cannot probe which case occurred;
//! only infrastructure failures get their own status.

pub mod complete_reset;
pub mod request_code;
pub mod types;
mod utils;
pub mod verify_code;

pub use complete_reset::complete_reset;
pub use request_code::request_code;
pub use types::{CompleteResetRequest, MessageResponse, RequestCodeRequest, VerifyCodeRequest};
pub use verify_code::verify_code;

pub(crate) const GENERIC_REJECTION: &str = "Invalid or expired code";
