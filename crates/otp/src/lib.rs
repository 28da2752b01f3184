pub mod service;
pub mod store;

pub use service::{OtpError, OtpService, OtpSettings, VerifyOutcome, VerifyRejection};
pub use store::OtpStore;
