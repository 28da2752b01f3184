pub mod adapter;
pub mod email;
pub mod meta;
pub mod retry;
pub mod template;

pub use adapter::{Delivery, MessageBody, MessageSender, SendError, SendErrorKind, SendRequest};
