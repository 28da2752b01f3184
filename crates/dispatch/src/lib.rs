pub mod audit;
pub mod dispatcher;
pub mod registry;
pub mod vars;

pub use dispatcher::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};
pub use vars::TemplateVars;
