//! Generation dispatch: requests, the generator seam and the dispatcher.

pub mod dispatcher;
pub mod generator;
pub mod request;

pub use dispatcher::{CategoryError, DispatchConfig, DispatchReport, Dispatcher};
pub use generator::{GenerationContext, HttpReportGenerator, ReportGenerator};
pub use request::GenerationRequest;
