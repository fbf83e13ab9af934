pub mod endpoints;
pub mod parse;
pub mod request;
pub mod runtime;
pub mod sse;
pub mod submission;
