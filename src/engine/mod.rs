pub mod completion;
pub mod dispatcher;
pub mod queries;
pub mod scoring;
pub mod sentiment;
pub mod transitions;
