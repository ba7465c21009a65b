pub mod app;
pub mod dashboard;
pub mod route;
pub mod stack;
pub mod template;

pub use app::{App, Assembly, StackArtifact, StackId};
pub use stack::{Output, Stack, StackProps, Target};
