pub mod completions;
pub mod config;
pub mod prompts;
pub mod run;
pub mod summary;
