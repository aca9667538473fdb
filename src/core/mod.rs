/// Engine internals: the story graph, history tracking, template
/// rendering, text generation, configuration, orchestration and
/// persistence.

pub mod config;
pub mod engine;
pub mod generator;
pub mod graph;
pub mod history;
pub mod persist;
pub mod template;
