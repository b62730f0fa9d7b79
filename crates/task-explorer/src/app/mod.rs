//! Application layer: tree building, navigation state, and build orchestration.

pub mod explorer;
pub mod filter;
pub mod navigation;
pub mod orchestrator;
pub mod settings;
pub mod solution;
pub mod tree;
