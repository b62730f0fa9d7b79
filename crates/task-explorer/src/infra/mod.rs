pub mod config;
pub mod engine;
pub mod msbuild;
pub mod output;
pub mod solution;
pub mod toolset;
pub mod workspace;
