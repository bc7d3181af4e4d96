//! CLI domain: parse, route and output only.
//! No orchestration logic; a single route table dispatches to library services.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{CheckpointCommands, Cli, Commands};
pub use route::RunContext;
