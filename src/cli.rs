//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to the registry.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{exit_code, map_error};
pub use parse::{Cli, Commands, IdentityArgs};
pub use presentation::{
    format_change_event, format_liveness, format_outcome, format_record, format_record_list,
    OutputFormat,
};
pub use route::RunContext;
