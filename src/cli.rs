//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// CodeSmooth command-line tool.
#[derive(Debug, Parser)]
#[command(name = "codesmooth", version, arg_required_else_help = true)]
pub struct Args {
    /// Path to config file (default: ~/.config/codesmooth-cli/codesmooth.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Print the login URL instead of opening a browser.
    #[arg(long = "no-browser", global = true)]
    pub no_browser: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in to CodeSmooth through the browser.
    Login,
    /// Remove saved credentials from this machine.
    Logout,
    /// Show whether a saved session exists.
    Status,
    /// Show the logged-in account reported by the CodeSmooth API.
    Whoami,
}
