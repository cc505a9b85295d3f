//! The `debug` command: toggle full-detail error reporting.

use async_trait::async_trait;

use crate::commands::Command;
use crate::error::CmdError;
use crate::session::Session;

pub struct DebugCommand;

#[async_trait]
impl Command for DebugCommand {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        match argv.as_slice() {
            [] => println!("Debug: {}", if session.debug { "on" } else { "off" }),
            [arg] => match arg.to_lowercase().as_str() {
                "on" => session.debug = true,
                "off" => session.debug = false,
                _ => return Err(CmdError::input("Expecting a single 'on' or 'off' argument")),
            },
            _ => return Err(CmdError::input("Expecting a single 'on' or 'off' argument")),
        }
        Ok(())
    }
}

const HELP: &str = "
        debug [on|off]

With no argument, reports whether debug mode is enabled. In debug mode
failed commands additionally print the full error detail.
";
