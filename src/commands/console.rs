//! The `console` command: instance console output.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct ConsoleCommand;

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true, disable_help_flag = true)]
struct ConsoleArgs {
    /// copy output to file
    #[arg(short = 'O')]
    output: Option<PathBuf>,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    args: Vec<String>,
}

#[async_trait]
impl Command for ConsoleCommand {
    fn name(&self) -> &'static str {
        "console"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: ConsoleArgs = parse_argv(argv)?;
        let [instance_id] = args.args.as_slice() else {
            return Err(CmdError::input("Expecting a single instance-id"));
        };

        let ec2 = session.ec2(args.region.as_deref()).await?;
        let output = ec2
            .get_console_output()
            .instance_id(instance_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_insert([instance_id.as_str()]);

        let Some(encoded) = output.output() else {
            println!("No console output");
            return Ok(());
        };
        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| CmdError::input(format!("Undecodable console output: {e}")))?;
        let text = String::from_utf8_lossy(&decoded);

        let mut out = CommandOutput::new(args.output.as_deref())?;
        for line in text.lines() {
            if !line.is_empty() {
                out.line(line.trim_end());
            }
        }
        Ok(())
    }
}

const HELP: &str = "
        console [std-options] instance-id

Retrieve the console output of the specified instance.
";
