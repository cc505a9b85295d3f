//! The `mfa` command: IAM MFA devices.

use async_trait::async_trait;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{local_time, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct MfaCommand;

#[derive(Parser, Debug)]
#[command(name = "mfa", no_binary_name = true, disable_help_flag = true)]
struct MfaArgs {
    /// select all MFA devices (default)
    #[arg(short = 'a')]
    all: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// user name
    #[arg(short = 'u')]
    user: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
}

#[async_trait]
impl Command for MfaCommand {
    fn name(&self) -> &'static str {
        "mfa"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: MfaArgs = parse_argv(argv)?;
        if !args.all && args.user.is_none() {
            return Ok(());
        }

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }

        let iam = session.iam(args.region.as_deref()).await?;
        let mut req = iam.list_mfa_devices();
        if let Some(user) = &args.user {
            req = req.user_name(user);
        }
        let output = req.send().await.map_err(|e| CmdError::service("IAM", e))?;
        let mut out = CommandOutput::new(None)?;
        for device in output.mfa_devices() {
            match disp.verbosity {
                Verbosity::Long => {
                    out.line(format!(
                        "{:<14} {}",
                        device.serial_number(),
                        device.user_name()
                    ));
                }
                Verbosity::Extended => {
                    out.line(device.serial_number());
                    out.line(format!("{:>15} : {:<12}", "User-name", device.user_name()));
                    out.line(format!(
                        "{:>15} : {}",
                        "Enable-date",
                        local_time(Some(device.enable_date()))
                    ));
                }
                Verbosity::Simple => out.line(device.serial_number()),
            }
        }
        Ok(())
    }
}

const HELP: &str = "
        mfa [-u user] [list-options]

Lists the MFA devices of the account (or, with -u, of one user).
";
