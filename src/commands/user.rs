//! The `user` command: IAM users.

use async_trait::async_trait;
use aws_sdk_iam::types::User;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{local_time, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct UserCommand;

#[derive(Parser, Debug)]
#[command(name = "user", no_binary_name = true, disable_help_flag = true)]
struct UserArgs {
    /// select all users
    #[arg(short = 'a')]
    all: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for UserCommand {
    fn name(&self) -> &'static str {
        "user"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: UserArgs = parse_argv(argv)?;
        if !args.all && args.args.is_empty() {
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
        let mut out = CommandOutput::new(None)?;
        if args.all {
            let output = iam
                .list_users()
                .send()
                .await
                .map_err(|e| CmdError::service("IAM", e))?;
            for user in output.users() {
                display_user(user, &disp, &mut out);
            }
        } else {
            for username in &args.args {
                let output = iam
                    .get_user()
                    .user_name(username)
                    .send()
                    .await
                    .map_err(|e| CmdError::service("IAM", e))?;
                if let Some(user) = output.user() {
                    display_user(user, &disp, &mut out);
                }
            }
        }
        Ok(())
    }
}

fn display_user(user: &User, disp: &DisplayOptions, out: &mut CommandOutput) {
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<14} {:<16} {:<20}",
                user.user_name(),
                user.user_id(),
                user.path(),
            ));
        }
        Verbosity::Extended => {
            out.line(user.user_name());
            out.line(format!("{:>15} : {:<12}", "User-id", user.user_id()));
            out.line(format!("{:>15} : {}", "Path", user.path()));
            out.line(format!("{:>15} : {}", "ARN", user.arn()));
            out.line(format!(
                "{:>15} : {}",
                "Create-date",
                local_time(Some(user.create_date()))
            ));
        }
        Verbosity::Simple => out.line(user.user_name()),
    }
}

const HELP: &str = "
        user [-lax] [-r region] [user1] [user2] ...

Lists IAM users: all of them with -a, or the named ones.
";
