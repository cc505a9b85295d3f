//! The `key` command: IAM access keys.

use async_trait::async_trait;
use aws_sdk_iam::types::AccessKeyMetadata;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{local_time, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct KeyCommand;

#[derive(Parser, Debug)]
#[command(name = "key", no_binary_name = true, disable_help_flag = true)]
struct KeyArgs {
    /// select all keys of the user (default)
    #[arg(short = 'a')]
    all: bool,
    /// create an access key for the user
    #[arg(short = 'C')]
    create: bool,
    /// delete the specified access key(s)
    #[arg(short = 'D')]
    delete: bool,
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
    args: Vec<String>,
}

#[async_trait]
impl Command for KeyCommand {
    fn name(&self) -> &'static str {
        "key"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: KeyArgs = parse_argv(argv)?;

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }

        let region = args.region.as_deref();

        if args.create {
            create_key(session, region, args.user.as_deref()).await
        } else if args.delete {
            delete_keys(session, region, args.user.as_deref(), &args.args).await
        } else {
            let Some(user) = args.user.as_deref() else {
                return Ok(());
            };
            list_keys(session, region, user, &disp).await
        }
    }
}

async fn list_keys(
    session: &mut Session,
    region: Option<&str>,
    user: &str,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    let iam = session.iam(region).await?;
    let output = iam
        .list_access_keys()
        .user_name(user)
        .send()
        .await
        .map_err(|e| CmdError::service("IAM", e))?;
    let mut out = CommandOutput::new(None)?;
    for key in output.access_key_metadata() {
        display_key(key, disp, &mut out);
    }
    Ok(())
}

fn display_key(key: &AccessKeyMetadata, disp: &DisplayOptions, out: &mut CommandOutput) {
    let key_id = key.access_key_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Extended => {
            out.line(key_id);
            out.line(format!(
                "{:>15} : {:<12}",
                "User-name",
                optional(key.user_name())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Status",
                key.status().map(|s| s.as_str()).unwrap_or("-")
            ));
            out.line(format!(
                "{:>15} : {}",
                "Create-date",
                local_time(key.create_date())
            ));
        }
        _ => out.line(format!("{key_id:<14}")),
    }
}

async fn create_key(
    session: &mut Session,
    region: Option<&str>,
    user: Option<&str>,
) -> Result<(), CmdError> {
    let Some(user) = user else {
        return Err(CmdError::input("No user specified (use -u)"));
    };
    let iam = session.iam(region).await?;
    let output = iam
        .create_access_key()
        .user_name(user)
        .send()
        .await
        .map_err(|e| CmdError::service("IAM", e))?;
    if let Some(key) = output.access_key() {
        println!("{:<14} : {}", "Key ID", key.access_key_id());
        println!("{:<14} : {}", "Key Value", key.secret_access_key());
    }
    Ok(())
}

async fn delete_keys(
    session: &mut Session,
    region: Option<&str>,
    user: Option<&str>,
    key_ids: &[String],
) -> Result<(), CmdError> {
    if key_ids.is_empty() {
        return Err(CmdError::input("No access key id(s) specified"));
    }
    let iam = session.iam(region).await?;
    for key_id in key_ids {
        let mut req = iam.delete_access_key().access_key_id(key_id);
        if let Some(user) = user {
            req = req.user_name(user);
        }
        req.send().await.map_err(|e| CmdError::service("IAM", e))?;
    }
    Ok(())
}

const HELP: &str = "
        key [-u user] [-C] [-D] [list-options] [key-id] ...

Options:
    -u user     : the IAM user whose access keys to operate on
    -C          : create a new access key for the user (prints the
                  key id and secret)
    -D          : delete the specified access key(s)
";
