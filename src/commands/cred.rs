//! The `cred` command: show or swap the active AWS credentials.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;

use crate::aws::AwsCredentials;
use crate::commands::{parse_argv, Command};
use crate::error::CmdError;
use crate::session::Session;

pub struct CredCommand;

#[derive(Parser, Debug)]
#[command(name = "cred", no_binary_name = true, disable_help_flag = true)]
struct CredArgs {
    /// read credentials from the specified file
    #[arg(short = 'F')]
    file: Option<PathBuf>,
    /// list the current credentials
    #[arg(short = 'l')]
    list: bool,
    /// name to identify the credentials
    #[arg(short = 'N')]
    name: Option<String>,
    args: Vec<String>,
}

#[async_trait]
impl Command for CredCommand {
    fn name(&self) -> &'static str {
        "cred"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: CredArgs = parse_argv(argv)?;
        if !args.args.is_empty() {
            return Err(CmdError::input("No args expected"));
        }

        if let Some(path) = &args.file {
            // Swapping credentials drops all cached connections and ids.
            let mut creds = AwsCredentials::from_file(path)
                .map_err(|e| CmdError::Input(e.to_string()))?;
            creds.name = args.name.clone();
            session.set_credentials(creds);
            tracing::info!("credentials loaded from {}", path.display());
        } else if args.name.is_some() {
            session.set_credentials_name(args.name.clone());
        } else {
            list_credentials(session);
        }
        Ok(())
    }
}

fn list_credentials(session: &Session) {
    let creds = session.credentials();
    println!("{:<10} : {}", "Key ID", creds.key_id);
    println!("{:<10} : {}", "Key Value", creds.secret);
    if let Some(name) = &creds.name {
        println!("{:<10} : {}", "Name", name);
    }
    if let Some(file) = &creds.source_file {
        println!("{:<10} : {}", "File", file.display());
    }
}

const HELP: &str = "
        cred [-l] [-F aws_credential_file] [-N name]

Options:
    -l          : list the current credentials
    -F file     : read credentials from the specified file (will be reported
                  by the -l option)
    -N name     : use the specified name to identify the credentials (will
                  be reported by the -l option)
";
