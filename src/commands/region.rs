//! The `region` command: show, list, or change the default region.

use async_trait::async_trait;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::error::CmdError;
use crate::session::Session;

pub struct RegionCommand;

#[derive(Parser, Debug)]
#[command(name = "region", no_binary_name = true, disable_help_flag = true)]
struct RegionArgs {
    /// list all regions
    #[arg(short = 'a')]
    all: bool,
    /// change the default region
    #[arg(short = 'S')]
    set_region: Option<String>,
    args: Vec<String>,
}

#[async_trait]
impl Command for RegionCommand {
    fn name(&self) -> &'static str {
        "region"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: RegionArgs = parse_argv(argv)?;
        if !args.args.is_empty() {
            return Err(CmdError::input("No arguments expected"));
        }
        if let Some(new_region) = &args.set_region {
            session.set_region(new_region);
        } else if args.all {
            for name in session.region_names().await {
                println!("{name}");
            }
        } else {
            println!("{}", session.region());
        }
        Ok(())
    }
}

const HELP: &str = "
        region [-a] [-S new_region]

Options:
    -a             : list all regions
    -S new_region  : change the default region to new_region
";
