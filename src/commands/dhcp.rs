//! The `dhcp` command: DHCP option sets.

use async_trait::async_trait;
use aws_sdk_ec2::types::DhcpOptions;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct DhcpCommand;

#[derive(Parser, Debug)]
#[command(name = "dhcp", no_binary_name = true, disable_help_flag = true)]
struct DhcpArgs {
    /// select all DHCP option sets
    #[arg(short = 'a')]
    all: bool,
    /// delete the specified DHCP options
    #[arg(short = 'D')]
    delete: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// associate a DHCP option set with a VPC
    #[arg(short = 'S')]
    associate: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for DhcpCommand {
    fn name(&self) -> &'static str {
        "dhcp"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: DhcpArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }
        disp.show_tags = args.tags;

        let region = args.region.as_deref();

        if args.delete {
            delete_dhcp(session, region, &args.args).await
        } else if args.associate {
            associate_dhcp(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_dhcp(session, region, &selector, &disp).await
        }
    }
}

async fn list_dhcp(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_dhcp_options();
    if let Some(ids) = selector.ids() {
        req = req.set_dhcp_options_ids(Some(ids));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let option_sets = output.dhcp_options();
    session.cache_insert(option_sets.iter().filter_map(|d| d.dhcp_options_id()));
    let mut out = CommandOutput::new(None)?;
    for options in option_sets {
        display_dhcp(options, disp, &mut out);
    }
    Ok(())
}

fn display_dhcp(options: &DhcpOptions, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = options.dhcp_options_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => out.line(format!("{id:<20}")),
        Verbosity::Extended => {
            out.line(id);
            for config in options.dhcp_configurations() {
                let values: Vec<&str> = config
                    .values()
                    .iter()
                    .filter_map(|v| v.value())
                    .collect();
                out.line(format!(
                    "{:>25} : {}",
                    config.key().unwrap_or("-"),
                    values.join(", ")
                ));
            }
            if disp.show_tags {
                display_tags(out, options.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, options.tags());
            }
        }
    }
}

async fn delete_dhcp(
    session: &mut Session,
    region: Option<&str>,
    dhcp_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for dhcp_id in dhcp_ids {
        ec2.delete_dhcp_options()
            .dhcp_options_id(dhcp_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([dhcp_id.as_str()]);
    }
    Ok(())
}

async fn associate_dhcp(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let mut dhcp_id = None;
    let mut vpc_id = None;
    for arg in args {
        if arg == "default" || arg.starts_with("dopt-") {
            dhcp_id = Some(arg.clone());
        } else if arg.starts_with("vpc-") {
            vpc_id = Some(arg.clone());
        } else {
            return Err(CmdError::input(format!("Unexpected argument: {arg}")));
        }
    }
    let vpc_id = vpc_id.ok_or_else(|| CmdError::input("No VPC ID specified"))?;
    let dhcp_id = dhcp_id.ok_or_else(|| CmdError::input("No DHCP OPT ID specified"))?;
    let ec2 = session.ec2(region).await?;
    ec2.associate_dhcp_options()
        .dhcp_options_id(dhcp_id)
        .vpc_id(vpc_id)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

const HELP: &str = "
        dhcp [std-options] [list-options] [-D] [-S]

Options:
    -S dhcp-opt-id vpc-id       : associate dhcp-opt-id with vpc-id; use
                                  'default' to set the DHCP options of the
                                  specified VPC to the default dhcp options
    -D dhcp-opt-id              : delete the specified DHCP options
";
