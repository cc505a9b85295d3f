//! The `vpc` command.

use async_trait::async_trait;
use aws_sdk_ec2::types::Vpc;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct VpcCommand;

#[derive(Parser, Debug)]
#[command(name = "vpc", no_binary_name = true, disable_help_flag = true)]
struct VpcArgs {
    /// select all VPCs
    #[arg(short = 'a')]
    all: bool,
    /// create a new VPC
    #[arg(short = 'C')]
    create: bool,
    /// delete the specified VPC(s)
    #[arg(short = 'D')]
    delete: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// tag filter key[=value] or =value
    #[arg(short = 'q')]
    tag_filters: Vec<String>,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for VpcCommand {
    fn name(&self) -> &'static str {
        "vpc"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: VpcArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
        }

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }
        disp.show_tags = args.tags;

        let region = args.region.as_deref();

        if args.create {
            create_vpc(session, region, &args.args).await
        } else if args.delete {
            delete_vpcs(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_vpcs(session, region, &selector, &disp).await
        }
    }
}

async fn list_vpcs(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_vpcs();
    if let Some(ids) = selector.ids() {
        req = req.set_vpc_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let vpcs = output.vpcs();
    session.cache_insert(vpcs.iter().filter_map(|v| v.vpc_id()));
    let mut out = CommandOutput::new(None)?;
    for vpc in vpcs {
        display_vpc(vpc, disp, &mut out);
    }
    Ok(())
}

fn display_vpc(vpc: &Vpc, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = vpc.vpc_id().unwrap_or("-");
    let state = vpc.state().map(|s| s.as_str()).unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<14} {:<10} {:<20}",
                id,
                state,
                optional(vpc.cidr_block())
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "State", state));
            out.line(format!(
                "{:>15} : {}",
                "CIDR-block",
                optional(vpc.cidr_block())
            ));
            out.line(format!(
                "{:>15} : {}",
                "DHCP-options",
                optional(vpc.dhcp_options_id())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Default",
                vpc.is_default().unwrap_or(false)
            ));
            if disp.show_tags {
                display_tags(out, vpc.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, vpc.tags());
            }
        }
    }
}

async fn create_vpc(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let [cidr] = args else {
        return Err(CmdError::input("Expecting CIDR"));
    };
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .create_vpc()
        .cidr_block(cidr)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    if let Some(id) = output.vpc().and_then(|v| v.vpc_id()) {
        session.cache_insert([id]);
        println!("{id}");
    }
    Ok(())
}

async fn delete_vpcs(
    session: &mut Session,
    region: Option<&str>,
    vpc_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for vpc_id in vpc_ids {
        ec2.delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([vpc_id.as_str()]);
    }
    Ok(())
}

const HELP: &str = "
        vpc [-a] [-l] [-r region] [-C] [-D] [vpc-id] ...

Options:
    -C          : create a new VPC; a single argument, the VPC CIDR,
                  is expected
    -D          : delete the specified VPC(s)
";
