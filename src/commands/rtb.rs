//! The `rtb` command: route tables.

use async_trait::async_trait;
use aws_sdk_ec2::types::RouteTable;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct RtbCommand;

#[derive(Parser, Debug)]
#[command(name = "rtb", no_binary_name = true, disable_help_flag = true)]
struct RtbArgs {
    /// select all route tables
    #[arg(short = 'a')]
    all: bool,
    /// delete the specified route table(s)
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
    /// add a route to a route table
    #[arg(short = 'S')]
    add_route: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// only route tables of this VPC
    #[arg(short = 'v')]
    vpc: Option<String>,
    /// delete route(s) from a route table
    #[arg(short = 'X')]
    delete_route: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for RtbCommand {
    fn name(&self) -> &'static str {
        "rtb"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: RtbArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
        }
        if let Some(vpc) = &args.vpc {
            selector.add_filter("vpc-id", vpc);
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

        if args.delete {
            delete_rtbs(session, region, &args.args).await
        } else if args.add_route {
            add_route(session, region, &args.args).await
        } else if args.delete_route {
            delete_routes(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_rtbs(session, region, &selector, &disp).await
        }
    }
}

async fn list_rtbs(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_route_tables();
    if let Some(ids) = selector.ids() {
        req = req.set_route_table_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let rtbs = output.route_tables();
    session.cache_insert(rtbs.iter().filter_map(|r| r.route_table_id()));
    let mut out = CommandOutput::new(None)?;
    for rtb in rtbs {
        display_rtb(rtb, disp, &mut out);
    }
    Ok(())
}

fn display_rtb(rtb: &RouteTable, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = rtb.route_table_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!("{:<14} {:<10}", id, rtb.vpc_id().unwrap_or("-")));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "VPC", rtb.vpc_id().unwrap_or("-")));
            for route in rtb.routes() {
                let dest = route
                    .gateway_id()
                    .or(route.instance_id())
                    .or(route.nat_gateway_id())
                    .unwrap_or("-");
                out.line(format!(
                    "{:>15} : {:<16} {:<12} {}",
                    "Route",
                    route.destination_cidr_block().unwrap_or("-"),
                    dest,
                    route.state().map(|s| s.as_str()).unwrap_or("-"),
                ));
            }
            for assoc in rtb.associations() {
                if let Some(subnet) = assoc.subnet_id() {
                    out.line(format!("{:>15} : {}", "Subnet", subnet));
                }
            }
            if disp.show_tags {
                display_tags(out, rtb.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, rtb.tags());
            }
        }
    }
}

async fn delete_rtbs(
    session: &mut Session,
    region: Option<&str>,
    rtb_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for rtb_id in rtb_ids {
        ec2.delete_route_table()
            .route_table_id(rtb_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([rtb_id.as_str()]);
    }
    Ok(())
}

async fn add_route(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let mut rtb_id = None;
    let mut cidr = None;
    let mut instance_id = None;
    let mut igw_id = None;
    for arg in args {
        if arg.starts_with("rtb-") {
            rtb_id = Some(arg.clone());
        } else if arg.starts_with("i-") {
            instance_id = Some(arg.clone());
        } else if arg.starts_with("igw-") {
            igw_id = Some(arg.clone());
        } else if arg.contains('/') {
            cidr = Some(arg.clone());
        } else {
            return Err(CmdError::input(format!("Unexpected argument: {arg}")));
        }
    }
    if instance_id.is_some() && igw_id.is_some() {
        return Err(CmdError::input(
            "You need to specify either an instance id or an internet gateway id",
        ));
    }
    let rtb_id = rtb_id.ok_or_else(|| CmdError::input("No route-table id specified"))?;
    let cidr = cidr.ok_or_else(|| CmdError::input("No CIDR specified"))?;

    let ec2 = session.ec2(region).await?;
    ec2.create_route()
        .route_table_id(rtb_id)
        .destination_cidr_block(cidr)
        .set_gateway_id(igw_id)
        .set_instance_id(instance_id)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

async fn delete_routes(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let mut rtb_id = None;
    let mut cidrs = Vec::new();
    for arg in args {
        if arg.starts_with("rtb-") {
            rtb_id = Some(arg.clone());
        } else if arg.contains('/') {
            cidrs.push(arg.clone());
        } else {
            return Err(CmdError::input(format!("Unexpected argument: {arg}")));
        }
    }
    let rtb_id = rtb_id.ok_or_else(|| CmdError::input("No route-table id specified"))?;
    let ec2 = session.ec2(region).await?;
    for cidr in cidrs {
        ec2.delete_route()
            .route_table_id(&rtb_id)
            .destination_cidr_block(cidr)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
    }
    Ok(())
}

const HELP: &str = "
        rtb [std-options] [list-options] [-v vpc-id] [-D] [rtb-id] ...

Options:
    -D          : delete the specified route table(s)
    -S          : add a route to the route table; the arguments are:
                        rtb-id, instance-id or IGW-id, CIDR
    -X          : delete a route from the route table; the argument is
                  the CIDR identifying the route
";
