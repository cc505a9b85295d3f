//! The `subnet` command.

use async_trait::async_trait;
use aws_sdk_ec2::types::Subnet;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct SubnetCommand;

#[derive(Parser, Debug)]
#[command(name = "subnet", no_binary_name = true, disable_help_flag = true)]
struct SubnetArgs {
    /// select all subnets
    #[arg(short = 'a')]
    all: bool,
    /// create a subnet
    #[arg(short = 'C')]
    create: bool,
    /// delete subnet(s)
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
    /// only subnets of this VPC (also the VPC for -C)
    #[arg(short = 'v')]
    vpc: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for SubnetCommand {
    fn name(&self) -> &'static str {
        "subnet"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: SubnetArgs = parse_argv(argv)?;

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

        if args.create {
            create_subnet(session, region, args.vpc.as_deref(), &args.args).await
        } else if args.delete {
            delete_subnets(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_subnets(session, region, &selector, &disp).await
        }
    }
}

async fn list_subnets(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_subnets();
    if let Some(ids) = selector.ids() {
        req = req.set_subnet_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let subnets = output.subnets();
    session.cache_insert(subnets.iter().filter_map(|s| s.subnet_id()));
    let mut out = CommandOutput::new(None)?;
    for subnet in subnets {
        display_subnet(subnet, disp, &mut out);
    }
    Ok(())
}

fn display_subnet(subnet: &Subnet, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = subnet.subnet_id().unwrap_or("-");
    let state = subnet.state().map(|s| s.as_str()).unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<20} {:<8} {:<18} {:<4} {:<12}",
                id,
                state,
                optional(subnet.cidr_block()),
                subnet.available_ip_address_count().unwrap_or(0),
                optional(subnet.availability_zone()),
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "State", state));
            out.line(format!(
                "{:>15} : {}",
                "CIDR-block",
                optional(subnet.cidr_block())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Avail-IP",
                subnet.available_ip_address_count().unwrap_or(0)
            ));
            out.line(format!(
                "{:>15} : {}",
                "Zone",
                optional(subnet.availability_zone())
            ));
            out.line(format!("{:>15} : {}", "VPC", optional(subnet.vpc_id())));
            if disp.show_tags {
                display_tags(out, subnet.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, subnet.tags());
            }
        }
    }
}

async fn create_subnet(
    session: &mut Session,
    region: Option<&str>,
    vpc_flag: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    // The vpc-id may come from the -v option or the argument list; the
    // zone and CIDR are recognized by shape.
    let mut vpc_id = vpc_flag.map(str::to_string);
    let mut zone = None;
    let mut cidr = None;
    for arg in args {
        if arg.starts_with("vpc-") {
            vpc_id = Some(arg.clone());
        } else if arg.contains('/') {
            cidr = Some(arg.clone());
        } else if arg.contains('-') {
            zone = Some(arg.clone());
        } else {
            return Err(CmdError::input(format!("Unexpected argument: {arg}")));
        }
    }
    let mut errors = Vec::new();
    if zone.is_none() {
        errors.push("No zone specified");
    }
    if cidr.is_none() {
        errors.push("No CIDR specified");
    }
    if vpc_id.is_none() {
        errors.push("No VPC specified");
    }
    if !errors.is_empty() {
        return Err(CmdError::input(errors.join("\n")));
    }

    let ec2 = session.ec2(region).await?;
    let output = ec2
        .create_subnet()
        .set_vpc_id(vpc_id)
        .set_cidr_block(cidr)
        .set_availability_zone(zone)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    if let Some(id) = output.subnet().and_then(|s| s.subnet_id()) {
        session.cache_insert([id]);
        println!("{id}");
    }
    Ok(())
}

async fn delete_subnets(
    session: &mut Session,
    region: Option<&str>,
    subnet_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for subnet_id in subnet_ids {
        ec2.delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([subnet_id.as_str()]);
    }
    Ok(())
}

const HELP: &str = "
        subnet [std-options] [list-options] [-v vpc_id] [-C] [-D]

The -v option displays the subnets of the specified vpc-id.

The -C option is used to create a subnet; the expected arguments are
    vpc-id, CIDR, zone
in any order.

The -D option is used to delete subnets; the expected arguments are subnet ids.
";
