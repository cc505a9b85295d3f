//! The `rds` command: RDS database instances, security groups, and
//! subnet groups, addressed as subcommands (`rds inst`, `rds sg`,
//! `rds subnetg`).

use async_trait::async_trait;
use aws_sdk_rds::types::{DbInstance, DbSecurityGroup, DbSubnetGroup};
use clap::Parser;

use crate::commands::{confirm, parse_argv, Command};
use crate::display::{local_time, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct RdsCommand;

#[derive(Parser, Debug)]
#[command(name = "rds", no_binary_name = true, disable_help_flag = true)]
struct RdsSubArgs {
    /// select all
    #[arg(short = 'a')]
    all: bool,
    /// delete (sg/subnetg)
    #[arg(short = 'D')]
    delete: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// terminate a database instance (inst)
    #[arg(short = 'T')]
    terminate: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

impl RdsSubArgs {
    fn display(&self) -> DisplayOptions {
        let mut disp = DisplayOptions::new();
        if self.long {
            disp.verbosity = Verbosity::Long;
        }
        if self.extended {
            disp.verbosity = Verbosity::Extended;
        }
        disp
    }

    /// None for a full listing, or the single requested name.
    fn single_name(&self, what: &str) -> Result<Option<String>, CmdError> {
        if self.all {
            return Ok(None);
        }
        match self.args.as_slice() {
            [] => Ok(None),
            [name] => Ok(Some(name.clone())),
            _ => Err(CmdError::input(format!(
                "Only a single RDS {what} may be specified"
            ))),
        }
    }
}

#[async_trait]
impl Command for RdsCommand {
    fn name(&self) -> &'static str {
        "rds"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, mut argv: Vec<String>) -> Result<(), CmdError> {
        if argv.is_empty() {
            return Ok(());
        }
        let rds_type = argv.remove(0);
        let args: RdsSubArgs = parse_argv(argv)?;
        match rds_type.as_str() {
            "inst" => rds_inst(session, &args).await,
            "sg" => rds_sg(session, &args).await,
            "subnetg" => rds_subnetg(session, &args).await,
            other => Err(CmdError::input(format!(
                "Unsupported RDS resource type: {other}"
            ))),
        }
    }
}

async fn rds_inst(session: &mut Session, args: &RdsSubArgs) -> Result<(), CmdError> {
    let region = args.region.as_deref();
    if args.terminate {
        if args.args.is_empty() {
            return Ok(());
        }
        if !confirm(None) {
            return Ok(());
        }
        let rds = session.rds(region).await?;
        for instance_id in &args.args {
            let output = rds
                .delete_db_instance()
                .db_instance_identifier(instance_id)
                .skip_final_snapshot(true)
                .send()
                .await
                .map_err(|e| CmdError::service("RDS", e))?;
            match output
                .db_instance()
                .and_then(|i| i.db_instance_identifier())
            {
                Some(id) => println!("Terminated: {id}"),
                None => println!("Failed to terminate: {instance_id}"),
            }
        }
        return Ok(());
    }

    let instance_id = args.single_name("instance id")?;
    if !args.all && instance_id.is_none() {
        return Ok(());
    }
    let rds = session.rds(region).await?;
    let mut req = rds.describe_db_instances();
    if let Some(instance_id) = instance_id {
        req = req.db_instance_identifier(instance_id);
    }
    let output = req.send().await.map_err(|e| CmdError::service("RDS", e))?;
    let disp = args.display();
    let mut out = CommandOutput::new(None)?;
    for instance in output.db_instances() {
        display_db_instance(instance, &disp, &mut out);
    }
    Ok(())
}

fn display_db_instance(instance: &DbInstance, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = instance.db_instance_identifier().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<20} {:<10} {:<10} {}",
                id,
                optional(instance.db_instance_status()),
                optional(instance.db_instance_class()),
                local_time(instance.instance_create_time()),
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!(
                "{:>15} : {}",
                "Status",
                optional(instance.db_instance_status())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Creation-time",
                local_time(instance.instance_create_time())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Class",
                optional(instance.db_instance_class())
            ));
            out.line(format!("{:>15} : {}", "Engine", optional(instance.engine())));
            out.line(format!(
                "{:>15} : {}",
                "Storage",
                instance.allocated_storage().unwrap_or(0)
            ));
            if let Some(endpoint) = instance.endpoint() {
                out.line(format!(
                    "{:>15} : {}",
                    "DNS-name",
                    optional(endpoint.address())
                ));
                out.line(format!(
                    "{:>15} : {}",
                    "Port",
                    endpoint.port().unwrap_or(0)
                ));
            }
            out.line(format!(
                "{:>15} : {}",
                "MultiZone",
                instance.multi_az().unwrap_or(false)
            ));
            if let Some(zone) = instance.availability_zone() {
                out.line(format!("{:>15} : {}", "Zone", zone));
            }
            let mut groups: Vec<&str> = instance
                .vpc_security_groups()
                .iter()
                .filter_map(|g| g.vpc_security_group_id())
                .collect();
            groups.extend(
                instance
                    .db_security_groups()
                    .iter()
                    .filter_map(|g| g.db_security_group_name()),
            );
            out.line(format!("{:>15} : {}", "Groups", groups.join(" ")));
        }
        Verbosity::Simple => out.line(id),
    }
}

async fn rds_sg(session: &mut Session, args: &RdsSubArgs) -> Result<(), CmdError> {
    let region = args.region.as_deref();
    if args.delete {
        let [name] = args.args.as_slice() else {
            return Err(CmdError::input(
                "Expecting a single RDS security group name",
            ));
        };
        let rds = session.rds(region).await?;
        rds.delete_db_security_group()
            .db_security_group_name(name)
            .send()
            .await
            .map_err(|e| CmdError::service("RDS", e))?;
        return Ok(());
    }

    let group_name = args.single_name("group name")?;
    if !args.all && group_name.is_none() {
        return Ok(());
    }
    let rds = session.rds(region).await?;
    let mut req = rds.describe_db_security_groups();
    if let Some(group_name) = group_name {
        req = req.db_security_group_name(group_name);
    }
    let output = req.send().await.map_err(|e| CmdError::service("RDS", e))?;
    let disp = args.display();
    let mut out = CommandOutput::new(None)?;
    for group in output.db_security_groups() {
        display_db_sg(group, &disp, &mut out);
    }
    Ok(())
}

fn display_db_sg(group: &DbSecurityGroup, disp: &DisplayOptions, out: &mut CommandOutput) {
    let name = group.db_security_group_name().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<20} {}",
                name,
                optional(group.db_security_group_description())
            ));
        }
        Verbosity::Extended => {
            out.line(name);
            out.line(format!(
                "{:>15} : {}",
                "Description",
                optional(group.db_security_group_description())
            ));
            let ec2_groups: Vec<&str> = group
                .ec2_security_groups()
                .iter()
                .filter_map(|g| g.ec2_security_group_name())
                .collect();
            if !ec2_groups.is_empty() {
                out.line(format!(
                    "{:>15} : {}",
                    "Groups-allowed",
                    ec2_groups.join(", ")
                ));
            }
            let cidrs: Vec<&str> = group
                .ip_ranges()
                .iter()
                .filter_map(|r| r.cidrip())
                .collect();
            if !cidrs.is_empty() {
                out.line(format!("{:>15} : {}", "CIDRs-allowed", cidrs.join(", ")));
            }
        }
        Verbosity::Simple => out.line(name),
    }
}

async fn rds_subnetg(session: &mut Session, args: &RdsSubArgs) -> Result<(), CmdError> {
    let region = args.region.as_deref();
    if args.delete {
        let [name] = args.args.as_slice() else {
            return Err(CmdError::input("Expecting a single RDS subnet group name"));
        };
        let rds = session.rds(region).await?;
        rds.delete_db_subnet_group()
            .db_subnet_group_name(name)
            .send()
            .await
            .map_err(|e| CmdError::service("RDS", e))?;
        return Ok(());
    }

    let group_name = args.single_name("subnet group name")?;
    if !args.all && group_name.is_none() {
        return Ok(());
    }
    let rds = session.rds(region).await?;
    let mut req = rds.describe_db_subnet_groups();
    if let Some(group_name) = group_name {
        req = req.db_subnet_group_name(group_name);
    }
    let output = req.send().await.map_err(|e| CmdError::service("RDS", e))?;
    let disp = args.display();
    let mut out = CommandOutput::new(None)?;
    for group in output.db_subnet_groups() {
        display_db_subnetg(group, &disp, &mut out);
    }
    Ok(())
}

fn display_db_subnetg(group: &DbSubnetGroup, disp: &DisplayOptions, out: &mut CommandOutput) {
    let name = group.db_subnet_group_name().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<20} {:<12} {}",
                name,
                optional(group.subnet_group_status()),
                optional(group.db_subnet_group_description()),
            ));
        }
        Verbosity::Extended => {
            out.line(name);
            out.line(format!(
                "{:>15} : {}",
                "Description",
                optional(group.db_subnet_group_description())
            ));
            let subnets: Vec<&str> = group
                .subnets()
                .iter()
                .filter_map(|s| s.subnet_identifier())
                .collect();
            out.line(format!("{:>15} : {}", "Subnets", subnets.join(" ")));
            out.line(format!("{:>15} : {}", "VPC", optional(group.vpc_id())));
            out.line(format!(
                "{:>15} : {}",
                "Status",
                optional(group.subnet_group_status())
            ));
        }
        Verbosity::Simple => out.line(name),
    }
}

const HELP: &str = "
        rds <type> [<options>] [<args>]

The type can be one of 'inst', 'sg', or 'subnetg'.

    rds inst [-a | db-instance-id] [-l|-x]   : list database instances
    rds inst -T db-instance-id ...           : terminate instances
    rds sg [-a | name] [-l|-x]               : list DB security groups
    rds sg -D name                           : delete a DB security group
    rds subnetg [-a | name] [-l|-x]          : list DB subnet groups
    rds subnetg -D name                      : delete a DB subnet group
";
