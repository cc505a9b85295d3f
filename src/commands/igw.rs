//! The `igw` command: internet gateways.

use async_trait::async_trait;
use aws_sdk_ec2::types::InternetGateway;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct IgwCommand;

#[derive(Parser, Debug)]
#[command(name = "igw", no_binary_name = true, disable_help_flag = true)]
struct IgwArgs {
    /// select all internet gateways
    #[arg(short = 'a')]
    all: bool,
    /// create an internet gateway
    #[arg(short = 'C')]
    create: bool,
    /// delete the specified internet gateway(s)
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
    /// attach an internet gateway to a VPC
    #[arg(short = 'S')]
    attach: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// only gateways attached to this VPC
    #[arg(short = 'v')]
    vpc: Option<String>,
    /// detach an internet gateway from a VPC
    #[arg(short = 'X')]
    detach: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for IgwCommand {
    fn name(&self) -> &'static str {
        "igw"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: IgwArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
        }
        if let Some(vpc) = &args.vpc {
            selector.add_filter("attachment.vpc-id", vpc);
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
            create_igw(session, region).await
        } else if args.delete {
            delete_igws(session, region, &args.args).await
        } else if args.attach {
            attach_igw(session, region, &args.args, true).await
        } else if args.detach {
            attach_igw(session, region, &args.args, false).await
        } else {
            selector.resource_ids = args.args.clone();
            list_igws(session, region, &selector, &disp).await
        }
    }
}

async fn list_igws(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_internet_gateways();
    if let Some(ids) = selector.ids() {
        req = req.set_internet_gateway_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let igws = output.internet_gateways();
    session.cache_insert(igws.iter().filter_map(|g| g.internet_gateway_id()));
    let mut out = CommandOutput::new(None)?;
    for igw in igws {
        display_igw(igw, disp, &mut out);
    }
    Ok(())
}

fn display_igw(igw: &InternetGateway, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = igw.internet_gateway_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            let attachments: Vec<String> = igw
                .attachments()
                .iter()
                .map(|att| {
                    format!(
                        "{:<24}",
                        format!(
                            "{}:{}",
                            att.vpc_id().unwrap_or("-"),
                            att.state().map(|s| s.as_str()).unwrap_or("-")
                        )
                    )
                })
                .collect();
            out.line(format!("{:<14} {}", id, attachments.join(" ")));
        }
        Verbosity::Extended => {
            out.line(id);
            for att in igw.attachments() {
                out.line(format!(
                    "{:>15} : {}",
                    att.vpc_id().unwrap_or("-"),
                    att.state().map(|s| s.as_str()).unwrap_or("-")
                ));
            }
            if disp.show_tags {
                display_tags(out, igw.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, igw.tags());
            }
        }
    }
}

async fn create_igw(session: &mut Session, region: Option<&str>) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .create_internet_gateway()
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    if let Some(id) = output
        .internet_gateway()
        .and_then(|g| g.internet_gateway_id())
    {
        session.cache_insert([id]);
        println!("{id}");
    }
    Ok(())
}

async fn delete_igws(
    session: &mut Session,
    region: Option<&str>,
    igw_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for igw_id in igw_ids {
        ec2.delete_internet_gateway()
            .internet_gateway_id(igw_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([igw_id.as_str()]);
    }
    Ok(())
}

fn attach_args(args: &[String]) -> Result<(String, String), CmdError> {
    let mut igw_id = None;
    let mut vpc_id = None;
    for arg in args {
        if arg.starts_with("igw-") {
            igw_id = Some(arg.clone());
        } else if arg.starts_with("vpc-") {
            vpc_id = Some(arg.clone());
        }
    }
    let vpc_id = vpc_id.ok_or_else(|| CmdError::input("No VPC ID specified"))?;
    let igw_id = igw_id.ok_or_else(|| CmdError::input("No internet-gateway ID specified"))?;
    Ok((igw_id, vpc_id))
}

async fn attach_igw(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
    attach: bool,
) -> Result<(), CmdError> {
    let (igw_id, vpc_id) = attach_args(args)?;
    let ec2 = session.ec2(region).await?;
    if attach {
        ec2.attach_internet_gateway()
            .internet_gateway_id(igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
    } else {
        ec2.detach_internet_gateway()
            .internet_gateway_id(igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
    }
    Ok(())
}

const HELP: &str = "
    igw [std-options] [list-options] [-v vpc-id] [-C] [-D] [-S] [-X] [igw-id]

Options:
    -C          : create an internet gateway (no arguments expected)
    -D          : delete the specified internet gateway(s)
    -S          : attach an internet gateway to a VPC
    -X          : detach an internet gateway from a VPC
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_args_require_both_ids() {
        let (igw, vpc) =
            attach_args(&["vpc-54942039".to_string(), "igw-11112222".to_string()]).unwrap();
        assert_eq!(igw, "igw-11112222");
        assert_eq!(vpc, "vpc-54942039");
        assert!(attach_args(&["igw-11112222".to_string()]).is_err());
        assert!(attach_args(&[]).is_err());
    }
}
