//! The `nacl` command: network ACLs.

use async_trait::async_trait;
use aws_sdk_ec2::types::NetworkAcl;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct NaclCommand;

#[derive(Parser, Debug)]
#[command(name = "nacl", no_binary_name = true, disable_help_flag = true)]
struct NaclArgs {
    /// select all network ACLs
    #[arg(short = 'a')]
    all: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
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
impl Command for NaclCommand {
    fn name(&self) -> &'static str {
        "nacl"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: NaclArgs = parse_argv(argv)?;
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
        disp.show_tags = args.tags;

        let ec2 = session.ec2(args.region.as_deref()).await?;
        let mut req = ec2.describe_network_acls();
        if !args.all && !args.args.is_empty() {
            req = req.set_network_acl_ids(Some(args.args.clone()));
        }
        let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
        let nacls = output.network_acls();
        session.cache_insert(nacls.iter().filter_map(|n| n.network_acl_id()));
        let mut out = CommandOutput::new(None)?;
        for nacl in nacls {
            display_nacl(nacl, &disp, &mut out);
        }
        Ok(())
    }
}

fn display_nacl(nacl: &NetworkAcl, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = nacl.network_acl_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => out.line(format!("{id:<20}")),
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "VPC", nacl.vpc_id().unwrap_or("-")));
            out.line(format!(
                "{:>15} : {}",
                "Default",
                nacl.is_default().unwrap_or(false)
            ));
            for entry in nacl.entries() {
                let rule = format!("Rule {}", entry.rule_number().unwrap_or(0));
                // Protocol -1 means every protocol.
                let proto_spec = match entry.protocol() {
                    Some("-1") | None => "ALL".to_string(),
                    Some(proto) => format!(
                        "{}:{}-{}",
                        proto,
                        entry
                            .port_range()
                            .and_then(|p| p.from())
                            .map_or("-".to_string(), |p| p.to_string()),
                        entry
                            .port_range()
                            .and_then(|p| p.to())
                            .map_or("-".to_string(), |p| p.to_string()),
                    ),
                };
                let direction = if entry.egress().unwrap_or(false) {
                    "egress"
                } else {
                    "ingress"
                };
                out.line(format!(
                    "{:>15}: {:<8} {:<10} {:<20} {}",
                    rule,
                    direction,
                    entry.rule_action().map(|a| a.as_str()).unwrap_or("-"),
                    proto_spec,
                    entry.cidr_block().unwrap_or("-"),
                ));
            }
            for assoc in nacl.associations() {
                if let Some(subnet) = assoc.subnet_id() {
                    out.line(format!("{:>15}: {}", "Subnet", subnet));
                }
            }
            if disp.show_tags {
                display_tags(out, nacl.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, nacl.tags());
            }
        }
    }
}

const HELP: &str = "
        nacl [std-options] [list-options]

Lists network ACLs together with their rule entries and subnet
associations (use -x for the full rule dump).
";
