//! The `eni` command: elastic network interfaces.

use async_trait::async_trait;
use aws_sdk_ec2::types::{AttributeBooleanValue, NetworkInterface};
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, local_time, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct EniCommand;

#[derive(Parser, Debug)]
#[command(name = "eni", no_binary_name = true, disable_help_flag = true)]
struct EniArgs {
    /// select all network interfaces
    #[arg(short = 'a')]
    all: bool,
    /// enable source/dest check
    #[arg(short = 'B')]
    sdc_on: bool,
    /// create a network interface
    #[arg(short = 'C')]
    create: bool,
    /// delete a network interface
    #[arg(short = 'D')]
    delete: bool,
    /// description (with -C)
    #[arg(short = 'd')]
    description: Option<String>,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// only interfaces attached to this instance
    #[arg(short = 'i')]
    instance: Option<String>,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// disable source/dest check
    #[arg(short = 'P')]
    sdc_off: bool,
    /// tag filter key[=value] or =value
    #[arg(short = 'q')]
    tag_filters: Vec<String>,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// attach a network interface to an instance
    #[arg(short = 'S')]
    attach: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// detach a network interface from an instance
    #[arg(short = 'X')]
    detach: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for EniCommand {
    fn name(&self) -> &'static str {
        "eni"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: EniArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
        }
        if let Some(instance) = &args.instance {
            selector.add_filter("attachment.instance-id", instance);
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
            create_eni(session, region, args.description.as_deref(), &args.args).await
        } else if args.delete {
            delete_enis(session, region, &args.args).await
        } else if args.attach {
            attach_eni(session, region, &args.args).await
        } else if args.detach {
            detach_eni(session, region, &args.args).await
        } else if args.sdc_on || args.sdc_off {
            source_dest_check(session, region, args.sdc_on, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_enis(session, region, &selector, &disp).await
        }
    }
}

async fn list_enis(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_network_interfaces();
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let enis = output.network_interfaces();
    session.cache_insert(enis.iter().filter_map(|e| e.network_interface_id()));

    // The query is unfiltered by id so the cache still fills; explicit
    // ids narrow the display only.
    let shown: Vec<&NetworkInterface> = if selector.is_explicit() {
        enis.iter()
            .filter(|eni| {
                eni.network_interface_id()
                    .map(|id| selector.resource_ids.iter().any(|want| want == id))
                    .unwrap_or(false)
            })
            .collect()
    } else {
        enis.iter().collect()
    };

    let mut out = CommandOutput::new(None)?;
    for eni in shown {
        display_eni(eni, disp, &mut out);
    }
    Ok(())
}

fn display_eni(eni: &NetworkInterface, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = eni.network_interface_id().unwrap_or("-");
    let status = eni.status().map(|s| s.as_str()).unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<14} {:<8} {:<14} {:<18} {:<10}",
                id,
                status,
                optional(eni.vpc_id()),
                optional(eni.subnet_id()),
                optional(eni.availability_zone()),
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "Status", status));
            if let Some(description) = eni.description() {
                if !description.is_empty() {
                    out.line(format!("{:>15} : {}", "Description", description));
                }
            }
            out.line(format!("{:>15} : {}", "MAC", optional(eni.mac_address())));
            out.line(format!(
                "{:>15} : {}",
                "Zone",
                optional(eni.availability_zone())
            ));
            out.line(format!("{:>15} : {}", "VPC", optional(eni.vpc_id())));
            out.line(format!("{:>15} : {}", "Subnet", optional(eni.subnet_id())));
            out.line(format!(
                "{:>15} : {}",
                "Req-managed",
                eni.requester_managed().unwrap_or(false)
            ));
            if let Some(primary_ip) = eni.private_ip_address() {
                out.line(format!("{:>15} : {}", "Primary-IP", primary_ip));
            }
            let private_ips: Vec<&str> = eni
                .private_ip_addresses()
                .iter()
                .filter_map(|p| p.private_ip_address())
                .collect();
            if !private_ips.is_empty() {
                out.line(format!("{:>15} : {}", "Private-IPs", private_ips.join(", ")));
            }
            let groups: Vec<&str> = eni.groups().iter().filter_map(|g| g.group_id()).collect();
            if !groups.is_empty() {
                out.line(format!("{:>15} : {}", "Groups", groups.join(" ")));
            }
            out.line(format!(
                "{:>15} : {}",
                "SRC/DST-check",
                eni.source_dest_check().unwrap_or(false)
            ));
            if let Some(att) = eni.attachment() {
                out.line(format!(
                    "{:>15} : {}",
                    "Instance",
                    optional(att.instance_id())
                ));
                out.line(format!(
                    "{:>15} : {}",
                    "Device-index",
                    att.device_index().unwrap_or(-1)
                ));
                out.line(format!(
                    "{:>15} : {}",
                    "Attach-time",
                    local_time(att.attach_time())
                ));
                out.line(format!(
                    "{:>15} : {}",
                    "DoT",
                    att.delete_on_termination().unwrap_or(false)
                ));
            }
            if disp.show_tags {
                display_tags(out, eni.tag_set());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, eni.tag_set());
            }
        }
    }
}

async fn create_eni(
    session: &mut Session,
    region: Option<&str>,
    description: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let mut subnet_id = None;
    let mut private_ip = None;
    let mut sg_ids = Vec::new();
    for arg in args {
        if arg.starts_with("subnet-") {
            subnet_id = Some(arg.clone());
        } else if arg.starts_with("sg-") {
            sg_ids.push(arg.clone());
        } else {
            private_ip = Some(arg.clone());
        }
    }
    let mut errors = Vec::new();
    if subnet_id.is_none() {
        errors.push("subnet-id must be specified");
    }
    if private_ip.is_none() {
        errors.push("private IP address must be specified");
    }
    if !errors.is_empty() {
        return Err(CmdError::input(errors.join("\n")));
    }

    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .create_network_interface()
        .set_subnet_id(subnet_id)
        .set_private_ip_address(private_ip);
    if !sg_ids.is_empty() {
        req = req.set_groups(Some(sg_ids));
    }
    if let Some(description) = description {
        req = req.description(description);
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    if let Some(id) = output
        .network_interface()
        .and_then(|e| e.network_interface_id())
    {
        session.cache_insert([id]);
        println!("{id}");
    }
    Ok(())
}

async fn delete_enis(
    session: &mut Session,
    region: Option<&str>,
    eni_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for eni_id in eni_ids {
        ec2.delete_network_interface()
            .network_interface_id(eni_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([eni_id.as_str()]);
    }
    Ok(())
}

fn attach_detach_args(args: &[String]) -> (Option<String>, Option<String>, Option<i32>) {
    let mut instance_id = None;
    let mut eni_id = None;
    let mut device_index = None;
    for arg in args {
        if arg.starts_with("i-") {
            instance_id = Some(arg.clone());
        } else if arg.starts_with("eni-") {
            eni_id = Some(arg.clone());
        } else if let Ok(index) = arg.parse::<i32>() {
            device_index = Some(index);
        }
    }
    (instance_id, eni_id, device_index)
}

async fn attach_eni(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let (instance_id, eni_id, device_index) = attach_detach_args(args);
    let mut errors = Vec::new();
    if instance_id.is_none() {
        errors.push("instance-id must be specified");
    }
    if eni_id.is_none() {
        errors.push("eni-id must be specified");
    }
    if device_index.is_none() {
        errors.push("device_index must be specified");
    }
    if !errors.is_empty() {
        return Err(CmdError::input(errors.join("\n")));
    }
    let ec2 = session.ec2(region).await?;
    ec2.attach_network_interface()
        .set_network_interface_id(eni_id)
        .set_instance_id(instance_id)
        .set_device_index(device_index)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

async fn detach_eni(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let (instance_id, eni_id, _) = attach_detach_args(args);
    let Some(instance_id) = instance_id else {
        return Err(CmdError::input("instance-id must be specified"));
    };
    let Some(eni_id) = eni_id else {
        return Err(CmdError::input("eni-id must be specified"));
    };

    // Find the attachment binding this interface to that instance.
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .describe_network_interfaces()
        .filters(
            aws_sdk_ec2::types::Filter::builder()
                .name("attachment.instance-id")
                .values(&instance_id)
                .build(),
        )
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    let attachment_id = output
        .network_interfaces()
        .iter()
        .find(|eni| eni.network_interface_id() == Some(eni_id.as_str()))
        .and_then(|eni| eni.attachment())
        .and_then(|att| att.attachment_id());
    let Some(attachment_id) = attachment_id else {
        return Err(CmdError::input(format!(
            "{eni_id} not attached to {instance_id}"
        )));
    };
    ec2.detach_network_interface()
        .attachment_id(attachment_id)
        .force(true)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

async fn source_dest_check(
    session: &mut Session,
    region: Option<&str>,
    enabled: bool,
    args: &[String],
) -> Result<(), CmdError> {
    let Some(eni_id) = args.first() else {
        return Ok(());
    };
    let ec2 = session.ec2(region).await?;
    ec2.modify_network_interface_attribute()
        .network_interface_id(eni_id)
        .source_dest_check(AttributeBooleanValue::builder().value(enabled).build())
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

const HELP: &str = "
        eni [std-options] [list-options]

Options:
    -B          : enable source/dest check
    -C          : create a network interface; the expected arguments are
                  a subnet-id, a private IP address, and optionally
                  security group ids
    -D          : delete a network interface
    -P          : disable source/dest check
    -S          : attach a network interface to an instance; the expected
                  arguments are an eni-id, an instance-id, and a device
                  index
    -X          : detach a network interface from an instance
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_args_recognized_by_shape() {
        let args = vec![
            "eni-0abc".to_string(),
            "2".to_string(),
            "i-0def".to_string(),
        ];
        let (instance, eni, index) = attach_detach_args(&args);
        assert_eq!(instance.as_deref(), Some("i-0def"));
        assert_eq!(eni.as_deref(), Some("eni-0abc"));
        assert_eq!(index, Some(2));
    }
}
