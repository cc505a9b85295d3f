//! The `eip` command: elastic IP addresses.

use async_trait::async_trait;
use aws_sdk_ec2::types::{Address, DomainType};
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct EipCommand;

#[derive(Parser, Debug)]
#[command(name = "eip", no_binary_name = true, disable_help_flag = true)]
struct EipArgs {
    /// allocate an elastic IP address
    #[arg(short = 'A')]
    allocate: bool,
    /// select all addresses
    #[arg(short = 'a')]
    all: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// allow moving the EIP between interfaces
    #[arg(short = 'm')]
    move_address: bool,
    /// release an elastic IP address
    #[arg(short = 'R')]
    release: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// associate an IP address with an instance
    #[arg(short = 'S')]
    associate: bool,
    /// allocate a VPC-suitable address
    #[arg(short = 'V')]
    vpc: bool,
    /// disassociate an IP address from an instance
    #[arg(short = 'X')]
    disassociate: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for EipCommand {
    fn name(&self) -> &'static str {
        "eip"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: EipArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }

        let region = args.region.as_deref();

        if args.allocate {
            allocate_address(session, region, args.vpc, &args.args).await
        } else if args.release {
            release_addresses(session, region, &args.args).await
        } else if args.associate {
            associate_address(session, region, args.move_address, args.args.clone()).await
        } else if args.disassociate {
            disassociate_addresses(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_addresses(session, region, &selector, &disp).await
        }
    }
}

async fn query_addresses(
    session: &mut Session,
    region: Option<&str>,
    eips: &[String],
) -> Result<Vec<Address>, CmdError> {
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_addresses();
    if !eips.is_empty() {
        // eipalloc ids and plain public IPs both work as selectors.
        let (alloc_ids, public_ips): (Vec<String>, Vec<String>) = eips
            .iter()
            .cloned()
            .partition(|eip| eip.starts_with("eipalloc-"));
        if !alloc_ids.is_empty() {
            req = req.set_allocation_ids(Some(alloc_ids));
        }
        if !public_ips.is_empty() {
            req = req.set_public_ips(Some(public_ips));
        }
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.addresses().to_vec())
}

async fn list_addresses(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let addresses = query_addresses(session, region, &selector.resource_ids).await?;
    session.cache_insert(addresses.iter().filter_map(|a| a.allocation_id()));
    let mut out = CommandOutput::new(None)?;
    for address in &addresses {
        display_address(address, disp, &mut out);
    }
    Ok(())
}

fn display_address(address: &Address, disp: &DisplayOptions, out: &mut CommandOutput) {
    let public_ip = address.public_ip().unwrap_or("-");
    let domain = address.domain().map(|d| d.as_str()).unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<16} {:<10} {:<12} {:<16} {}",
                public_ip,
                domain,
                optional(address.instance_id()),
                optional(address.private_ip_address()),
                optional(address.allocation_id()),
            ));
        }
        Verbosity::Extended => {
            out.line(public_ip);
            out.line(format!("{:>15} : {}", "Domain", domain));
            if let Some(instance) = address.instance_id() {
                out.line(format!("{:>15} : {}", "Instance", instance));
            }
            if let Some(allocation) = address.allocation_id() {
                out.line(format!("{:>15} : {}", "Allocation", allocation));
            }
            if let Some(association) = address.association_id() {
                out.line(format!("{:>15} : {}", "Association", association));
            }
            if let Some(eni) = address.network_interface_id() {
                out.line(format!("{:>15} : {}", "Interface", eni));
            }
            if let Some(private_ip) = address.private_ip_address() {
                out.line(format!("{:>15} : {}", "Private-IP", private_ip));
            }
        }
        Verbosity::Simple => out.line(public_ip),
    }
}

async fn allocate_address(
    session: &mut Session,
    region: Option<&str>,
    in_vpc: bool,
    args: &[String],
) -> Result<(), CmdError> {
    if !args.is_empty() {
        return Err(CmdError::input("No arguments expected"));
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.allocate_address();
    if in_vpc {
        req = req.domain(DomainType::Vpc);
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    match (output.public_ip(), output.allocation_id()) {
        (Some(public_ip), Some(allocation_id)) if in_vpc => {
            session.cache_insert([allocation_id]);
            println!("{public_ip:<16} {allocation_id:<12}");
        }
        (Some(public_ip), _) => println!("{public_ip}"),
        _ => {}
    }
    Ok(())
}

async fn release_addresses(
    session: &mut Session,
    region: Option<&str>,
    eips: &[String],
) -> Result<(), CmdError> {
    let addresses = query_addresses(session, region, eips).await?;
    let ec2 = session.ec2(region).await?;
    for address in &addresses {
        let mut req = ec2.release_address();
        match address.allocation_id() {
            Some(allocation_id) => {
                req = req.allocation_id(allocation_id);
                session.cache_remove([allocation_id]);
            }
            None => req = req.set_public_ip(address.public_ip().map(str::to_string)),
        }
        req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    }
    Ok(())
}

async fn associate_address(
    session: &mut Session,
    region: Option<&str>,
    move_address: bool,
    mut args: Vec<String>,
) -> Result<(), CmdError> {
    if args.is_empty() {
        return Err(CmdError::input("Missing EIP"));
    }
    let eip = args.remove(0);
    let mut instance_id = None;
    let mut eni_id = None;
    let mut private_ip = None;
    for arg in &args {
        if arg.starts_with("i-") {
            instance_id = Some(arg.clone());
        } else if arg.starts_with("eni-") {
            eni_id = Some(arg.clone());
        } else {
            private_ip = Some(arg.clone());
        }
    }
    if instance_id.is_none() && eni_id.is_none() {
        return Err(CmdError::input(
            "Either an instance-id or an interface id must be specified",
        ));
    }
    if instance_id.is_some() && eni_id.is_some() {
        return Err(CmdError::input(
            "Either an instance-id or an interface id must be specified; not both",
        ));
    }

    let addresses = query_addresses(session, region, &[eip.clone()]).await?;
    let Some(address) = addresses.first() else {
        return Err(CmdError::input(format!("Unknown EIP: {eip}")));
    };
    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .associate_address()
        .set_instance_id(instance_id)
        .set_network_interface_id(eni_id)
        .set_private_ip_address(private_ip)
        .allow_reassociation(move_address);
    match address.allocation_id() {
        Some(allocation_id) => req = req.allocation_id(allocation_id),
        None => req = req.set_public_ip(address.public_ip().map(str::to_string)),
    }
    req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

async fn disassociate_addresses(
    session: &mut Session,
    region: Option<&str>,
    eips: &[String],
) -> Result<(), CmdError> {
    let addresses = query_addresses(session, region, eips).await?;
    let ec2 = session.ec2(region).await?;
    for address in &addresses {
        let mut req = ec2.disassociate_address();
        match address.association_id() {
            Some(association_id) => req = req.association_id(association_id),
            None => req = req.set_public_ip(address.public_ip().map(str::to_string)),
        }
        req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    }
    Ok(())
}

const HELP: &str = "
        eip [std-options] [list-options] [-A] [-m] [-V] [eip] ...

Options:
    -A          : allocate an elastic IP address
    -R          : release an elastic IP address
    -S          : associate an IP address with an instance
    -X          : disassociate an IP address from an instance
    -m          : move an EIP between the instance's interfaces
    -V          : allocate VPC-suitable address

The -S option expects an EIP address followed by either an instance-id or
a network-interface-id (eni-id), and optionally a private IP address of
the instance.
The -X option expects a list of EIP addresses (can be just one).
";
