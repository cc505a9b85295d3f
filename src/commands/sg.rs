//! The `sg` command: security groups and their ingress rules.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_ec2::types::{IpPermission, IpRange, SecurityGroup, UserIdGroupPair};
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{display_tags, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct SgCommand;

#[derive(Parser, Debug)]
#[command(name = "sg", no_binary_name = true, disable_help_flag = true)]
struct SgArgs {
    /// authorize access
    #[arg(short = 'A')]
    authorize: bool,
    /// select all security groups
    #[arg(short = 'a')]
    all: bool,
    /// create a security group
    #[arg(short = 'C')]
    create: bool,
    /// delete security group(s)
    #[arg(short = 'D')]
    delete: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// allow/revoke access for this security group
    #[arg(short = 'g')]
    principal_sg: Option<String>,
    /// display group count
    #[arg(short = 'k')]
    count: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// only groups with this name
    #[arg(short = 'n')]
    group_name: Option<String>,
    /// copy output to file
    #[arg(short = 'O')]
    output: Option<PathBuf>,
    /// port spec: proto[:port-range[,port-range]...]
    #[arg(short = 'p')]
    port_spec: Option<String>,
    /// tag filter key[=value] or =value
    #[arg(short = 'q')]
    tag_filters: Vec<String>,
    /// revoke access
    #[arg(short = 'R')]
    revoke: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// allow/revoke access for this comma-separated CIDR/IP list
    #[arg(short = 's')]
    subnet_spec: Option<String>,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// only groups in this VPC (also the VPC for -C)
    #[arg(short = 'v')]
    vpc: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

/// An endpoint specification: `<proto>[:<port-list>]` where the port
/// list is comma-separated `port[-port]` ranges. Protocol names are
/// normalized to lower case, which is what the EC2 APIs expect.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PortSpec {
    pub proto: String,
    pub ranges: BTreeSet<(i32, i32)>,
}

impl PortSpec {
    /// Parse a spec. `flexible` relaxes the protocol check; the revoke
    /// path uses it so rules created outside this tool can be cleaned
    /// up.
    pub fn parse(spec: &str, flexible: bool) -> Result<Self, CmdError> {
        match spec.split_once(':') {
            Some((proto, port_list)) => {
                let proto = proto.to_lowercase();
                if proto != "tcp" && proto != "udp" && !flexible {
                    return Err(CmdError::input(format!("Bad protocol: {proto}")));
                }
                let mut ranges = BTreeSet::new();
                for port_str in port_list.split(',') {
                    let range = match port_str.split_once('-') {
                        Some((from, to)) => (parse_port(from, port_str)?, parse_port(to, port_str)?),
                        None => {
                            let port = parse_port(port_str, port_str)?;
                            (port, port)
                        }
                    };
                    ranges.insert(range);
                }
                Ok(Self { proto, ranges })
            }
            None => {
                let proto = spec.to_lowercase();
                if proto != "icmp" && !flexible {
                    return Err(CmdError::input(format!("Bad protocol: {proto}")));
                }
                Ok(Self {
                    proto,
                    ranges: BTreeSet::new(),
                })
            }
        }
    }

    /// Render a (proto, from, to) rule target for display.
    pub fn describe(proto: &str, from: Option<i32>, to: Option<i32>) -> String {
        match proto.to_lowercase().as_str() {
            "tcp" | "udp" => match (from, to) {
                (Some(f), Some(t)) if f == t => format!("{proto:<4} port {f}"),
                (Some(f), Some(t)) => format!("{proto:<4} port {f}-{t}"),
                _ => format!("{proto:<4}"),
            },
            "icmp" => match from {
                Some(f) if f != -1 => format!("{proto:<4} type {f}"),
                _ => format!("{proto:<4}"),
            },
            _ => format!(
                "{proto:<4} args {},{}",
                from.map_or("-".to_string(), |f| f.to_string()),
                to.map_or("-".to_string(), |t| t.to_string())
            ),
        }
    }
}

fn parse_port(s: &str, context: &str) -> Result<i32, CmdError> {
    s.parse::<i32>()
        .map_err(|_| CmdError::input(format!("Bad port number: {context}")))
}

fn port_range_str(range: (i32, i32)) -> String {
    if range.0 == range.1 {
        format!("port {}", range.0)
    } else {
        format!("port range {}-{}", range.0, range.1)
    }
}

/// Collapse a group's permission list into (proto, from, to) -> set of
/// principals (CIDRs and group ids). Plain /32 CIDRs display as bare
/// addresses.
fn access_map(group: &SecurityGroup) -> BTreeMap<(String, Option<i32>, Option<i32>), BTreeSet<String>> {
    let mut map: BTreeMap<(String, Option<i32>, Option<i32>), BTreeSet<String>> = BTreeMap::new();
    for perm in group.ip_permissions() {
        let target = (
            perm.ip_protocol().unwrap_or("-").to_uppercase(),
            perm.from_port(),
            perm.to_port(),
        );
        for range in perm.ip_ranges() {
            let Some(cidr) = range.cidr_ip() else {
                continue;
            };
            let principal = match cidr.strip_suffix("/32") {
                Some(addr) => addr.to_string(),
                None => cidr.to_string(),
            };
            map.entry(target.clone()).or_default().insert(principal);
        }
        for pair in perm.user_id_group_pairs() {
            if let Some(group_id) = pair.group_id() {
                map.entry(target.clone()).or_default().insert(group_id.to_string());
            }
        }
    }
    map
}

#[async_trait]
impl Command for SgCommand {
    fn name(&self) -> &'static str {
        "sg"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: SgArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
        }
        if let Some(name) = &args.group_name {
            selector.add_filter("group-name", name);
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
        disp.show_count = args.count;
        disp.output_file = args.output.clone();

        let region = args.region.as_deref();

        if args.authorize || args.revoke {
            change_access(session, region, &args).await
        } else if args.delete {
            delete_groups(session, region, &args.args).await
        } else if args.create {
            create_group(session, region, args.vpc.as_deref(), &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_groups(session, region, &selector, &disp).await
        }
    }
}

async fn list_groups(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_security_groups();
    if let Some(ids) = selector.ids() {
        req = req.set_group_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let groups = output.security_groups();
    session.cache_insert(groups.iter().filter_map(|g| g.group_id()));

    let mut out = CommandOutput::new(disp.output_file.as_deref())?;
    if disp.show_count {
        out.line(format!("SG count: {}", groups.len()));
        return Ok(());
    }
    for group in groups {
        display_group(group, disp, &mut out);
    }
    Ok(())
}

fn display_group(group: &SecurityGroup, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = group.group_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            let mut line = format!("{:<12} {:<20}", id, group.group_name().unwrap_or("-"));
            for (target, principals) in access_map(group) {
                let ports = match (target.1, target.2) {
                    (Some(f), Some(t)) if f == t => f.to_string(),
                    (Some(f), Some(t)) => format!("{f}-{t}"),
                    _ => "-".to_string(),
                };
                let principals: Vec<String> = principals.into_iter().collect();
                line.push_str(&format!(" {}:{}:{}", target.0, ports, principals.join(",")));
            }
            out.line(line);
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "Name", group.group_name().unwrap_or("-")));
            out.line(format!(
                "{:>15} : {}",
                "Description",
                group.description().unwrap_or("-")
            ));
            out.line(format!("{:>15} : {}", "Owner", group.owner_id().unwrap_or("-")));
            for (target, principals) in access_map(group) {
                let principals: Vec<String> = principals.into_iter().collect();
                out.line(format!(
                    "{:>15} : {:<22} from {}",
                    "In-rule",
                    PortSpec::describe(&target.0, target.1, target.2),
                    principals.join(","),
                ));
            }
            if disp.show_tags {
                display_tags(out, group.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, group.tags());
            }
        }
    }
}

/// Turn a comma-separated list of CIDRs and bare IPs into CIDRs (bare
/// addresses become /32).
fn parse_subnet_spec(spec: Option<&str>) -> Vec<String> {
    let Some(spec) = spec else {
        return Vec::new();
    };
    spec.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains('/') {
                s.to_string()
            } else {
                format!("{s}/32")
            }
        })
        .collect()
}

fn build_permission(
    proto: &str,
    range: (i32, i32),
    cidrs: &[String],
    principal_sg: Option<&str>,
) -> IpPermission {
    let mut builder = IpPermission::builder()
        .ip_protocol(proto)
        .from_port(range.0)
        .to_port(range.1);
    for cidr in cidrs {
        builder = builder.ip_ranges(IpRange::builder().cidr_ip(cidr).build());
    }
    if let Some(sg) = principal_sg {
        builder = builder.user_id_group_pairs(UserIdGroupPair::builder().group_id(sg).build());
    }
    builder.build()
}

async fn change_access(
    session: &mut Session,
    region: Option<&str>,
    args: &SgArgs,
) -> Result<(), CmdError> {
    let [sg_id] = args.args.as_slice() else {
        return Err(CmdError::input("expecting a single sg-id"));
    };
    let Some(port_spec) = &args.port_spec else {
        return Err(CmdError::input("No port specified"));
    };
    // Allow revoke to name anything so stale rules can be cleaned up.
    let port_spec = PortSpec::parse(port_spec, !args.authorize)?;
    let cidrs = parse_subnet_spec(args.subnet_spec.as_deref());
    let principal_sg = args.principal_sg.as_deref();

    let ec2 = session.ec2(region).await?;
    if args.authorize {
        if cidrs.is_empty() && principal_sg.is_none() {
            return Err(CmdError::input(
                "You need to specify either a CIDR/IP or another security group",
            ));
        }
        for range in &port_spec.ranges {
            tracing::info!("authorizing {} {} on {sg_id}", port_spec.proto, port_range_str(*range));
            ec2.authorize_security_group_ingress()
                .group_id(sg_id)
                .ip_permissions(build_permission(&port_spec.proto, *range, &cidrs, principal_sg))
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
    } else if !cidrs.is_empty() || principal_sg.is_some() {
        for range in &port_spec.ranges {
            tracing::info!("revoking {} {} on {sg_id}", port_spec.proto, port_range_str(*range));
            ec2.revoke_security_group_ingress()
                .group_id(sg_id)
                .ip_permissions(build_permission(&port_spec.proto, *range, &cidrs, principal_sg))
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
    } else {
        revoke_all(session, region, sg_id, &port_spec).await?;
    }
    Ok(())
}

/// Revoke a proto/port-range rule for every principal it currently
/// grants. Rules are matched case-insensitively by protocol and, when
/// the spec names ports, by range.
async fn revoke_all(
    session: &mut Session,
    region: Option<&str>,
    sg_id: &str,
    port_spec: &PortSpec,
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .describe_security_groups()
        .group_ids(sg_id)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    let Some(group) = output.security_groups().first() else {
        return Err(CmdError::input(format!("Unknown security group: {sg_id}")));
    };

    let mut matched = false;
    for perm in group.ip_permissions() {
        let proto = perm.ip_protocol().unwrap_or("");
        if !proto.eq_ignore_ascii_case(&port_spec.proto) {
            continue;
        }
        if !port_spec.ranges.is_empty() {
            let range = (perm.from_port().unwrap_or(-1), perm.to_port().unwrap_or(-1));
            if !port_spec.ranges.contains(&range) {
                continue;
            }
        }
        matched = true;
        for range in perm.ip_ranges() {
            if let Some(cidr) = range.cidr_ip() {
                println!("Revoking access on {cidr}");
            }
        }
        for pair in perm.user_id_group_pairs() {
            if let Some(group_id) = pair.group_id() {
                println!("Revoking access on {group_id}");
            }
        }
        ec2.revoke_security_group_ingress()
            .group_id(sg_id)
            .ip_permissions(perm.clone())
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
    }
    if !matched {
        println!("The specified proto/port(s) are not in the security group rules");
    }
    Ok(())
}

async fn create_group(
    session: &mut Session,
    region: Option<&str>,
    vpc_id: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let [name, description] = args else {
        return Err(CmdError::input(
            "Expecting security-group-name and security-group-description",
        ));
    };
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.create_security_group().group_name(name).description(description);
    if let Some(vpc_id) = vpc_id {
        req = req.vpc_id(vpc_id);
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    if let Some(id) = output.group_id() {
        println!("Created {id}");
        session.cache_insert([id]);
    }
    Ok(())
}

async fn delete_groups(
    session: &mut Session,
    region: Option<&str>,
    sg_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for sg_id in sg_ids {
        ec2.delete_security_group()
            .group_id(sg_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([sg_id.as_str()]);
    }
    Ok(())
}

const HELP: &str = "
        sg [std-options] [list-options] [-v vpc] [change-options] [sg-id] ...

The options to create/delete a security group are -C/-D respectively.

    -C            : create a new security group; the expected arguments
                    are (1) the security group name, and (2) the security group
                    description
    -D            : delete an existing security group

The options to modify an existing security group are:

    -A            : authorize access
    -R            : revoke access
    -p port-spec  : port-spec in the form <proto>[:port-range-list] where
                    port-range-list is in the form port-range[,port-range]
                    and port-range is in the form port[-port]; example:
                        tcp:22,1024-2047,2049
    -g sg-id      : allow/revoke access to this security group
    -s cidr_list  : allow/revoke access to the CIDRs in this list; this is a
                    comma-separated list of CIDRs or simple IP addresses
                    (which imply a '/32' CIDR)

When revoking access, one does not need to specify the -g/-s options; if none
of these option is specified, access is revoked for all CIDRs and sg-id's
for the particular port-spec.

When creating a new security group, make sure that you use the -v option
to specify a VPC-id if you plan to use the security group for instances
running in a particular VPC.

Example:
        sg -A -p tcp:443,80 -s 0.0.0.0/0 sg-12345678
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_spec_with_ranges() {
        let spec = PortSpec::parse("tcp:22,1024-2047,2049", false).unwrap();
        assert_eq!(spec.proto, "tcp");
        let ranges: Vec<(i32, i32)> = spec.ranges.iter().copied().collect();
        assert_eq!(ranges, vec![(22, 22), (1024, 2047), (2049, 2049)]);
    }

    #[test]
    fn protocol_is_lowercased() {
        let spec = PortSpec::parse("TCP:80", false).unwrap();
        assert_eq!(spec.proto, "tcp");
    }

    #[test]
    fn icmp_without_ports_is_accepted() {
        let spec = PortSpec::parse("icmp", false).unwrap();
        assert_eq!(spec.proto, "icmp");
        assert!(spec.ranges.is_empty());
    }

    #[test]
    fn strict_mode_rejects_unknown_protocols() {
        assert!(PortSpec::parse("gre", false).is_err());
        assert!(PortSpec::parse("gre:1", false).is_err());
        // The revoke path accepts anything for cleanup.
        assert!(PortSpec::parse("gre", true).is_ok());
        assert!(PortSpec::parse("50:1", true).is_ok());
    }

    #[test]
    fn bad_port_numbers_are_rejected() {
        assert!(PortSpec::parse("tcp:http", false).is_err());
        assert!(PortSpec::parse("tcp:80-http", false).is_err());
    }

    #[test]
    fn describe_renders_each_protocol_family() {
        assert_eq!(PortSpec::describe("TCP", Some(80), Some(80)), "TCP  port 80");
        assert_eq!(
            PortSpec::describe("UDP", Some(1024), Some(2047)),
            "UDP  port 1024-2047"
        );
        assert_eq!(PortSpec::describe("ICMP", Some(8), Some(-1)), "ICMP type 8");
        assert_eq!(PortSpec::describe("ICMP", Some(-1), Some(-1)), "ICMP");
    }

    #[test]
    fn subnet_spec_appends_host_mask() {
        assert_eq!(
            parse_subnet_spec(Some("10.0.0.0/8,192.168.1.1")),
            vec!["10.0.0.0/8".to_string(), "192.168.1.1/32".to_string()]
        );
        assert!(parse_subnet_spec(None).is_empty());
    }

    #[test]
    fn port_range_strings() {
        assert_eq!(port_range_str((80, 80)), "port 80");
        assert_eq!(port_range_str((80, 90)), "port range 80-90");
    }
}
