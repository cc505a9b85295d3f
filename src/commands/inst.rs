//! The `inst` command: EC2 instances.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_ec2::types::{Instance, InstanceAttributeName, InstanceType, ShutdownBehavior};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::Parser;

use crate::commands::{confirm, parse_argv, Command};
use crate::display::{display_tags, local_time, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::{tag_value, ResourceSelector};
use crate::session::Session;

const DEFAULT_INSTANCE_TYPE: &str = "m1.small";

pub struct InstCommand;

#[derive(Parser, Debug)]
#[command(name = "inst", no_binary_name = true, disable_help_flag = true)]
struct InstArgs {
    /// select all instances
    #[arg(short = 'a')]
    all: bool,
    /// set an instance attribute
    #[arg(short = 'A')]
    set_attribute: bool,
    /// reboot the specified instance(s)
    #[arg(short = 'B')]
    reboot: bool,
    /// instance type to launch or start
    #[arg(short = 'c')]
    instance_type: Option<String>,
    /// create an EBS-optimized instance (with -R)
    #[arg(short = 'e')]
    ebs_optimized: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// keypair name to pass to a new instance
    #[arg(short = 'K')]
    keypair: Option<String>,
    /// display instance counts grouped by state
    #[arg(short = 'k')]
    count: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// copy output to file
    #[arg(short = 'O')]
    output: Option<PathBuf>,
    /// display the Name tag (with -l)
    #[arg(short = 'n')]
    name: bool,
    /// tag filter key[=value] or =value
    #[arg(short = 'q')]
    tag_filters: Vec<String>,
    /// run (launch) a new instance
    #[arg(short = 'R')]
    run_instance: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// start the specified instance(s)
    #[arg(short = 'S')]
    start: bool,
    /// shutdown action for a new instance: stop, terminate
    #[arg(short = 's', default_value = "stop")]
    shutdown_action: String,
    /// terminate the specified instance(s)
    #[arg(short = 'T')]
    terminate: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// user-data string for a new instance
    #[arg(short = 'u')]
    user_data: Option<String>,
    /// only instances in this VPC
    #[arg(short = 'v')]
    vpc: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    /// stop the specified instance(s)
    #[arg(short = 'Z')]
    stop: bool,
    /// only instances with this state
    #[arg(short = 'z')]
    state: Option<String>,
    args: Vec<String>,
}

#[async_trait]
impl Command for InstCommand {
    fn name(&self) -> &'static str {
        "inst"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: InstArgs = parse_argv(argv)?;

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
        if let Some(state) = &args.state {
            selector.add_filter("instance-state-name", state);
        }

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }
        disp.show_tags = args.tags;
        disp.show_name = args.name;
        disp.show_count = args.count;
        disp.output_file = args.output.clone();

        let region = args.region.as_deref();

        if args.terminate {
            terminate_instances(session, region, &args.args).await
        } else if args.run_instance {
            run_instance(session, region, &args).await
        } else if args.start {
            start_instances(session, region, args.instance_type.as_deref(), &args.args).await
        } else if args.stop {
            simple_state_change(session, region, &args.args, StateChange::Stop).await
        } else if args.reboot {
            simple_state_change(session, region, &args.args, StateChange::Reboot).await
        } else if args.set_attribute {
            set_attribute(session, region, &args.args).await
        } else {
            selector.set_resource_ids(args.args.clone(), Some("i-"));
            list_instances(session, region, &selector, &disp).await
        }
    }
}

async fn list_instances(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_instances();
    if let Some(ids) = selector.ids() {
        req = req.set_instance_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let mut instances: Vec<Instance> = output
        .reservations()
        .iter()
        .flat_map(|r| r.instances().iter().cloned())
        .collect();

    let mut out = CommandOutput::new(disp.output_file.as_deref())?;
    if disp.show_count {
        instance_counts(&mut out, &instances);
        return Ok(());
    }
    if disp.verbosity == Verbosity::Long && disp.show_name {
        instances.sort_by_key(|inst| {
            tag_value(inst.tags(), "Name")
                .unwrap_or("-")
                .to_string()
        });
    }
    for instance in &instances {
        display_instance(session, instance, disp, &mut out);
    }
    Ok(())
}

fn display_instance(
    session: &Session,
    instance: &Instance,
    disp: &DisplayOptions,
    out: &mut CommandOutput,
) {
    let id = instance.instance_id().unwrap_or("-");
    let mut cached = vec![id.to_string()];
    let state = instance
        .state()
        .and_then(|s| s.name())
        .map(|n| n.as_str())
        .unwrap_or("-");
    let zone = instance
        .placement()
        .and_then(|p| p.availability_zone())
        .unwrap_or("-");
    let itype = instance
        .instance_type()
        .map(|t| t.as_str())
        .unwrap_or("-");

    match disp.verbosity {
        Verbosity::Long => {
            let last_field = if disp.show_name {
                tag_value(instance.tags(), "Name").unwrap_or("-").to_string()
            } else {
                local_time(instance.launch_time())
            };
            out.line(format!(
                "{id:<12} {state:<10} {zone:<12} {itype:<10} {last_field}"
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {:<12}", "State", state));
            out.line(format!(
                "{:>15} : {}",
                "Launch-time",
                local_time(instance.launch_time())
            ));
            out.line(format!("{:>15} : {}", "Location", zone));
            out.line(format!(
                "{:>15} : {} {} {} {}",
                "Hardware",
                itype,
                instance.architecture().map(|a| a.as_str()).unwrap_or("-"),
                instance
                    .virtualization_type()
                    .map(|v| v.as_str())
                    .unwrap_or("-"),
                instance.hypervisor().map(|h| h.as_str()).unwrap_or("-"),
            ));
            out.line(format!(
                "{:>15} : {} {} {} {}",
                "Software",
                instance.platform().map(|p| p.as_str()).unwrap_or("-"),
                optional(instance.image_id()),
                optional(instance.kernel_id()),
                optional(instance.ramdisk_id()),
            ));
            if let Some(image) = instance.image_id() {
                cached.push(image.to_string());
            }
            if let Some(kernel) = instance.kernel_id() {
                cached.push(kernel.to_string());
            }
            if let Some(ramdisk) = instance.ramdisk_id() {
                cached.push(ramdisk.to_string());
            }
            out.line(format!(
                "{:>15} : {:<12} {}",
                "Root",
                optional(instance.root_device_name()),
                instance
                    .root_device_type()
                    .map(|t| t.as_str())
                    .unwrap_or("-"),
            ));
            out.line(format!(
                "{:>15} : {}",
                "EBS-optimized",
                instance.ebs_optimized().unwrap_or(false)
            ));
            if let Some(vpc) = instance.vpc_id() {
                out.line(format!(
                    "{:>15} : {:<14} {:<16}",
                    "VPC-info",
                    vpc,
                    optional(instance.subnet_id())
                ));
                cached.push(vpc.to_string());
                if let Some(subnet) = instance.subnet_id() {
                    cached.push(subnet.to_string());
                }
            }
            if let Some(private_ip) = instance.private_ip_address() {
                out.line(format!(
                    "{:>15} : {} {}",
                    "IP",
                    optional(instance.public_ip_address()),
                    private_ip
                ));
            }
            for netif in instance.network_interfaces() {
                let eni_id = netif.network_interface_id().unwrap_or("-");
                out.line(format!(
                    "{:>15} : {:<15} idx={:<2} {:<16} SDC={}",
                    "Interface",
                    eni_id,
                    netif
                        .attachment()
                        .and_then(|a| a.device_index())
                        .unwrap_or(-1),
                    optional(netif.private_ip_address()),
                    if netif.source_dest_check().unwrap_or(false) {
                        "on"
                    } else {
                        "off"
                    },
                ));
                cached.push(eni_id.to_string());
            }
            if !instance.security_groups().is_empty() {
                let group_ids: Vec<&str> = instance
                    .security_groups()
                    .iter()
                    .filter_map(|g| g.group_id())
                    .collect();
                out.line(format!("{:>15} : {}", "Groups", group_ids.join(" ")));
                cached.extend(group_ids.iter().map(|g| g.to_string()));
            }
            let mut bdevs: Vec<_> = instance.block_device_mappings().iter().collect();
            bdevs.sort_by_key(|b| b.device_name().unwrap_or(""));
            for bdev in bdevs {
                let ebs = bdev.ebs();
                let volume_id = ebs.and_then(|e| e.volume_id()).unwrap_or("-");
                out.line(format!(
                    "{:>15} : {:<12} {:<12} {} dot={}",
                    "Device",
                    optional(bdev.device_name()),
                    volume_id,
                    ebs.and_then(|e| e.status()).map(|s| s.as_str()).unwrap_or("-"),
                    ebs.and_then(|e| e.delete_on_termination()).unwrap_or(false),
                ));
                cached.push(volume_id.to_string());
            }
            if disp.show_tags {
                display_tags(out, instance.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, instance.tags());
            }
        }
    }
    session.cache_insert(cached);
}

fn instance_counts(out: &mut CommandOutput, instances: &[Instance]) {
    out.line(format!("Instance count: {}", instances.len()));
    let mut by_state: BTreeMap<&str, usize> = BTreeMap::new();
    for known in ["running", "stopped", "terminated", "other"] {
        by_state.insert(known, 0);
    }
    for instance in instances {
        let state = instance
            .state()
            .and_then(|s| s.name())
            .map(|n| n.as_str())
            .unwrap_or("other");
        let state = if by_state.contains_key(state) {
            state
        } else {
            "other"
        };
        *by_state.entry(state).or_default() += 1;
    }
    for (state, count) in by_state {
        out.line(format!("    {state:>12} : {count:>4}"));
    }
}

async fn terminate_instances(
    session: &mut Session,
    region: Option<&str>,
    instance_ids: &[String],
) -> Result<(), CmdError> {
    if instance_ids.is_empty() {
        return Ok(());
    }
    if !confirm(None) {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .terminate_instances()
        .set_instance_ids(Some(instance_ids.to_vec()))
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    let terminated: Vec<&str> = output
        .terminating_instances()
        .iter()
        .filter_map(|i| i.instance_id())
        .collect();
    let missed: Vec<&str> = instance_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !terminated.contains(id))
        .collect();
    if !missed.is_empty() {
        println!("Instances not terminated: {}", missed.join(", "));
    }
    session.cache_remove(terminated);
    Ok(())
}

async fn run_instance(
    session: &mut Session,
    region: Option<&str>,
    args: &InstArgs,
) -> Result<(), CmdError> {
    // All launch inputs are self-describing ids, so they may appear in
    // any order: ami-id, subnet-id, security group id(s).
    let mut subnet_id = None;
    let mut ami_id = None;
    let mut sg_ids = Vec::new();
    for arg in &args.args {
        if arg.contains(',') {
            for sg in arg.split(',') {
                if sg.starts_with("sg-") {
                    sg_ids.push(sg.to_string());
                } else {
                    return Err(CmdError::input(format!("Bad security group id: {sg}")));
                }
            }
        } else if let Some((res_type, _)) = arg.split_once('-') {
            match res_type {
                "ami" => ami_id = Some(arg.clone()),
                "subnet" => subnet_id = Some(arg.clone()),
                "sg" => sg_ids.push(arg.clone()),
                _ => return Err(CmdError::input(format!("Unexpected argument: {arg}"))),
            }
        } else {
            return Err(CmdError::input(format!("Unexpected argument: {arg}")));
        }
    }
    let ami_id = ami_id.ok_or_else(|| CmdError::input("Missing ami-id"))?;
    let subnet_id = subnet_id.ok_or_else(|| CmdError::input("Missing subnet-id"))?;
    if sg_ids.is_empty() {
        return Err(CmdError::input("Missing security group(s)"));
    }

    let instance_type = args
        .instance_type
        .clone()
        .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string());

    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .run_instances()
        .image_id(&ami_id)
        .instance_type(InstanceType::from(instance_type.as_str()))
        .subnet_id(&subnet_id)
        .set_security_group_ids(Some(sg_ids))
        .min_count(1)
        .max_count(1)
        .ebs_optimized(args.ebs_optimized);
    if let Some(keypair) = &args.keypair {
        req = req.key_name(keypair);
    }
    if let Some(user_data) = &args.user_data {
        req = req.user_data(BASE64.encode(user_data));
    }
    if !args.shutdown_action.is_empty() {
        req = req.instance_initiated_shutdown_behavior(ShutdownBehavior::from(
            args.shutdown_action.as_str(),
        ));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    if let Some(instance) = output.instances().first() {
        if let Some(id) = instance.instance_id() {
            session.cache_insert([id]);
            println!("{id}");
        }
    }
    Ok(())
}

async fn start_instances(
    session: &mut Session,
    region: Option<&str>,
    instance_type: Option<&str>,
    instance_ids: &[String],
) -> Result<(), CmdError> {
    if instance_ids.is_empty() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    if let Some(instance_type) = instance_type {
        for instance_id in instance_ids {
            ec2.modify_instance_attribute()
                .instance_id(instance_id)
                .attribute(InstanceAttributeName::InstanceType)
                .value(instance_type)
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
    }
    ec2.start_instances()
        .set_instance_ids(Some(instance_ids.to_vec()))
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

enum StateChange {
    Stop,
    Reboot,
}

async fn simple_state_change(
    session: &mut Session,
    region: Option<&str>,
    instance_ids: &[String],
    change: StateChange,
) -> Result<(), CmdError> {
    if instance_ids.is_empty() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let ids = Some(instance_ids.to_vec());
    match change {
        StateChange::Stop => {
            ec2.stop_instances()
                .set_instance_ids(ids)
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
        StateChange::Reboot => {
            ec2.reboot_instances()
                .set_instance_ids(ids)
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
    }
    Ok(())
}

async fn set_attribute(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let [instance_id, attr, value] = args else {
        return Err(CmdError::input(
            "Expecting instance-id, attribute, value\n\
             Valid attributes:\n\
             \x20  instanceType, kernel, ramdisk, userData, disableApiTermination,\n\
             \x20  instanceInitiatedShutdownBehavior, rootDeviceName, blockDeviceMapping,\n\
             \x20  productCodes, sourceDestCheck, groupSet, ebsOptimized, sriovNetSupport",
        ));
    };
    let ec2 = session.ec2(region).await?;
    ec2.modify_instance_attribute()
        .instance_id(instance_id)
        .attribute(InstanceAttributeName::from(attr.as_str()))
        .value(value)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

const HELP: &str = "
        inst [std-options] [list-options] [-n] [-e] [-v vpc_id] [-T] [args] ...

Options:
    -A          : set instance attribute
    -B          : reboot the specified instance(s)
    -c type     : instance type (class) to launch or start; the default
                  is m1.small
    -e          : create an EBS-optimized instance (when used with -R)
    -k          : display instance counts; the instances are grouped by
                  state (running, stopped, etc.)
    -K key-name : name of keypair to pass to new instance
    -n          : display the Name tag of the instance (when used with -l)
    -R          : run (launch) a new instance
    -S          : start the specified instance(s)
    -s action   : specify the shutdown action when launching a new instance;
                  values include: 'stop', 'terminate', ''
    -T          : terminate the specified instance(s)
    -u userdata : user-data string to be passed to new instance
    -v vpc_id   : list all the instances running in the specified VPC
    -z status   : display only instances with this status
    -Z          : stop the specified instance(s)

The command arguments when -R is not specified are instance-ids.

The arguments in the case of the -R option should include the ami-id,
subnet-id and security-group-id(s); the security-group-ids can be specified
as multiple arguments or as a comma-separated list (or both). The arguments
can be specified in any order.
";
