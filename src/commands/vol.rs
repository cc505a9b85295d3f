//! The `vol` command: EBS volumes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_ec2::types::{Volume, VolumeType};
use clap::Parser;

use crate::commands::{confirm_aggr, parse_argv, Command};
use crate::display::{
    display_tags, local_time, optional, order_by, parse_order_spec, DisplayOptions, SortValue,
    Verbosity,
};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::{tag_value, ResourceSelector};
use crate::session::Session;

pub struct VolCommand;

#[derive(Parser, Debug)]
#[command(name = "vol", no_binary_name = true, disable_help_flag = true)]
struct VolArgs {
    /// select all volumes
    #[arg(short = 'a')]
    all: bool,
    /// create a volume
    #[arg(short = 'C')]
    create: bool,
    /// volume type: standard, gp2, or io1:<iops>
    #[arg(short = 'c')]
    vol_type: Option<String>,
    /// delete volume(s)
    #[arg(short = 'D')]
    delete: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// show the volumes of the specified instance
    #[arg(short = 'i')]
    instance: Option<String>,
    /// display volume count
    #[arg(short = 'k')]
    count: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// move a volume between instances
    #[arg(short = 'M')]
    move_volume: bool,
    /// display the Name tag
    #[arg(short = 'n')]
    name: bool,
    /// copy output to file
    #[arg(short = 'O')]
    output: Option<PathBuf>,
    /// sort order, e.g. ~size,time
    #[arg(short = 'o')]
    order: Option<String>,
    /// tag filter key[=value] or =value
    #[arg(short = 'q')]
    tag_filters: Vec<String>,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// attach the specified volume
    #[arg(short = 'S')]
    attach: bool,
    /// display the volume size
    #[arg(short = 's')]
    size: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// detach the specified volumes
    #[arg(short = 'X')]
    detach: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    /// only volumes with this status
    #[arg(short = 'z')]
    status: Option<String>,
    args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum VolSort {
    Size,
    Time,
    Status,
}

const SORT_TABLE: &[(&str, VolSort)] = &[
    ("size", VolSort::Size),
    ("time", VolSort::Time),
    ("status", VolSort::Status),
];

fn sort_value(vol: &Volume, key: VolSort) -> SortValue {
    match key {
        VolSort::Size => SortValue::Int(i64::from(vol.size().unwrap_or(0))),
        VolSort::Time => SortValue::Int(vol.create_time().map(|t| t.secs()).unwrap_or(0)),
        VolSort::Status => SortValue::Text(
            vol.state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
        ),
    }
}

#[async_trait]
impl Command for VolCommand {
    fn name(&self) -> &'static str {
        "vol"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: VolArgs = parse_argv(argv)?;

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
        if let Some(status) = &args.status {
            selector.add_filter("status", status);
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
        disp.show_size = args.size;
        disp.show_count = args.count;
        disp.output_file = args.output.clone();

        let order = match &args.order {
            Some(spec) => parse_order_spec(spec, SORT_TABLE)?,
            None => Vec::new(),
        };
        let region = args.region.as_deref();

        if args.detach {
            detach_volumes(session, region, args.instance.as_deref(), &args.args, &selector).await
        } else if args.attach {
            attach_volume(session, region, &args.args).await
        } else if args.create {
            create_volume(session, region, args.vol_type.as_deref(), args.args.clone()).await
        } else if args.delete {
            selector.resource_ids = args.args.clone();
            delete_volumes(session, region, &selector).await
        } else if args.move_volume {
            move_volume(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_volumes(session, region, &selector, &disp, &order).await
        }
    }
}

async fn query_volumes(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
) -> Result<Vec<Volume>, CmdError> {
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_volumes();
    if let Some(ids) = selector.ids() {
        req = req.set_volume_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.volumes().to_vec())
}

async fn list_volumes(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
    order: &[(VolSort, bool)],
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let mut volumes = query_volumes(session, region, selector).await?;
    let mut out = CommandOutput::new(disp.output_file.as_deref())?;
    if disp.show_count {
        volume_counts(&mut out, &volumes, disp);
    } else {
        order_by(&mut volumes, order, sort_value);
        for vol in &volumes {
            display_volume(session, vol, disp, &mut out);
        }
    }
    Ok(())
}

fn display_volume(session: &Session, vol: &Volume, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = vol.volume_id().unwrap_or("-");
    session.cache_insert([id]);
    let state = vol.state().map(|s| s.as_str()).unwrap_or("-");

    if disp.show_size {
        out.line(format!("{:<14} {:>4}", id, vol.size().unwrap_or(0)));
        return;
    }
    match disp.verbosity {
        Verbosity::Long => {
            out.write(format!(
                "{:<14} {:<10} {:<12} {:>4} {:<14}",
                id,
                state,
                optional(vol.availability_zone()),
                vol.size().unwrap_or(0),
                optional(vol.snapshot_id()),
            ));
            if let Some(snap) = vol.snapshot_id() {
                session.cache_insert([snap]);
            }
            let attach_str = vol
                .attachments()
                .first()
                .and_then(|att| {
                    att.instance_id()
                        .map(|i| format!("{}:{}", i, att.device().unwrap_or("-")))
                })
                .unwrap_or_else(|| "-".to_string());
            out.write(format!(" {attach_str:<22}"));
            if disp.show_name {
                if let Some(name) = tag_value(vol.tags(), "Name") {
                    out.write(format!(" {name}"));
                }
            }
            out.line("");
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "Status", state));
            out.line(format!("{:>15} : {}", "Size", vol.size().unwrap_or(0)));
            out.line(format!(
                "{:>15} : {}",
                "Creation-time",
                local_time(vol.create_time())
            ));
            if let Some(snap) = vol.snapshot_id() {
                if !snap.is_empty() {
                    out.line(format!("{:>15} : {}", "Snapshot", snap));
                    session.cache_insert([snap]);
                }
            }
            out.line(format!(
                "{:>15} : {}",
                "Zone",
                optional(vol.availability_zone())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Type",
                vol.volume_type().map(|t| t.as_str()).unwrap_or("-")
            ));
            if let Some(iops) = vol.iops() {
                out.line(format!("{:>15} : {}", "IOPS", iops));
            }
            if let Some(att) = vol.attachments().first() {
                if let Some(instance) = att.instance_id() {
                    out.line(format!("{:>15} : {}", "Instance-id", instance));
                }
                if let Some(device) = att.device() {
                    out.line(format!("{:>15} : {}", "Device", device));
                }
                if let Some(state) = att.state() {
                    out.line(format!("{:>15} : {}", "Attach-status", state.as_str()));
                }
                if att.attach_time().is_some() {
                    out.line(format!(
                        "{:>15} : {}",
                        "Attach-time",
                        local_time(att.attach_time())
                    ));
                }
            }
            if disp.show_tags {
                display_tags(out, vol.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, vol.tags());
            }
        }
    }
}

fn volume_counts(out: &mut CommandOutput, volumes: &[Volume], disp: &DisplayOptions) {
    // Key: volume-status, Value: volumes in that status
    let mut by_status: BTreeMap<&str, Vec<&Volume>> = BTreeMap::new();
    for vol in volumes {
        by_status
            .entry(vol.state().map(|s| s.as_str()).unwrap_or("-"))
            .or_default()
            .push(vol);
    }
    let total_size: i64 = volumes
        .iter()
        .map(|v| i64::from(v.size().unwrap_or(0)))
        .sum();
    if disp.show_size {
        out.line(format!(
            "Volume count: {} size={}",
            volumes.len(),
            total_size
        ));
    } else {
        out.line(format!("Volume count: {}", volumes.len()));
    }
    for (status, vols) in &by_status {
        if disp.show_size {
            let size: i64 = vols.iter().map(|v| i64::from(v.size().unwrap_or(0))).sum();
            out.line(format!("{:>20} : {} size={}", status, vols.len(), size));
        } else {
            out.line(format!("{:>20} : {}", status, vols.len()));
        }
    }

    // In-use volumes grouped by instance, largest consumers first.
    let mut by_instance: BTreeMap<&str, usize> = BTreeMap::new();
    let mut unaccounted = 0usize;
    for vol in by_status.get("in-use").map(Vec::as_slice).unwrap_or(&[]) {
        match vol.attachments().first().and_then(|a| a.instance_id()) {
            Some(instance) => *by_instance.entry(instance).or_default() += 1,
            None => unaccounted += 1,
        }
    }
    out.line("Volumes by instance");
    let mut counts: Vec<(usize, &str)> = by_instance.into_iter().map(|(i, n)| (n, i)).collect();
    counts.sort();
    counts.reverse();
    for (n, instance) in counts {
        out.line(format!("{instance:>20} : {n}"));
    }
    if unaccounted > 0 {
        out.line(format!("{:>20} : {}", "Unaccounted", unaccounted));
    }
}

fn parse_volume_type(spec: &str) -> Result<(String, Option<i32>), CmdError> {
    if matches!(spec, "standard" | "gp2" | "io1") {
        return Ok((spec.to_string(), None));
    }
    if let Some(iops_str) = spec.strip_prefix("io1:") {
        let iops = iops_str
            .parse::<i32>()
            .map_err(|_| CmdError::input(format!("Bad volume type: {spec}")))?;
        return Ok(("io1".to_string(), Some(iops)));
    }
    Err(CmdError::input(format!("Bad volume type: {spec}")))
}

async fn create_volume(
    session: &mut Session,
    region: Option<&str>,
    vol_type: Option<&str>,
    mut args: Vec<String>,
) -> Result<(), CmdError> {
    if args.len() != 2 && args.len() != 3 {
        return Err(CmdError::input(
            "Expected arguments: zone [snapshot-id] [size]",
        ));
    }
    let zone = args.remove(0);
    if !session.is_valid_zone(region, &zone).await? {
        let valid = session.zone_names(region).await?;
        return Err(CmdError::input(format!(
            "Bad zone: {zone}\nValid zones are: {}",
            valid.join(", ")
        )));
    }
    let (vol_type, iops) = parse_volume_type(vol_type.unwrap_or("gp2"))?;

    let mut size = None;
    let mut snapshot = None;
    for arg in &args {
        if arg.starts_with("snap-") {
            snapshot = Some(arg.clone());
        } else {
            size = Some(
                arg.parse::<i32>()
                    .map_err(|_| CmdError::input(format!("Bad argument: {arg}")))?,
            );
        }
    }

    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .create_volume()
        .availability_zone(&zone)
        .volume_type(VolumeType::from(vol_type.as_str()));
    if let Some(size) = size {
        req = req.size(size);
    }
    if let Some(snapshot) = &snapshot {
        req = req.snapshot_id(snapshot);
    }
    if let Some(iops) = iops {
        req = req.iops(iops);
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    if let Some(id) = output.volume_id() {
        session.cache_insert([id]);
        println!("{id}");
    }
    Ok(())
}

async fn delete_volumes(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let vol_ids: Vec<String> = if selector.is_explicit() {
        selector.resource_ids.clone()
    } else {
        let volumes = query_volumes(session, region, selector).await?;
        selector
            .filter_resources(volumes.iter(), |v| v.tags())
            .filter_map(|v| v.volume_id().map(str::to_string))
            .collect()
    };
    if vol_ids.is_empty() {
        return Ok(());
    }
    if !confirm_aggr("Will delete:", &vol_ids) {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    for vol_id in &vol_ids {
        ec2.delete_volume()
            .volume_id(vol_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([vol_id.as_str()]);
    }
    Ok(())
}

async fn detach_volumes(
    session: &mut Session,
    region: Option<&str>,
    instance: Option<&str>,
    args: &[String],
    selector: &ResourceSelector,
) -> Result<(), CmdError> {
    let mut instance_id = instance.map(str::to_string);
    let mut vol_ids = Vec::new();
    for arg in args {
        if arg.starts_with("i-") {
            instance_id = Some(arg.clone());
        } else if arg.starts_with("vol-") {
            vol_ids.push(arg.clone());
        }
    }
    if vol_ids.is_empty() {
        // No explicit volumes: detach whatever the filters select.
        let volumes = query_volumes(session, region, selector).await?;
        vol_ids = selector
            .filter_resources(volumes.iter(), |v| v.tags())
            .filter_map(|v| v.volume_id().map(str::to_string))
            .collect();
        if vol_ids.is_empty() {
            return Ok(());
        }
    }
    if !confirm_aggr("Will detach:", &vol_ids) {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    for vol_id in &vol_ids {
        ec2.detach_volume()
            .volume_id(vol_id)
            .set_instance_id(instance_id.clone())
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
    }
    Ok(())
}

/// Pull instance-id, device path, and volume-id out of free-order args.
fn attach_args(args: &[String]) -> Result<(String, String, String), CmdError> {
    let mut device = None;
    let mut instance = None;
    let mut volume = None;
    for arg in args {
        if arg.starts_with("vol-") {
            volume = Some(arg.clone());
        } else if arg.starts_with("i-") {
            instance = Some(arg.clone());
        } else {
            device = Some(arg.clone());
        }
    }
    let device = device.ok_or_else(|| CmdError::input("No device path specified"))?;
    let instance = instance.ok_or_else(|| CmdError::input("No instance-id specified"))?;
    let volume = volume.ok_or_else(|| CmdError::input("No volume-id specified"))?;
    Ok((volume, instance, device))
}

async fn attach_volume(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let (volume, instance, device) = attach_args(args)?;
    let ec2 = session.ec2(region).await?;
    ec2.attach_volume()
        .volume_id(volume)
        .instance_id(instance)
        .device(device)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

async fn move_volume(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let (volume_id, instance_id, device) = attach_args(args)?;
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .describe_volumes()
        .volume_ids(&volume_id)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    let Some(vol) = output.volumes().first() else {
        return Err(CmdError::input(format!("Unknown volume: {volume_id}")));
    };

    let attached_to = vol.attachments().first().and_then(|a| a.instance_id());
    if let Some(current) = attached_to {
        if current == instance_id {
            println!(
                "Volume {} already attached to instance {} at {}",
                volume_id,
                instance_id,
                vol.attachments()
                    .first()
                    .and_then(|a| a.device())
                    .unwrap_or("-")
            );
            return Ok(());
        }
        println!("Detaching volume {volume_id} from instance {current}");
        ec2.detach_volume()
            .volume_id(&volume_id)
            .instance_id(current)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        // Wait for the volume to come free before re-attaching.
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let state = ec2
                .describe_volumes()
                .volume_ids(&volume_id)
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?
                .volumes()
                .first()
                .and_then(|v| v.state().cloned());
            if state == Some(aws_sdk_ec2::types::VolumeState::Available) {
                break;
            }
        }
    }
    ec2.attach_volume()
        .volume_id(&volume_id)
        .instance_id(&instance_id)
        .device(&device)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    Ok(())
}

const HELP: &str = "
        vol [std-options] [list-options] [-s] [-X] [-i instance-id] [args]

Options:
    -C             : create a volume
    -c <voltype>   : type of volume; one of
                        'standard' ==> magnetic disk
                        'gp2' ==> SSD
                        'io1:<num>' ==> SSD w/ <num> IOPS
    -D             : delete volume(s)
    -i instance-id : show all the volumes of the specified instance
    -k             : display volume count
    -M             : move a volume between instances
    -o order_list  : the order_list consists of a comma-separated list
                     of attr_spec where the attr_spec is [~]attr. The
                     available 'attr' values are:
                        size,time,status
                     Example:
                        -o ~size,time
                     orders first by reverse size (i.e. larger first), then
                     by time
    -X             : detach the specified volumes
    -S             : attach the specified volume
    -s             : display the volume size
    -z status      : display only volumes with the specified status
                     (creating, available, in-use, deleting, deleted, error)

When creating a volume the expected arguments are the zone followed by a
snapshot-id and/or a volume size (number in GB):
        vol -C us-east-1a 100
When attaching or moving a volume the expected arguments are an
instance-id, a device path, and a volume-id, in any order:
        vol -S i-12345678 vol-abcd1234 /dev/sdf1
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_type_accepts_plain_and_provisioned_iops() {
        assert_eq!(
            parse_volume_type("gp2").unwrap(),
            ("gp2".to_string(), None)
        );
        assert_eq!(
            parse_volume_type("io1:500").unwrap(),
            ("io1".to_string(), Some(500))
        );
        assert!(parse_volume_type("io1:lots").is_err());
        assert!(parse_volume_type("fancy-ssd").is_err());
    }

    #[test]
    fn attach_args_accept_any_order() {
        let args = vec![
            "/dev/sdf1".to_string(),
            "vol-abcd1234".to_string(),
            "i-12345678".to_string(),
        ];
        let (vol, inst, dev) = attach_args(&args).unwrap();
        assert_eq!(vol, "vol-abcd1234");
        assert_eq!(inst, "i-12345678");
        assert_eq!(dev, "/dev/sdf1");

        assert!(attach_args(&["vol-1".to_string(), "i-2".to_string()]).is_err());
    }

    #[test]
    fn order_spec_uses_the_volume_table() {
        let specs = parse_order_spec("~size,status", SORT_TABLE).unwrap();
        assert_eq!(specs[0], (VolSort::Size, true));
        assert_eq!(specs[1], (VolSort::Status, false));
        assert!(parse_order_spec("zone", SORT_TABLE).is_err());
    }
}
