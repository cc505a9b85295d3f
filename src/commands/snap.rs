//! The `snap` command: EBS snapshots.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_ec2::types::{OperationType, Snapshot, SnapshotAttributeName};
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

pub struct SnapCommand;

#[derive(Parser, Debug)]
#[command(name = "snap", no_binary_name = true, disable_help_flag = true)]
struct SnapArgs {
    /// select all snapshots owned by self
    #[arg(short = 'a')]
    all: bool,
    /// create a snapshot for each of the specified volumes
    #[arg(short = 'C')]
    create: bool,
    /// delete snapshot(s)
    #[arg(short = 'D')]
    delete: bool,
    /// snapshot description (with -C)
    #[arg(short = 'd')]
    description: Option<String>,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// display snapshot count
    #[arg(short = 'k')]
    count: bool,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// Name-tag regex; with -D deletes the matching snapshots
    #[arg(short = 'm')]
    match_pattern: Option<String>,
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
    /// share a snapshot
    #[arg(short = 'S')]
    share: bool,
    /// display the snapshot size
    #[arg(short = 's')]
    size: bool,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// unshare a snapshot
    #[arg(short = 'U')]
    unshare: bool,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    /// only snapshots with this status
    #[arg(short = 'z')]
    status: Option<String>,
    args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SnapSort {
    Size,
    Time,
    Status,
}

const SORT_TABLE: &[(&str, SnapSort)] = &[
    ("size", SnapSort::Size),
    ("time", SnapSort::Time),
    ("status", SnapSort::Status),
];

fn sort_value(snap: &Snapshot, key: SnapSort) -> SortValue {
    match key {
        SnapSort::Size => SortValue::Int(i64::from(snap.volume_size().unwrap_or(0))),
        SnapSort::Time => SortValue::Int(snap.start_time().map(|t| t.secs()).unwrap_or(0)),
        SnapSort::Status => SortValue::Text(
            snap.state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
        ),
    }
}

#[async_trait]
impl Command for SnapCommand {
    fn name(&self) -> &'static str {
        "snap"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: SnapArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
        }
        if let Some(pattern) = &args.match_pattern {
            selector.set_match_pattern(pattern)?;
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

        if args.create {
            create_snapshots(session, region, args.description.as_deref(), &args.args).await
        } else if args.delete {
            selector.resource_ids = args.args.clone();
            delete_snapshots(session, region, &selector).await
        } else if args.share || args.unshare {
            share_snapshots(session, region, args.share, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_snapshots(session, region, &selector, &disp, &order).await
        }
    }
}

async fn query_snapshots(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
) -> Result<Vec<Snapshot>, CmdError> {
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_snapshots().owner_ids("self");
    if let Some(ids) = selector.ids() {
        req = req.set_snapshot_ids(Some(ids));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.snapshots().to_vec())
}

async fn list_snapshots(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
    order: &[(SnapSort, bool)],
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let snapshots = query_snapshots(session, region, selector).await?;
    let mut snapshots: Vec<Snapshot> = selector
        .filter_resources(snapshots.into_iter(), |s| s.tags())
        .collect();

    let mut out = CommandOutput::new(disp.output_file.as_deref())?;
    if disp.show_count {
        if disp.show_size {
            let total: i64 = snapshots
                .iter()
                .map(|s| i64::from(s.volume_size().unwrap_or(0)))
                .sum();
            out.line(format!(
                "Snapshot stats: count={} size={}",
                snapshots.len(),
                total
            ));
        } else {
            out.line(format!("Snapshot count: {}", snapshots.len()));
        }
        return Ok(());
    }
    order_by(&mut snapshots, order, sort_value);
    for snap in &snapshots {
        display_snapshot(session, snap, disp, &mut out);
    }
    Ok(())
}

fn display_snapshot(
    session: &Session,
    snap: &Snapshot,
    disp: &DisplayOptions,
    out: &mut CommandOutput,
) {
    let id = snap.snapshot_id().unwrap_or("-");
    session.cache_insert([id]);
    let state = snap.state().map(|s| s.as_str()).unwrap_or("-");

    if disp.show_size {
        out.line(format!("{:<14} {:>4}", id, snap.volume_size().unwrap_or(0)));
        return;
    }
    match disp.verbosity {
        Verbosity::Long => {
            let last_field = if disp.show_name {
                tag_value(snap.tags(), "Name").unwrap_or("-").to_string()
            } else {
                snap.description().unwrap_or("").to_string()
            };
            out.line(format!(
                "{:<14} {:<10} {:>6} {:>4} '{}'",
                id,
                state,
                local_time(snap.start_time()),
                snap.volume_size().unwrap_or(0),
                last_field,
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!("{:>15} : {}", "Status", state));
            out.line(format!(
                "{:>15} : {}",
                "Progress",
                optional(snap.progress())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Description",
                optional(snap.description())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Start-time",
                local_time(snap.start_time())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Size",
                snap.volume_size().unwrap_or(0)
            ));
            out.line(format!(
                "{:>15} : {}",
                "Volume",
                optional(snap.volume_id())
            ));
            if let Some(volume_id) = snap.volume_id() {
                session.cache_insert([volume_id]);
            }
            if disp.show_tags {
                display_tags(out, snap.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, snap.tags());
            }
        }
    }
}

async fn create_snapshots(
    session: &mut Session,
    region: Option<&str>,
    description: Option<&str>,
    vol_ids: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    let multiple = vol_ids.len() > 1;
    for vol_id in vol_ids {
        let mut req = ec2.create_snapshot().volume_id(vol_id);
        if let Some(description) = description {
            req = req.description(description);
        }
        let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
        if let Some(id) = output.snapshot_id() {
            session.cache_insert([id]);
            if multiple {
                println!("{id} {vol_id}");
            } else {
                println!("{id}");
            }
        }
    }
    Ok(())
}

async fn delete_snapshots(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let snapshot_ids: Vec<String> = if selector.is_explicit() {
        selector.resource_ids.clone()
    } else {
        let snapshots = query_snapshots(session, region, selector).await?;
        selector
            .filter_resources(snapshots.iter(), |s| s.tags())
            .filter_map(|s| s.snapshot_id().map(str::to_string))
            .collect()
    };
    if snapshot_ids.is_empty() {
        return Ok(());
    }
    if !confirm_aggr("Will delete:", &snapshot_ids) {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    for snapshot_id in &snapshot_ids {
        if selector.match_pattern.is_some() {
            println!("Deleting snapshot: {snapshot_id}");
        }
        ec2.delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([snapshot_id.as_str()]);
    }
    Ok(())
}

async fn share_snapshots(
    session: &mut Session,
    region: Option<&str>,
    share: bool,
    args: &[String],
) -> Result<(), CmdError> {
    let mut snapshot_ids = Vec::new();
    let mut user_ids = Vec::new();
    for arg in args {
        if arg.starts_with("snap-") {
            snapshot_ids.push(arg.clone());
        } else {
            user_ids.push(arg.clone());
        }
    }
    if snapshot_ids.is_empty() {
        return Err(CmdError::input("No snapshot id specified"));
    }
    if user_ids.is_empty() {
        return Err(CmdError::input("No user id(s) specified"));
    }
    let operation = if share {
        OperationType::Add
    } else {
        OperationType::Remove
    };
    let ec2 = session.ec2(region).await?;
    for snapshot_id in &snapshot_ids {
        let result = ec2
            .modify_snapshot_attribute()
            .snapshot_id(snapshot_id)
            .attribute(SnapshotAttributeName::CreateVolumePermission)
            .operation_type(operation.clone())
            .set_user_ids(Some(user_ids.clone()))
            .send()
            .await;
        if let Err(err) = result {
            println!(
                "Failed to {} {}: {}",
                if share { "share" } else { "unshare" },
                snapshot_id,
                CmdError::service("EC2", err)
            );
        }
    }
    Ok(())
}

const HELP: &str = "
        snap [std-options] [list-options] [options] [args]

Options:
    -C          : create a snapshot for each of the specified volumes
    -D          : delete snapshot(s)
    -d desc     : snapshot description (when creating a snapshot)
    -k          : displays the snapshot count
    -o order    : the order consists of a comma-separated list
                  of attr_spec where the attr_spec is [~]attr. The
                  available 'attr' values are:
                        size,time,status
                  Example:
                        -o ~size,time
                  orders first by reverse size (i.e. larger first), then
                  by time
    -S          : share a snapshot
    -s          : displays the snapshot size
    -m pattern  : when used with -D, it deletes snapshots whose
                  Name tag matches the specified regular expression
    -U          : unshare a snapshot
    -z status   : show only snapshots with the specified status
                  (pending, completed, error)
";
