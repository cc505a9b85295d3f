//! The `ami` command: machine images.

use async_trait::async_trait;
use aws_sdk_ec2::types::{ArchitectureValues, BlockDeviceMapping, EbsBlockDevice, Image};
use clap::Parser;

use crate::commands::{confirm_aggr, parse_argv, Command};
use crate::display::{display_tags, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

const VALID_ARCH: &[&str] = &["i386", "x86_64"];

pub struct AmiCommand;

#[derive(Parser, Debug)]
#[command(name = "ami", no_binary_name = true, disable_help_flag = true)]
struct AmiArgs {
    /// select all images owned by self
    #[arg(short = 'a')]
    all: bool,
    /// create (register) a new AMI
    #[arg(short = 'C')]
    create: bool,
    /// image description (with -C)
    #[arg(short = 'd')]
    description: Option<String>,
    /// deregister image(s)
    #[arg(short = 'D')]
    delete: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// display the image name (with -l)
    #[arg(short = 'n')]
    name: bool,
    /// tag filter key[=value] or =value
    #[arg(short = 'q')]
    tag_filters: Vec<String>,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// list tags
    #[arg(short = 't')]
    tags: bool,
    /// list images owned by this owner (self, amazon, aws-marketplace)
    #[arg(short = 'U')]
    owners: Vec<String>,
    /// virtualization type (with -C): hvm or pv/paravirtual
    #[arg(short = 'v')]
    virt_type: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for AmiCommand {
    fn name(&self) -> &'static str {
        "ami"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: AmiArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        for spec in &args.tag_filters {
            selector.add_tag_filter_spec(spec);
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

        let region = args.region.as_deref();

        if args.delete {
            selector.resource_ids = args.args.clone();
            delete_images(session, region, &selector).await
        } else if args.create {
            create_image(session, region, &args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_images(session, region, &selector, &disp, &args.owners).await
        }
    }
}

async fn query_images(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    owners: Option<Vec<String>>,
) -> Result<Vec<Image>, CmdError> {
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_images();
    if let Some(ids) = selector.ids() {
        req = req.set_image_ids(Some(ids));
    }
    if let Some(owners) = owners {
        req = req.set_owners(Some(owners));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.images().to_vec())
}

async fn list_images(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
    owners: &[String],
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    // Explicit ids look up any owner; otherwise default to self so the
    // listing is not the entire public catalog.
    let owners = if selector.is_explicit() {
        None
    } else if owners.is_empty() {
        Some(vec!["self".to_string()])
    } else {
        Some(owners.to_vec())
    };
    let mut images = query_images(session, region, selector, owners).await?;
    session.cache_insert(images.iter().filter_map(|i| i.image_id()));

    if disp.verbosity == Verbosity::Long && disp.show_name {
        images.sort_by_key(|image| image.name().unwrap_or("").to_string());
    }
    let mut out = CommandOutput::new(disp.output_file.as_deref())?;
    for image in &images {
        display_image(image, disp, &mut out);
    }
    Ok(())
}

fn display_image(image: &Image, disp: &DisplayOptions, out: &mut CommandOutput) {
    let id = image.image_id().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            let last_field = if disp.show_name {
                image.name().unwrap_or("")
            } else {
                ""
            };
            out.line(format!(
                "{:<14} {:<10} {:<14} {:<5} {}",
                id,
                image.architecture().map(|a| a.as_str()).unwrap_or("-"),
                optional(image.kernel_id()),
                image
                    .virtualization_type()
                    .map(|v| v.as_str())
                    .unwrap_or("-"),
                last_field,
            ));
        }
        Verbosity::Extended => {
            out.line(id);
            out.line(format!(
                "{:>15} : {:<12}",
                "State",
                image.state().map(|s| s.as_str()).unwrap_or("-")
            ));
            out.line(format!(
                "{:>15} : {}",
                "Location",
                optional(image.image_location())
            ));
            out.line(format!("{:>15} : {}", "Name", optional(image.name())));
            out.line(format!(
                "{:>15} : {}",
                "Public",
                image.public().unwrap_or(false)
            ));
            out.line(format!("{:>15} : {}", "Owner", optional(image.owner_id())));
            out.line(format!(
                "{:>15} : {}",
                "Description",
                optional(image.description())
            ));
            out.line(format!(
                "{:>15} : {} {} {}",
                "Hardware",
                image.architecture().map(|a| a.as_str()).unwrap_or("-"),
                image
                    .virtualization_type()
                    .map(|v| v.as_str())
                    .unwrap_or("-"),
                image.hypervisor().map(|h| h.as_str()).unwrap_or("-"),
            ));
            out.line(format!(
                "{:>15} : {} {} {}",
                "Software",
                image.platform().map(|p| p.as_str()).unwrap_or("-"),
                optional(image.kernel_id()),
                optional(image.ramdisk_id()),
            ));
            out.line(format!(
                "{:>15} : {:<12} {}",
                "Root",
                optional(image.root_device_name()),
                image
                    .root_device_type()
                    .map(|t| t.as_str())
                    .unwrap_or("-"),
            ));
            let mut bdevs: Vec<_> = image.block_device_mappings().iter().collect();
            bdevs.sort_by_key(|b| b.device_name().unwrap_or(""));
            for bdev in bdevs {
                let source = bdev
                    .ebs()
                    .and_then(|e| e.snapshot_id())
                    .or(bdev.virtual_name())
                    .unwrap_or("-");
                out.line(format!(
                    "{:>15} : {:<12} {:>12} dot={}",
                    "Device",
                    optional(bdev.device_name()),
                    source,
                    bdev.ebs()
                        .and_then(|e| e.delete_on_termination())
                        .unwrap_or(false),
                ));
            }
            if disp.show_tags {
                display_tags(out, image.tags());
            }
        }
        Verbosity::Simple => {
            out.line(id);
            if disp.show_tags {
                display_tags(out, image.tags());
            }
        }
    }
}

async fn delete_images(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let image_ids: Vec<String> = if selector.is_explicit() {
        selector.resource_ids.clone()
    } else {
        let images = query_images(
            session,
            region,
            selector,
            Some(vec!["self".to_string()]),
        )
        .await?;
        images
            .iter()
            .filter_map(|i| i.image_id().map(str::to_string))
            .collect()
    };
    if !confirm_aggr("Will delete:", &image_ids) {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    for image_id in &image_ids {
        ec2.deregister_image()
            .image_id(image_id)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
        session.cache_remove([image_id.as_str()]);
    }
    Ok(())
}

/// One parsed `sdX=...` block device spec.
#[derive(Debug, PartialEq, Eq)]
struct BlockDeviceSpec {
    device: String,
    snapshot_id: Option<String>,
    ephemeral_name: Option<String>,
    delete_on_termination: bool,
}

/// Parse a block device spec of the form
/// `dev=<snap-id|ephemeralN>[:<delete|nodelete>]`; the device name gets
/// a `/dev/` prefix.
fn parse_block_device_spec(spec: &str) -> Result<BlockDeviceSpec, CmdError> {
    let Some((dev_name, dev_value)) = spec.split_once('=') else {
        return Err(CmdError::input(format!(
            "Block device spec missing '=' : {spec}"
        )));
    };
    let (origin, dot) = match dev_value.split_once(':') {
        Some((origin, dot)) => (origin, Some(dot)),
        None => (dev_value, None),
    };
    let delete_on_termination = match dot {
        Some("delete") => true,
        Some("nodelete") | None => false,
        Some(other) => {
            return Err(CmdError::input(format!(
                "Bad delete-on-termination specified for {dev_name}: {other}"
            )))
        }
    };
    let mut parsed = BlockDeviceSpec {
        device: format!("/dev/{dev_name}"),
        snapshot_id: None,
        ephemeral_name: None,
        delete_on_termination,
    };
    if origin.starts_with("ephemeral") {
        parsed.ephemeral_name = Some(origin.to_string());
    } else if origin.starts_with("snap-") {
        parsed.snapshot_id = Some(origin.to_string());
    } else {
        return Err(CmdError::input(format!(
            "Bad source specified for {dev_name}: {origin}"
        )));
    }
    Ok(parsed)
}

fn to_mapping(spec: BlockDeviceSpec) -> BlockDeviceMapping {
    let mut builder = BlockDeviceMapping::builder().device_name(spec.device);
    if let Some(ephemeral) = spec.ephemeral_name {
        builder = builder.virtual_name(ephemeral);
    }
    if let Some(snapshot_id) = spec.snapshot_id {
        builder = builder.ebs(
            EbsBlockDevice::builder()
                .snapshot_id(snapshot_id)
                .delete_on_termination(spec.delete_on_termination)
                .build(),
        );
    }
    builder.build()
}

async fn create_image(
    session: &mut Session,
    region: Option<&str>,
    args: &AmiArgs,
) -> Result<(), CmdError> {
    // Launch inputs are self-describing; scan the args for what we got.
    let mut instance_id = None;
    let mut source_ami = None;
    let mut kernel_id = None;
    let mut ramdisk_id = None;
    let mut arch = None;
    let mut ami_name = None;
    let mut root_devname = None;
    let mut mappings = Vec::new();
    let mut extra_args = Vec::new();
    for arg in &args.args {
        if arg.starts_with("sd") {
            mappings.push(to_mapping(parse_block_device_spec(arg)?));
        } else if VALID_ARCH.contains(&arg.as_str()) {
            arch = Some(arg.clone());
        } else if let Some(name) = arg.strip_prefix("name=") {
            ami_name = Some(name.to_string());
        } else if let Some(root) = arg.strip_prefix("root=") {
            root_devname = Some(root.to_string());
        } else if arg.starts_with("aki-") {
            kernel_id = Some(arg.clone());
        } else if arg.starts_with("ari-") {
            ramdisk_id = Some(arg.clone());
        } else if arg.starts_with("i-") {
            instance_id = Some(arg.clone());
        } else if arg.starts_with("ami-") {
            source_ami = Some(arg.clone());
        } else {
            // Could be the source region when copying an AMI.
            extra_args.push(arg.clone());
        }
    }

    let image_id = if let Some(source_ami) = source_ami {
        let [source_region] = extra_args.as_slice() else {
            return Err(CmdError::input(
                "Expecting 2 arguments: source ami-id, source region",
            ));
        };
        copy_image(
            session,
            region,
            args.description.as_deref(),
            ami_name.as_deref(),
            &source_ami,
            source_region,
        )
        .await?
    } else {
        let Some(ami_name) = ami_name else {
            return Err(CmdError::input("You must specify a name for the new AMI"));
        };
        if let Some(instance_id) = instance_id {
            image_from_instance(
                session,
                region,
                args.description.as_deref(),
                &ami_name,
                &instance_id,
            )
            .await?
        } else {
            register_image(
                session,
                region,
                args.description.as_deref(),
                &ami_name,
                arch.as_deref(),
                root_devname.as_deref(),
                args.virt_type.as_deref(),
                kernel_id.as_deref(),
                ramdisk_id.as_deref(),
                mappings,
            )
            .await?
        }
    };
    if let Some(image_id) = image_id {
        session.cache_insert([image_id.as_str()]);
        println!("{image_id}");
    }
    Ok(())
}

async fn copy_image(
    session: &mut Session,
    region: Option<&str>,
    description: Option<&str>,
    name: Option<&str>,
    source_ami: &str,
    source_region: &str,
) -> Result<Option<String>, CmdError> {
    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .copy_image()
        .source_image_id(source_ami)
        .source_region(source_region)
        // CopyImage requires a name; fall back to the source image id.
        .name(name.unwrap_or(source_ami));
    if let Some(description) = description {
        req = req.description(description);
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.image_id().map(str::to_string))
}

async fn image_from_instance(
    session: &mut Session,
    region: Option<&str>,
    description: Option<&str>,
    name: &str,
    instance_id: &str,
) -> Result<Option<String>, CmdError> {
    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .create_image()
        .instance_id(instance_id)
        .name(name)
        .no_reboot(true);
    if let Some(description) = description {
        req = req.description(description);
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.image_id().map(str::to_string))
}

#[allow(clippy::too_many_arguments)]
async fn register_image(
    session: &mut Session,
    region: Option<&str>,
    description: Option<&str>,
    name: &str,
    arch: Option<&str>,
    root_devname: Option<&str>,
    virt_type: Option<&str>,
    kernel_id: Option<&str>,
    ramdisk_id: Option<&str>,
    mappings: Vec<BlockDeviceMapping>,
) -> Result<Option<String>, CmdError> {
    let Some(arch) = arch else {
        return Err(CmdError::input(format!(
            "No architecture specified; use one of: {}",
            VALID_ARCH.join(",")
        )));
    };
    let Some(root_devname) = root_devname else {
        return Err(CmdError::input("No root device name specified"));
    };
    let virt_type = match virt_type {
        Some("pv") => Some("paravirtual"),
        Some(v @ ("paravirtual" | "hvm")) => Some(v),
        Some(other) => {
            return Err(CmdError::input(format!(
                "Invalid virtualization type: {other}; use one of paravirtual,hvm"
            )))
        }
        None => None,
    };
    let root_devpath = if root_devname.starts_with("/dev/") {
        root_devname.to_string()
    } else {
        format!("/dev/{root_devname}")
    };

    let ec2 = session.ec2(region).await?;
    let mut req = ec2
        .register_image()
        .name(name)
        .architecture(ArchitectureValues::from(arch))
        .root_device_name(root_devpath)
        .set_block_device_mappings(Some(mappings));
    if let Some(description) = description {
        req = req.description(description);
    }
    if let Some(virt_type) = virt_type {
        req = req.virtualization_type(virt_type);
    }
    // HVM images take no kernel/ramdisk.
    if virt_type != Some("hvm") {
        if let Some(kernel_id) = kernel_id {
            req = req.kernel_id(kernel_id);
        }
        if let Some(ramdisk_id) = ramdisk_id {
            req = req.ramdisk_id(ramdisk_id);
        }
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    Ok(output.image_id().map(str::to_string))
}

const HELP: &str = "
        ami [std-options] [list-options] [-C] [-D] [ami-id] ...

Options:
    -C          : create a new AMI
    -D          : delete (deregister) an existing AMI
    -d desc     : AMI description (when creating a new AMI)
    -U owner    : list AMIs owned by 'owner'; possible values are 'self',
                  'amazon', 'aws-marketplace'; option may be specified
                  multiple times
    -v virt_type: virtualization type (hvm, or pv/paravirtual)

When creating a new AMI, the argument list may include:
        i-<id>          : the instance-id from which to create an image
                          (you need to make sure it is not running)
        aki-<id>        : the kernel image to use (paravirtual only)
        ari-<id>        : the ramdisk image to use (optional)
        <arch>          : this is either i386 or x86_64
        name=<ami_name> : the AMI name (required)
        root=<device>   : specifies the root device; can be a simple device
                          name (example: sda1), or a device path (example:
                          /dev/sda1)
        bdm_spec        : the block-device-map spec has the form:
                                dev=<snap-id>[:<dot>]
                          For example,
                              sdb1=snap-12345678:delete
                          Note that all devices start with 'sd';
                          <dot> can be either 'delete' or 'nodelete'; the
                          default, if not explicitly specified, is 'nodelete'

When creating a new AMI from an instance, other than the instance-id, you
only need to specify a name for it.

When copying an AMI, you need to specify the source region and source AMI id.

Example 1:
    ami -C i-12345678 name=my-new-ami

Example 2:
    ami -C x86_64 root=sda1 name=my-new-ami sda1=snap-12345678
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_device_spec_with_snapshot_and_dot() {
        let spec = parse_block_device_spec("sdb1=snap-12345678:delete").unwrap();
        assert_eq!(spec.device, "/dev/sdb1");
        assert_eq!(spec.snapshot_id.as_deref(), Some("snap-12345678"));
        assert_eq!(spec.ephemeral_name, None);
        assert!(spec.delete_on_termination);
    }

    #[test]
    fn block_device_spec_defaults_to_nodelete() {
        let spec = parse_block_device_spec("sda1=snap-1").unwrap();
        assert!(!spec.delete_on_termination);
        let spec = parse_block_device_spec("sda1=snap-1:nodelete").unwrap();
        assert!(!spec.delete_on_termination);
    }

    #[test]
    fn block_device_spec_ephemeral() {
        let spec = parse_block_device_spec("sdc=ephemeral0").unwrap();
        assert_eq!(spec.ephemeral_name.as_deref(), Some("ephemeral0"));
        assert_eq!(spec.snapshot_id, None);
    }

    #[test]
    fn block_device_spec_rejects_malformed_input() {
        assert!(parse_block_device_spec("sdb1").is_err());
        assert!(parse_block_device_spec("sdb1=vol-123").is_err());
        assert!(parse_block_device_spec("sdb1=snap-1:maybe").is_err());
    }

    #[test]
    fn mapping_carries_the_ebs_block() {
        let mapping = to_mapping(parse_block_device_spec("sdb=snap-9:delete").unwrap());
        assert_eq!(mapping.device_name(), Some("/dev/sdb"));
        let ebs = mapping.ebs().unwrap();
        assert_eq!(ebs.snapshot_id(), Some("snap-9"));
        assert_eq!(ebs.delete_on_termination(), Some(true));
    }
}
