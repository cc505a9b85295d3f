//! The `keypair` command: EC2 key pairs.

use async_trait::async_trait;
use aws_sdk_ec2::types::KeyPairInfo;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct KeypairCommand;

#[derive(Parser, Debug)]
#[command(name = "keypair", no_binary_name = true, disable_help_flag = true)]
struct KeypairArgs {
    /// select all key pairs
    #[arg(short = 'a')]
    all: bool,
    /// create a key pair (prints the private key material)
    #[arg(short = 'C')]
    create: bool,
    /// delete key pair(s)
    #[arg(short = 'D')]
    delete: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

#[async_trait]
impl Command for KeypairCommand {
    fn name(&self) -> &'static str {
        "keypair"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: KeypairArgs = parse_argv(argv)?;

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

        if args.create {
            create_keypair(session, region, &args.args).await
        } else if args.delete {
            delete_keypairs(session, region, &args.args).await
        } else {
            selector.resource_ids = args.args.clone();
            list_keypairs(session, region, &selector, &disp).await
        }
    }
}

async fn list_keypairs(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_key_pairs();
    if let Some(names) = selector.ids() {
        req = req.set_key_names(Some(names));
    }
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let mut out = CommandOutput::new(None)?;
    for key_pair in output.key_pairs() {
        display_keypair(key_pair, disp, &mut out);
    }
    Ok(())
}

fn display_keypair(key_pair: &KeyPairInfo, disp: &DisplayOptions, out: &mut CommandOutput) {
    let name = key_pair.key_name().unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<20} {}",
                name,
                optional(key_pair.key_fingerprint())
            ));
        }
        Verbosity::Extended => {
            out.line(name);
            out.line(format!(
                "{:>15} : {:<12}",
                "Fingerprint",
                optional(key_pair.key_fingerprint())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Key-pair-id",
                optional(key_pair.key_pair_id())
            ));
        }
        Verbosity::Simple => out.line(name),
    }
}

async fn create_keypair(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let [name] = args else {
        return Err(CmdError::input("Expecting a single key pair name"));
    };
    let ec2 = session.ec2(region).await?;
    let output = ec2
        .create_key_pair()
        .key_name(name)
        .send()
        .await
        .map_err(|e| CmdError::service("EC2", e))?;
    if let Some(material) = output.key_material() {
        println!("{material}");
    }
    Ok(())
}

async fn delete_keypairs(
    session: &mut Session,
    region: Option<&str>,
    names: &[String],
) -> Result<(), CmdError> {
    let ec2 = session.ec2(region).await?;
    for name in names {
        ec2.delete_key_pair()
            .key_name(name)
            .send()
            .await
            .map_err(|e| CmdError::service("EC2", e))?;
    }
    Ok(())
}

const HELP: &str = "
    keypair [std-options] [list-options] [-C] [-D] [name] ...

Options:
    -C          : create a key pair; the new private key material is
                  printed on stdout
    -D          : delete the specified key pair(s)
";
