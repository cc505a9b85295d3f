//! The `zone` command: availability zones.

use async_trait::async_trait;
use aws_sdk_ec2::types::AvailabilityZone;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct ZoneCommand;

#[derive(Parser, Debug)]
#[command(name = "zone", no_binary_name = true, disable_help_flag = true)]
struct ZoneArgs {
    /// all zones
    #[arg(short = 'a')]
    all: bool,
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
impl Command for ZoneCommand {
    fn name(&self) -> &'static str {
        "zone"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: ZoneArgs = parse_argv(argv)?;
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

        let region = args.region.as_deref();
        let ec2 = session.ec2(region).await?;
        let mut req = ec2.describe_availability_zones();
        if !args.all {
            req = req.set_zone_names(Some(args.args.clone()));
        }
        let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
        let zones = output.availability_zones();

        // A full listing refreshes the zone cache for this region.
        if args.all {
            let region = session.resolve_region(region).to_string();
            let names: Vec<String> = zones
                .iter()
                .filter_map(|z| z.zone_name().map(str::to_string))
                .collect();
            session.update_zone_cache(&region, names);
        }

        let mut out = CommandOutput::new(None)?;
        for zone in zones {
            display_zone(zone, &disp, &mut out);
        }
        Ok(())
    }
}

fn display_zone(zone: &AvailabilityZone, disp: &DisplayOptions, out: &mut CommandOutput) {
    let name = zone.zone_name().unwrap_or("-");
    let state = zone.state().map(|s| s.as_str()).unwrap_or("-");
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<14} {:<10} {:<12} {}",
                name,
                state,
                zone.region_name().unwrap_or("-"),
                if zone.messages().is_empty() {
                    "NO-MSG"
                } else {
                    "MSG"
                },
            ));
        }
        Verbosity::Extended => {
            out.line(format!("{name}:"));
            out.line(format!("{:>15} : {}", "State", state));
            out.line(format!(
                "{:>15} : {}",
                "Region",
                zone.region_name().unwrap_or("-")
            ));
            for message in zone.messages() {
                out.line(format!(
                    "{:>15} : {}",
                    "Message",
                    message.message().unwrap_or("")
                ));
            }
        }
        Verbosity::Simple => out.line(name),
    }
}

const HELP: &str = "
        zone [-a] [-r region] [-l] [-x] [zone-name] ...
";
