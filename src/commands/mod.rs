//! Per-resource command handlers
//!
//! One module per verb. Each parses its own short-option grammar (capital
//! letters change AWS state, lower-case ones select and display), builds
//! a `ResourceSelector` and `DisplayOptions`, talks to the SDK through
//! the session, and pushes every id it prints into the resource-id
//! cache.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use async_trait::async_trait;
use clap::Parser;

use crate::error::CmdError;
use crate::session::Session;

mod ami;
mod console;
mod cred;
mod debug;
mod dhcp;
mod eip;
mod elb;
mod eni;
mod igw;
mod inst;
mod key;
mod keypair;
mod mfa;
mod nacl;
mod rds;
mod region;
mod rtb;
mod sg;
mod snap;
mod subnet;
mod tag;
mod user;
mod vol;
mod vpc;
mod zone;

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    /// Usage text shown by `help <verb>`.
    fn help(&self) -> &'static str;
    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError>;
}

/// The command table, keyed by verb.
pub fn registry() -> BTreeMap<&'static str, Box<dyn Command>> {
    let commands: Vec<Box<dyn Command>> = vec![
        Box::new(ami::AmiCommand),
        Box::new(console::ConsoleCommand),
        Box::new(cred::CredCommand),
        Box::new(debug::DebugCommand),
        Box::new(dhcp::DhcpCommand),
        Box::new(eip::EipCommand),
        Box::new(elb::ElbCommand),
        Box::new(eni::EniCommand),
        Box::new(igw::IgwCommand),
        Box::new(inst::InstCommand),
        Box::new(key::KeyCommand),
        Box::new(keypair::KeypairCommand),
        Box::new(mfa::MfaCommand),
        Box::new(nacl::NaclCommand),
        Box::new(rds::RdsCommand),
        Box::new(region::RegionCommand),
        Box::new(rtb::RtbCommand),
        Box::new(sg::SgCommand),
        Box::new(snap::SnapCommand),
        Box::new(subnet::SubnetCommand),
        Box::new(tag::TagCommand),
        Box::new(user::UserCommand),
        Box::new(vol::VolCommand),
        Box::new(vpc::VpcCommand),
        Box::new(zone::ZoneCommand),
    ];
    commands.into_iter().map(|c| (c.name(), c)).collect()
}

/// Parse a command's tokens against its clap grammar; a parse failure is
/// a user input error, reported and swallowed at the dispatch boundary.
pub(crate) fn parse_argv<T: Parser>(argv: Vec<String>) -> Result<T, CmdError> {
    T::try_parse_from(argv).map_err(|err| CmdError::Input(err.to_string()))
}

/// Ask for a y/n confirmation. Empty input or EOF means no.
pub(crate) fn confirm(prompt: Option<&str>) -> bool {
    let prompt = prompt.unwrap_or("Are you sure");
    print!("{prompt}? (y/n) --> ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    loop {
        line.clear();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => return false,
            Ok(_) => match line.trim().to_lowercase().as_str() {
                "y" => return true,
                "n" | "" => return false,
                _ => {
                    print!("{prompt}? (y/n) --> ");
                    let _ = std::io::stdout().flush();
                }
            },
        }
    }
}

/// Confirm an operation against a group of resources, listing them a few
/// per line before the prompt.
pub(crate) fn confirm_aggr(op_name: &str, resources: &[String]) -> bool {
    const DISPLAY_WIDTH: usize = 60;
    println!("{op_name}");
    let mut sorted = resources.to_vec();
    sorted.sort();
    let per_line = match sorted.first() {
        Some(first) if !first.is_empty() => (DISPLAY_WIDTH / first.len()).max(1),
        _ => 1,
    };
    for chunk in sorted.chunks(per_line) {
        println!("    {}", chunk.join(", "));
    }
    confirm(None)
}
