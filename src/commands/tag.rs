//! The `tag` command: resource tags.

use async_trait::async_trait;
use aws_sdk_ec2::types::Tag;
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::select::ResourceSelector;
use crate::session::Session;

pub struct TagCommand;

#[derive(Parser, Debug)]
#[command(name = "tag", no_binary_name = true, disable_help_flag = true)]
struct TagArgs {
    /// show all tags
    #[arg(short = 'a')]
    all: bool,
    /// create new tags
    #[arg(short = 'C')]
    create: bool,
    /// delete tags
    #[arg(short = 'D')]
    delete: bool,
    /// attribute filter key=value
    #[arg(short = 'f')]
    filters: Vec<String>,
    /// show tags having this tag key
    #[arg(short = 'k')]
    key: Option<String>,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// show tags on resources of this type
    #[arg(short = 't')]
    res_type: Option<String>,
    /// show tags having this tag value
    #[arg(short = 'v')]
    value: Option<String>,
    args: Vec<String>,
}

/// Expand the shell's short resource-type names to the type names the
/// tag filter expects.
fn expand_type(res_type: &str) -> &str {
    match res_type {
        "igw" => "internet-gateway",
        "inst" => "instance",
        "nacl" => "network-acl",
        "rtb" => "route-table",
        "sg" => "security-group",
        "snap" => "snapshot",
        "vol" => "volume",
        other => other,
    }
}

/// Split `res-id ... [-] key[=value] ...` into ids and tags. The `-`
/// separator is only needed when a tag key itself contains a dash. A
/// spec without `=` carries no value (create makes it an empty-valued
/// tag; delete removes the key whatever its value).
fn parse_tag_args(
    args: &[String],
) -> Result<(Vec<String>, Vec<(String, Option<String>)>), CmdError> {
    let mut resource_ids = Vec::new();
    let mut tag_index = 0;
    for arg in args {
        if arg == "-" {
            tag_index += 1;
            break;
        }
        if !arg.contains('-') {
            break;
        }
        resource_ids.push(arg.clone());
        tag_index += 1;
    }
    if resource_ids.is_empty() {
        return Err(CmdError::input("No resource IDs specified"));
    }
    let mut tags = Vec::new();
    for spec in &args[tag_index..] {
        match spec.split_once('=') {
            Some((key, value)) => tags.push((key.to_string(), Some(value.to_string()))),
            None => tags.push((spec.clone(), None)),
        }
    }
    if tags.is_empty() {
        return Err(CmdError::input("No tags specified"));
    }
    Ok((resource_ids, tags))
}

#[async_trait]
impl Command for TagCommand {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: TagArgs = parse_argv(argv)?;

        let mut selector = ResourceSelector::new();
        selector.select_all = args.all;
        for spec in &args.filters {
            selector.add_filter_spec(spec)?;
        }
        if let Some(key) = &args.key {
            selector.add_filter("key", key);
        }
        if let Some(value) = &args.value {
            selector.add_filter("value", value);
        }
        if let Some(res_type) = &args.res_type {
            selector.add_filter("resource-type", expand_type(res_type));
        }

        let region = args.region.as_deref();

        if args.create {
            change_tags(session, region, &args.args, TagChange::Create).await
        } else if args.delete {
            change_tags(session, region, &args.args, TagChange::Delete).await
        } else {
            list_tags(session, region, &selector).await
        }
    }
}

async fn list_tags(
    session: &mut Session,
    region: Option<&str>,
    selector: &ResourceSelector,
) -> Result<(), CmdError> {
    if !selector.has_selection() {
        return Ok(());
    }
    let ec2 = session.ec2(region).await?;
    let mut req = ec2.describe_tags();
    if let Some(filters) = selector.ec2_filters() {
        req = req.set_filters(Some(filters));
    }
    let output = req.send().await.map_err(|e| CmdError::service("EC2", e))?;
    let mut out = CommandOutput::new(None)?;
    for tag in output.tags() {
        out.line(format!(
            "{:<16} {:<16} {:<12} {}",
            tag.resource_id().unwrap_or("-"),
            tag.resource_type().map(|t| t.as_str()).unwrap_or("-"),
            tag.key().unwrap_or("-"),
            tag.value().unwrap_or(""),
        ));
        if let Some(id) = tag.resource_id() {
            session.cache_insert([id]);
        }
    }
    Ok(())
}

enum TagChange {
    Create,
    Delete,
}

async fn change_tags(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
    change: TagChange,
) -> Result<(), CmdError> {
    let (resource_ids, tags) = parse_tag_args(args)?;
    let tags: Vec<Tag> = tags
        .into_iter()
        .map(|(key, value)| {
            let builder = Tag::builder().key(key);
            match (&change, value) {
                // Creating a bare key attaches an empty value; deleting
                // a bare key removes it whatever its value is.
                (TagChange::Create, None) => builder.value("").build(),
                (_, Some(value)) => builder.value(value).build(),
                (TagChange::Delete, None) => builder.build(),
            }
        })
        .collect();
    let ec2 = session.ec2(region).await?;
    match change {
        TagChange::Create => {
            ec2.create_tags()
                .set_resources(Some(resource_ids))
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
        TagChange::Delete => {
            ec2.delete_tags()
                .set_resources(Some(resource_ids))
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(|e| CmdError::service("EC2", e))?;
        }
    }
    Ok(())
}

const HELP: &str = "
        tag [std-options] [-f filtspec] [-k key] [-t type] [-v value] [args]

Options:
    -a          : show all tags
    -C          : create new tags (see below for the expected args)
    -D          : delete tags
    -f spec     : show tags matching the specified filter spec; the spec
                  has the form: key=value
    -t type     : show tags on resources of the specified type; available
                  types: igw, inst, nacl, rtb, sg, snap, vol
    -k key      : show tags having the specified tag key
    -v value    : show tags having the specified tag value

When creating new tags, the args have the following form:
        res-id ... res-id [-] tag-spec ... tag-spec
Example:
        tag -C i-deadbeef sg-f00fa00a - NAME=foobar
        tag -D i-deadbeef - NAME=foobar
";

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ids_and_tags_split_automatically() {
        let (ids, tags) =
            parse_tag_args(&strings(&["i-deadbeef", "sg-f00fa00a", "NAME=foobar"])).unwrap();
        assert_eq!(ids, vec!["i-deadbeef", "sg-f00fa00a"]);
        assert_eq!(
            tags,
            vec![("NAME".to_string(), Some("foobar".to_string()))]
        );
    }

    #[test]
    fn explicit_separator_ends_the_id_list() {
        let (ids, tags) = parse_tag_args(&strings(&["i-deadbeef", "-", "env-name=prod"])).unwrap();
        assert_eq!(ids, vec!["i-deadbeef"]);
        assert_eq!(tags, vec![("env-name".to_string(), Some("prod".to_string()))]);
    }

    #[test]
    fn bare_key_carries_no_value() {
        let (_, tags) = parse_tag_args(&strings(&["i-1", "-", "Stale"])).unwrap();
        assert_eq!(tags, vec![("Stale".to_string(), None)]);
    }

    #[test]
    fn missing_ids_or_tags_is_an_error() {
        assert!(parse_tag_args(&strings(&["NAME=foo"])).is_err());
        assert!(parse_tag_args(&strings(&["i-1"])).is_err());
    }

    #[test]
    fn short_type_names_expand() {
        assert_eq!(expand_type("inst"), "instance");
        assert_eq!(expand_type("sg"), "security-group");
        assert_eq!(expand_type("vpc"), "vpc");
    }
}
