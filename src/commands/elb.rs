//! The `elb` command: classic Elastic Load Balancers.

use async_trait::async_trait;
use aws_sdk_elasticloadbalancing::types::{
    HealthCheck, Instance as ElbInstance, Listener, LoadBalancerDescription,
};
use clap::Parser;

use crate::commands::{parse_argv, Command};
use crate::display::{local_time, optional, DisplayOptions, Verbosity};
use crate::error::CmdError;
use crate::output::CommandOutput;
use crate::session::Session;

pub struct ElbCommand;

#[derive(Parser, Debug)]
#[command(name = "elb", no_binary_name = true, disable_help_flag = true)]
struct ElbArgs {
    /// add a subnet/sg/listener/instance/policy to an ELB
    #[arg(short = 'A')]
    add: bool,
    /// all ELBs
    #[arg(short = 'a')]
    all: bool,
    /// create an ELB
    #[arg(short = 'C')]
    create: bool,
    /// delete an ELB
    #[arg(short = 'D')]
    delete: bool,
    /// comma-separated security group list
    #[arg(short = 'g')]
    security_groups: Option<String>,
    /// healthcheck spec: name=value[,name=value]...
    #[arg(short = 'H')]
    healthcheck: Option<String>,
    /// query instance health
    #[arg(short = 'h')]
    instance_health: bool,
    /// comma-separated instance-id list to add/remove
    #[arg(short = 'i')]
    instances: Option<String>,
    /// listener spec: lbport,instport,lbproto,instproto[,cert-arn]
    #[arg(short = 'L')]
    listeners: Vec<String>,
    /// long listing
    #[arg(short = 'l')]
    long: bool,
    /// define or reference a policy
    #[arg(short = 'P')]
    policy: Option<String>,
    /// display policies of the specified ELB
    #[arg(short = 'p')]
    policies: bool,
    /// remove a subnet/sg/instance/listener/policy from an ELB
    #[arg(short = 'R')]
    remove: bool,
    /// region
    #[arg(short = 'r')]
    region: Option<String>,
    /// comma-separated subnet list
    #[arg(short = 's')]
    subnets: Option<String>,
    /// extended listing
    #[arg(short = 'x')]
    extended: bool,
    args: Vec<String>,
}

/// Parse listener specs of the form
/// `lb_port,instance_port,lb_proto,instance_proto[,cert-arn]`.
fn parse_listeners(specs: &[String]) -> Result<Vec<Listener>, CmdError> {
    let mut listeners = Vec::new();
    for spec in specs {
        let fields: Vec<&str> = spec.split(',').collect();
        if fields.len() != 4 && fields.len() != 5 {
            return Err(CmdError::input(format!("Bad ELB listener spec: {spec}")));
        }
        let lb_port: i32 = fields[0]
            .parse()
            .map_err(|_| CmdError::input(format!("Bad port number in {spec}")))?;
        let instance_port: i32 = fields[1]
            .parse()
            .map_err(|_| CmdError::input(format!("Bad port number in {spec}")))?;
        let lb_proto = fields[2].to_uppercase();
        let instance_proto = fields[3].to_uppercase();
        if !matches!(lb_proto.as_str(), "HTTP" | "HTTPS" | "TCP") {
            return Err(CmdError::input(format!("Bad LB protocol in spec: {spec}")));
        }
        if !matches!(instance_proto.as_str(), "HTTP" | "HTTPS" | "TCP") {
            return Err(CmdError::input(format!(
                "Bad instance protocol in spec: {spec}"
            )));
        }
        let mut builder = Listener::builder()
            .protocol(&lb_proto)
            .load_balancer_port(lb_port)
            .instance_protocol(&instance_proto)
            .instance_port(instance_port);
        if lb_proto == "HTTPS" {
            let Some(arn) = fields.get(4) else {
                return Err(CmdError::input(format!(
                    "SSL Certificate ARN is required for {spec}"
                )));
            };
            builder = builder.ssl_certificate_id(*arn);
        }
        let listener = builder
            .build()
            .map_err(|e| CmdError::input(format!("Bad ELB listener spec {spec}: {e}")))?;
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Parse a healthcheck spec, `name=value[,name=value]...` with names
/// `i` (interval), `t` (timeout), `ht`/`ut` (healthy/unhealthy
/// threshold) and `l` (link, i.e. the check target).
fn parse_healthcheck(spec: &str) -> Result<HealthCheck, CmdError> {
    let mut interval = None;
    let mut timeout = None;
    let mut healthy = None;
    let mut unhealthy = None;
    let mut link = None;
    for part in spec.split(',') {
        let Some((name, value)) = part.split_once('=') else {
            return Err(CmdError::input(format!(
                "Bad healthspec: missing '=' in {part}"
            )));
        };
        if value.is_empty() {
            continue;
        }
        let int_value = || {
            value
                .parse::<i32>()
                .map_err(|_| CmdError::input(format!("Expecting an integer value for {name}")))
        };
        match name {
            "i" => interval = Some(int_value()?),
            "t" => timeout = Some(int_value()?),
            "ht" => healthy = Some(int_value()?),
            "ut" => unhealthy = Some(int_value()?),
            "l" => link = Some(value.to_string()),
            _ => return Err(CmdError::input(format!("Bad healthspec: {part}"))),
        }
    }
    let mut builder = HealthCheck::builder();
    if let Some(link) = link {
        builder = builder.target(link);
    }
    if let Some(interval) = interval {
        builder = builder.interval(interval);
    }
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(healthy) = healthy {
        builder = builder.healthy_threshold(healthy);
    }
    if let Some(unhealthy) = unhealthy {
        builder = builder.unhealthy_threshold(unhealthy);
    }
    builder
        .build()
        .map_err(|e| CmdError::input(format!("Incomplete healthspec '{spec}': {e}")))
}

fn split_list(spec: Option<&str>) -> Vec<String> {
    spec.map(|s| {
        s.split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl Command for ElbCommand {
    fn name(&self) -> &'static str {
        "elb"
    }

    fn help(&self) -> &'static str {
        HELP
    }

    async fn run(&self, session: &mut Session, argv: Vec<String>) -> Result<(), CmdError> {
        let args: ElbArgs = parse_argv(argv)?;

        let mut disp = DisplayOptions::new();
        if args.long {
            disp.verbosity = Verbosity::Long;
        }
        if args.extended {
            disp.verbosity = Verbosity::Extended;
        }

        let region = args.region.as_deref();
        let subnets = split_list(args.subnets.as_deref());
        let sg_ids = split_list(args.security_groups.as_deref());
        let instances = split_list(args.instances.as_deref());

        if args.create {
            create_elb(session, region, &args, subnets, sg_ids).await
        } else if args.add || args.remove {
            if let Some(policy) = &args.policy {
                change_policy(session, region, args.add, policy, &args).await
            } else if args.add {
                modify_add(session, region, &args, subnets, sg_ids, instances).await
            } else {
                modify_remove(session, region, &args, subnets, sg_ids, instances).await
            }
        } else if args.delete {
            delete_elbs(session, region, &args.args).await
        } else if let Some(spec) = &args.healthcheck {
            configure_healthcheck(session, region, spec, &args.args).await
        } else if args.instance_health {
            instance_health(session, region, &args.args).await
        } else if args.all || !args.args.is_empty() {
            list_elbs(session, region, &args, &disp).await
        } else {
            Ok(())
        }
    }
}

async fn list_elbs(
    session: &mut Session,
    region: Option<&str>,
    args: &ElbArgs,
    disp: &DisplayOptions,
) -> Result<(), CmdError> {
    let elb = session.elb(region).await?;
    let mut req = elb.describe_load_balancers();
    if !args.all && !args.args.is_empty() {
        req = req.set_load_balancer_names(Some(args.args.clone()));
    }
    let output = req.send().await.map_err(|e| CmdError::service("ELB", e))?;
    let mut out = CommandOutput::new(None)?;
    for lb in output.load_balancer_descriptions() {
        display_elb(session, lb, args, disp, &mut out);
    }
    Ok(())
}

fn display_elb(
    session: &Session,
    lb: &LoadBalancerDescription,
    args: &ElbArgs,
    disp: &DisplayOptions,
    out: &mut CommandOutput,
) {
    let name = lb.load_balancer_name().unwrap_or("-");
    if args.policies {
        out.line(name);
        display_policies(lb, out);
        return;
    }
    match disp.verbosity {
        Verbosity::Long => {
            out.line(format!(
                "{:<20} {:<30} {}",
                name,
                optional(lb.dns_name()),
                optional(lb.vpc_id())
            ));
        }
        Verbosity::Extended => {
            out.line(name);
            out.line(format!("{:>15} : {}", "DNS-name", optional(lb.dns_name())));
            out.line(format!(
                "{:>15} : {}",
                "CNAME",
                optional(lb.canonical_hosted_zone_name())
            ));
            out.line(format!(
                "{:>15} : {}",
                "Create-time",
                local_time(lb.created_time())
            ));
            for ld in lb.listener_descriptions() {
                if let Some(listener) = ld.listener() {
                    out.line(format!(
                        "{:>15} : in={:<4} out={:<4} proto={:<5}",
                        "Listener",
                        listener.load_balancer_port(),
                        listener.instance_port(),
                        listener.protocol(),
                    ));
                    if let Some(policy) = ld.policy_names().first() {
                        out.line(format!("{:>15}   policy={}", "", policy));
                    }
                    if let Some(cert) = listener.ssl_certificate_id() {
                        let cert_name = cert.split_once('/').map(|(_, n)| n).unwrap_or(cert);
                        out.line(format!("{:>15}   cert={}", "", cert_name));
                    }
                }
            }
            if let Some(source_sg) = lb.source_security_group() {
                out.line(format!(
                    "{:>15} : {}",
                    "Group",
                    optional(source_sg.group_name())
                ));
            }
            if let Some(vpc_id) = lb.vpc_id() {
                out.line(format!("{:>15} : {}", "VPC-id", vpc_id));
                session.cache_insert([vpc_id]);
            }
            if !lb.subnets().is_empty() {
                out.line(format!("{:>15} : {}", "Subnets", lb.subnets().join(", ")));
                session.cache_insert(lb.subnets());
            }
            if !lb.availability_zones().is_empty() {
                out.line(format!(
                    "{:>15} : {}",
                    "Zones",
                    lb.availability_zones().join(", ")
                ));
            }
            if let Some(hc) = lb.health_check() {
                out.line(format!(
                    "{:>15} : i={} t={} ht={} ut={} {}",
                    "Healthcheck",
                    hc.interval(),
                    hc.timeout(),
                    hc.healthy_threshold(),
                    hc.unhealthy_threshold(),
                    hc.target(),
                ));
            }
            display_policies(lb, out);
            for instance in lb.instances() {
                if let Some(id) = instance.instance_id() {
                    out.line(format!("{:>15} : {:<12}", "Instance", id));
                    session.cache_insert([id]);
                }
            }
        }
        Verbosity::Simple => out.line(name),
    }
}

fn display_policies(lb: &LoadBalancerDescription, out: &mut CommandOutput) {
    let Some(policies) = lb.policies() else {
        return;
    };
    for policy in policies.app_cookie_stickiness_policies() {
        out.line(format!(
            "{:>15} : {:<15} cookie={}",
            "App-cookie",
            optional(policy.policy_name()),
            optional(policy.cookie_name()),
        ));
    }
    for policy in policies.lb_cookie_stickiness_policies() {
        out.line(format!(
            "{:>15} : {:<15} expiration={}",
            "LB-cookie",
            optional(policy.policy_name()),
            policy
                .cookie_expiration_period()
                .map_or("-".to_string(), |p| p.to_string()),
        ));
    }
}

async fn create_elb(
    session: &mut Session,
    region: Option<&str>,
    args: &ElbArgs,
    subnets: Vec<String>,
    sg_ids: Vec<String>,
) -> Result<(), CmdError> {
    if subnets.is_empty() {
        return Err(CmdError::input("No subnets specified"));
    }
    let Some(name) = args.args.first() else {
        return Err(CmdError::input("No ELB name specified"));
    };
    let listeners = parse_listeners(&args.listeners)?;
    if listeners.is_empty() {
        return Err(CmdError::input("You need to specify at least one listener"));
    }
    let elb = session.elb(region).await?;
    let output = elb
        .create_load_balancer()
        .load_balancer_name(name)
        .set_listeners(Some(listeners))
        .set_subnets(Some(subnets))
        .set_security_groups(Some(sg_ids))
        .send()
        .await
        .map_err(|e| CmdError::service("ELB", e))?;
    match output.dns_name() {
        Some(dns_name) => println!("{dns_name}"),
        None => println!("ELB creation failed"),
    }
    Ok(())
}

async fn delete_elbs(
    session: &mut Session,
    region: Option<&str>,
    names: &[String],
) -> Result<(), CmdError> {
    let elb = session.elb(region).await?;
    for name in names {
        elb.delete_load_balancer()
            .load_balancer_name(name)
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    Ok(())
}

async fn modify_add(
    session: &mut Session,
    region: Option<&str>,
    args: &ElbArgs,
    subnets: Vec<String>,
    sg_ids: Vec<String>,
    instances: Vec<String>,
) -> Result<(), CmdError> {
    let Some(name) = args.args.first() else {
        return Err(CmdError::input("No ELB specified"));
    };
    let elb = session.elb(region).await?;
    if !args.listeners.is_empty() {
        let listeners = parse_listeners(&args.listeners)?;
        elb.create_load_balancer_listeners()
            .load_balancer_name(name)
            .set_listeners(Some(listeners))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    if !sg_ids.is_empty() {
        elb.apply_security_groups_to_load_balancer()
            .load_balancer_name(name)
            .set_security_groups(Some(sg_ids))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    if !subnets.is_empty() {
        elb.attach_load_balancer_to_subnets()
            .load_balancer_name(name)
            .set_subnets(Some(subnets))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    if !instances.is_empty() {
        elb.register_instances_with_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(to_elb_instances(&instances)))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    Ok(())
}

async fn modify_remove(
    session: &mut Session,
    region: Option<&str>,
    args: &ElbArgs,
    subnets: Vec<String>,
    sg_ids: Vec<String>,
    instances: Vec<String>,
) -> Result<(), CmdError> {
    let Some(name) = args.args.first() else {
        return Err(CmdError::input("No ELB specified"));
    };
    let elb = session.elb(region).await?;
    if !args.listeners.is_empty() {
        let mut ports = Vec::new();
        for spec in &args.listeners {
            ports.push(
                spec.parse::<i32>()
                    .map_err(|_| CmdError::input(format!("Bad port specification: {spec}")))?,
            );
        }
        elb.delete_load_balancer_listeners()
            .load_balancer_name(name)
            .set_load_balancer_ports(Some(ports))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    if !sg_ids.is_empty() {
        println!("The ability to unapply security groups from an ELB is not available");
    }
    if !subnets.is_empty() {
        elb.detach_load_balancer_from_subnets()
            .load_balancer_name(name)
            .set_subnets(Some(subnets))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    if !instances.is_empty() {
        elb.deregister_instances_from_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(to_elb_instances(&instances)))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
    }
    Ok(())
}

fn to_elb_instances(ids: &[String]) -> Vec<ElbInstance> {
    ids.iter()
        .map(|id| ElbInstance::builder().instance_id(id).build())
        .collect()
}

async fn change_policy(
    session: &mut Session,
    region: Option<&str>,
    add: bool,
    policy_name: &str,
    args: &ElbArgs,
) -> Result<(), CmdError> {
    let mut rest = args.args.clone();
    if rest.is_empty() {
        return Err(CmdError::input("No ELB specified"));
    }
    let elb_name = rest.remove(0);
    let elb = session.elb(region).await?;

    if let Some(listener) = args.listeners.first() {
        // Associate (or clear) the policy on the given listener port.
        let lb_port: i32 = listener
            .parse()
            .map_err(|_| CmdError::input(format!("Bad port specification: {listener}")))?;
        let policy_names = if add {
            vec![policy_name.to_string()]
        } else {
            Vec::new()
        };
        elb.set_load_balancer_policies_of_listener()
            .load_balancer_name(&elb_name)
            .load_balancer_port(lb_port)
            .set_policy_names(Some(policy_names))
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
        return Ok(());
    }

    if !add {
        elb.delete_load_balancer_policy()
            .load_balancer_name(&elb_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| CmdError::service("ELB", e))?;
        return Ok(());
    }

    // Create a new stickiness policy.
    if rest.is_empty() {
        return Err(CmdError::input(format!(
            "No policy type for {policy_name}"
        )));
    }
    let policy_type = rest.remove(0);
    match policy_type.as_str() {
        "lb-cookie" => {
            let expiration = rest
                .first()
                .ok_or_else(|| CmdError::input("Missing expiration period"))?
                .parse::<i64>()
                .map_err(|_| CmdError::input("Expiration period must be a number"))?;
            elb.create_lb_cookie_stickiness_policy()
                .load_balancer_name(&elb_name)
                .policy_name(policy_name)
                .cookie_expiration_period(expiration)
                .send()
                .await
                .map_err(|e| CmdError::service("ELB", e))?;
        }
        "app-cookie" => {
            let cookie_name = rest
                .first()
                .ok_or_else(|| CmdError::input("Missing cookie name"))?;
            elb.create_app_cookie_stickiness_policy()
                .load_balancer_name(&elb_name)
                .policy_name(policy_name)
                .cookie_name(cookie_name)
                .send()
                .await
                .map_err(|e| CmdError::service("ELB", e))?;
        }
        other => return Err(CmdError::input(format!("Unknown policy type: {other}"))),
    }
    Ok(())
}

async fn configure_healthcheck(
    session: &mut Session,
    region: Option<&str>,
    spec: &str,
    args: &[String],
) -> Result<(), CmdError> {
    let healthcheck = parse_healthcheck(spec)?;
    let Some(name) = args.first() else {
        return Err(CmdError::input("No ELB specified"));
    };
    let elb = session.elb(region).await?;
    let output = elb
        .configure_health_check()
        .load_balancer_name(name)
        .health_check(healthcheck)
        .send()
        .await
        .map_err(|e| CmdError::service("ELB", e))?;
    if let Some(hc) = output.health_check() {
        println!(
            "Healthcheck: i={} t={} ht={} ut={} {}",
            hc.interval(),
            hc.timeout(),
            hc.healthy_threshold(),
            hc.unhealthy_threshold(),
            hc.target(),
        );
    }
    Ok(())
}

async fn instance_health(
    session: &mut Session,
    region: Option<&str>,
    args: &[String],
) -> Result<(), CmdError> {
    let Some(name) = args.first() else {
        return Err(CmdError::input("No ELB specified"));
    };
    let elb = session.elb(region).await?;
    let output = elb
        .describe_instance_health()
        .load_balancer_name(name)
        .send()
        .await
        .map_err(|e| CmdError::service("ELB", e))?;
    for state in output.instance_states() {
        println!(
            "{:<12} {:<10} {:<6} '{}'",
            optional(state.instance_id()),
            optional(state.state()),
            optional(state.reason_code()),
            optional(state.description()),
        );
        if let Some(id) = state.instance_id() {
            session.cache_insert([id]);
        }
    }
    Ok(())
}

const HELP: &str = "
        elb [<options>] [<args>]
Options:
    -a          : all ELBs
    -A          : add a subnet/sg/listener/policy to an ELB
    -C          : create an ELB
    -D          : delete an ELB
    -g sg,sg,.. : apply the specified security group(s) to the ELB
    -H spec     : specify a healthcheck specification; a healthspec has the form
                            name=value[,name=value]...
                  where name is:
                        i   : interval
                        t   : timeout
                        ht  : healthy threshold
                        ut  : unhealthy threshold
                        l   : link
    -h          : query instance health
    -i list     : a comma-separated instance-id list to add/remove to the ELB
                  (action depends on -A/-R option)
    -L spec     : specify a listener; form lbport,instport,lbproto,instproto[,arn]
    -l          : long display
    -P policy   : define a new policy
    -p          : display policies associated with the specified ELB
    -R          : remove a subnet/sg/instance/listener/policy from an ELB
    -s sn,sn,.. : attach ELB to the specified subnet(s)
    -x          : extended output

When creating an ELB, the following information must be provided:
        subnets (via -s option)
        security groups (via -g option)
        listeners (via -L option)

To create a new policy for a load balancer:
        elb -A -P <policy-name> <elb-name> <policy-type> <policy-args>

To attach a policy to a load balancer listener:
        elb -A -P <policy-name> -L <lbport> <elb-name>
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_spec_without_cert() {
        let listeners = parse_listeners(&["80,8080,http,http".to_string()]).unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].protocol(), "HTTP");
        assert_eq!(listeners[0].load_balancer_port(), 80);
        assert_eq!(listeners[0].instance_protocol(), Some("HTTP"));
        assert_eq!(listeners[0].instance_port(), 8080);
        assert_eq!(listeners[0].ssl_certificate_id(), None);
    }

    #[test]
    fn https_listener_requires_cert_arn() {
        assert!(parse_listeners(&["443,8443,https,http".to_string()]).is_err());
        let listeners = parse_listeners(&[
            "443,8443,https,http,arn:aws:iam::123456789012:server-certificate/web".to_string(),
        ])
        .unwrap();
        assert_eq!(
            listeners[0].ssl_certificate_id(),
            Some("arn:aws:iam::123456789012:server-certificate/web")
        );
    }

    #[test]
    fn listener_spec_rejects_bad_fields() {
        assert!(parse_listeners(&["80,8080".to_string()]).is_err());
        assert!(parse_listeners(&["http,80,http,http".to_string()]).is_err());
        assert!(parse_listeners(&["80,8080,gopher,http".to_string()]).is_err());
        assert!(parse_listeners(&["80,8080,http,gopher".to_string()]).is_err());
    }

    #[test]
    fn healthcheck_spec_full() {
        let hc = parse_healthcheck("i=30,t=5,ht=2,ut=3,l=HTTP:80/index.html").unwrap();
        assert_eq!(hc.interval(), 30);
        assert_eq!(hc.timeout(), 5);
        assert_eq!(hc.healthy_threshold(), 2);
        assert_eq!(hc.unhealthy_threshold(), 3);
        assert_eq!(hc.target(), "HTTP:80/index.html");
    }

    #[test]
    fn healthcheck_spec_rejects_bad_input() {
        assert!(parse_healthcheck("interval").is_err());
        assert!(parse_healthcheck("i=soon,t=5,ht=2,ut=3,l=TCP:80").is_err());
        assert!(parse_healthcheck("z=1").is_err());
        // All fields are required by the API; a partial spec fails at
        // build time.
        assert!(parse_healthcheck("i=30").is_err());
    }

    #[test]
    fn split_list_handles_missing_and_multi() {
        assert!(split_list(None).is_empty());
        assert_eq!(
            split_list(Some("subnet-1,subnet-2")),
            vec!["subnet-1".to_string(), "subnet-2".to_string()]
        );
    }
}
